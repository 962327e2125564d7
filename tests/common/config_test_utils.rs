use std::ffi::OsString;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

/// Variables the loader reads; cleared for each test and restored afterwards.
const MANAGED_VARS: &[&str] = &[
    "PORT",
    "WA_BRIDGE_PORT",
    "WA_BRIDGE_HOST",
    "WA_BRIDGE_MESSAGES__DEFAULT_TEXT",
    "WA_BRIDGE_RATE_LIMIT__MAX_REQUESTS",
    "WA_BRIDGE_RATE_LIMIT__WINDOW_MS",
    "WA_BRIDGE_TRANSPORT__COMMAND",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn capture() -> Self {
        let saved = MANAGED_VARS
            .iter()
            .map(|name| (*name, std::env::var_os(name)))
            .collect();
        for name in MANAGED_VARS {
            std::env::remove_var(name);
        }
        Self { saved }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with `config_toml` written to a temp config file and a clean
/// environment. Tests touching env vars are serialized.
pub fn with_config_env<T>(config_toml: &str, f: impl FnOnce(&Path) -> T) -> T {
    let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, config_toml).expect("write config");

    let restore = EnvRestore::capture();
    let result = f(&path);
    drop(restore);
    result
}
