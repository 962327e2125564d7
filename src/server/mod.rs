// Submodules
pub mod handlers;
pub mod rate_limit;
pub mod recipient;
pub mod routes;
pub mod runtime;
mod state;

// Public API (what main.rs imports)
pub use runtime::run;
pub use state::BridgeState;
