pub mod common;
pub mod server;
pub mod session;
pub mod transport;
pub mod ui;

/// Service name reported by the root endpoint.
pub const SERVICE_NAME: &str = "whatsapp-bridge";
