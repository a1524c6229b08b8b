// Build-time identity from Cargo.toml

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Run id used when none is configured: a random v4 UUID.
pub fn generated_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
