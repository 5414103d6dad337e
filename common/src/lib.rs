pub mod cli;
pub mod shutdown;

pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}

/// Writes the readiness marker file consumed by the container's readiness probe script.
/// No-op (with a warning) off Unix, where the well-known path is unlikely to be writable.
pub fn signal_ready() {
    if let Err(e) = std::fs::write("/tmp/cleaner-operator-ready", "ready") {
        eprintln!("failed to write readiness file: {e}");
    }
}
