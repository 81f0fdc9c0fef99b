/// Environment variable names used by this crate for convenient
/// configuration of the retention buffer from services.
///
/// These are purely helpers; the buffer itself only ever sees
/// [`RetentionOptions`](crate::options::RetentionOptions).

/// Retention lifetime in milliseconds, e.g. `900000` for 15 minutes.
pub const RETENTION_BUFFER_LIFETIME_MS_ENV: &str = "RETENTION_BUFFER_LIFETIME_MS";

/// Set to `0` / `false` to keep the `fmt` layer out of the subscriber
/// installed by [`init_tracing`](crate::init::init_tracing).
pub const RETENTION_BUFFER_STDOUT_ENV: &str = "RETENTION_BUFFER_STDOUT";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Interpret a flag-like environment variable; anything other than `0`,
/// `false`, `off` or `no` counts as enabled.
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        ),
        Err(_) => default,
    }
}
