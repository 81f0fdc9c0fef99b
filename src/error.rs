/// Error returned when a query carries an invalid regular expression.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("invalid {kind} pattern `{pattern}`: {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Error returned when retention options are rejected.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("retention lifetime must be greater than zero")]
    ZeroLifetime,

    #[error("invalid value `{value}` for {key}: expected a number of milliseconds")]
    InvalidEnv { key: &'static str, value: String },
}

/// Error type returned when starting a buffer or installing it as the
/// global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum BufferError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error("retention buffer must be started from within a tokio runtime")]
    NoRuntime,

    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}
