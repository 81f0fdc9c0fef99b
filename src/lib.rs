pub mod record;
pub mod store;
pub mod query;
pub mod layer;
pub mod logger;
pub mod buffer;
pub mod options;
pub mod error;

mod eviction;
mod scope;

pub mod init;
pub mod env;

pub use buffer::RetentionBuffer;
pub use error::{BufferError, OptionsError, QueryError};
pub use logger::CategoryLogger;
pub use options::RetentionOptions;
pub use query::RecordQuery;
pub use record::{CapturedError, LogRecord, RecordExport, ScopeValue, Severity, TraceInfo};
pub use scope::ScopeGuard;

/// Target of the buffer's own diagnostics; the layer never records it.
pub const INTERNAL_TARGET: &str = "retention_buffer";
