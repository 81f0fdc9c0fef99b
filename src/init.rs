use crate::buffer::RetentionBuffer;
use crate::env::{env_flag, RETENTION_BUFFER_STDOUT_ENV};
use crate::error::BufferError;
use crate::options::RetentionOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the globally installed subscriber.
///
/// **Fields**
/// - `options`: [`RetentionOptions`] the buffer starts with.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to the [`RetentionLayer`](crate::layer::RetentionLayer) so
///   events are also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub options: RetentionOptions,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            options: RetentionOptions::default(),
            enable_stdout: true,
        }
    }
}

impl LayerConfig {
    /// Read `RETENTION_BUFFER_LIFETIME_MS` and `RETENTION_BUFFER_STDOUT`.
    pub fn from_env() -> Result<Self, BufferError> {
        Ok(Self {
            options: RetentionOptions::from_env()?,
            enable_stdout: env_flag(RETENTION_BUFFER_STDOUT_ENV, true),
        })
    }
}

/// Install `buffer` as the global `tracing` subscriber.
///
/// **Parameters**
/// - `buffer`: the [`RetentionBuffer`] that receives every event.
/// - `enable_stdout`: also print events through the `fmt` layer.
///
/// **Returns**
/// - `Err(BufferError::Subscriber(..))` when a global subscriber is
///   already installed. `buffer` is shut down in that case, since nothing
///   will ever feed it.
pub fn install_global(buffer: &RetentionBuffer, enable_stdout: bool) -> Result<(), BufferError> {
    let layer = buffer.layer();

    // The two subscriber shapes have different types, hence two branches.
    let installed = if enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    };

    if let Err(e) = installed {
        buffer.shutdown();
        return Err(e.into());
    }
    Ok(())
}

/// Start a [`RetentionBuffer`] and install it as the global `tracing`
/// subscriber.
///
/// **Parameters**
/// - `config`: [`LayerConfig`] with the initial retention options and the
///   console toggle.
///
/// **Returns**
/// - The buffer handle, to query records and push option changes.
/// - `Err(..)` outside a tokio runtime, for invalid options or when a
///   global subscriber is already installed.
pub fn init_tracing_with_config(config: LayerConfig) -> Result<RetentionBuffer, BufferError> {
    let buffer = RetentionBuffer::start(config.options)?;
    install_global(&buffer, config.enable_stdout)?;
    Ok(buffer)
}

/// Initialize tracing with settings from the environment.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::from_env`]. This is the recommended entrypoint for
/// typical services.
pub fn init_tracing() -> Result<RetentionBuffer, BufferError> {
    init_tracing_with_config(LayerConfig::from_env()?)
}
