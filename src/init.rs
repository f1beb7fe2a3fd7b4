use crate::hook::InfluxHook;
use crate::layer::InfluxLayer;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::Registry;

/// Layer installation options.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked on top of [`InfluxLayer`] so events are also printed to the
///   console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self { enable_stdout: true }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("init_tracing must be called from within a Tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Install a global `tracing` subscriber that forwards every event to
/// `hook`.
///
/// **Parameters**
/// - `hook`: the [`InfluxHook`] receiving the events.
/// - `config`: [`LayerConfig`] controlling console output.
///
/// **Returns**
/// - `Err(InitError::Subscriber)` if a global subscriber is already set.
pub fn init_tracing_with_config(hook: Arc<InfluxHook>, config: LayerConfig) -> Result<(), InitError> {
    let layer = InfluxLayer::new(hook)?;

    // The two stacks have different types, so each is installed on its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        Registry::default().with(layer).with(fmt_layer).try_init()?;
    } else {
        Registry::default().with(layer).try_init()?;
    }
    Ok(())
}

/// Equivalent to [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(hook: Arc<InfluxHook>) -> Result<(), InitError> {
    init_tracing_with_config(hook, LayerConfig::default())
}
