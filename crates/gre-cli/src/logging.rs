//! Subscriber setup for both binaries. Output goes to stderr: the remote
//! helper's stdout carries the wire protocol.

use gre_core::config::LogConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
    }
}
