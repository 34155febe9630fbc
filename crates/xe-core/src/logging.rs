//! Logging infrastructure for oxidized-xenos

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};

/// Initialize the logging system based on configuration
pub fn init(config: &Config) {
    let level = match config.debug.log_level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let filter = env_filter(config, level);

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true),
    );

    if config.debug.log_to_file {
        if let Ok(file) = std::fs::File::create(&config.debug.log_path) {
            let file_layer = fmt::layer().with_writer(file).with_ansi(false);
            let _ = subscriber.with(file_layer).try_init();
        } else {
            let _ = subscriber.try_init();
        }
    } else {
        let _ = subscriber.try_init();
    }
}

/// Build the filter for `level`, opening the `gpu` target when packet
/// tracing is enabled
fn env_filter(config: &Config, level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if config.gpu.trace_packets {
        match "gpu=trace".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Invalid gpu log directive: {}", e),
        }
    }
    filter
}

/// Initialize logging with default settings (for tests and quick starts)
pub fn init_default() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Log a command processor trace message
#[macro_export]
macro_rules! gpu_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "gpu", $($arg)*)
    };
}

/// Log a command processor debug message
#[macro_export]
macro_rules! gpu_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "gpu", $($arg)*)
    };
}

/// Log a guest memory trace message
#[macro_export]
macro_rules! mem_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "memory", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_tracing_opens_gpu_target() {
        let mut config = Config::default();
        assert!(!env_filter(&config, Level::WARN).to_string().contains("gpu=trace"));

        config.gpu.trace_packets = true;
        assert!(env_filter(&config, Level::WARN).to_string().contains("gpu=trace"));
    }
}
