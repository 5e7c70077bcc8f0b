//! Telemetry failures: subscriber installation, counter registration, and rendering.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while wiring logs or progress counters.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Error from `tracing-subscriber`.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A progress counter could not be described.
    #[error("invalid progress counter '{name}'")]
    MetricsCollector {
        /// Counter name.
        name: &'static str,
        /// Error from `prometheus`.
        source: prometheus::Error,
    },
    /// A progress counter clashed with one already registered.
    #[error("progress counter '{name}' could not be registered")]
    MetricsRegister {
        /// Counter name.
        name: &'static str,
        /// Error from `prometheus`.
        source: prometheus::Error,
    },
    /// The text exposition of the counters failed.
    #[error("failed to render progress counters")]
    MetricsEncode {
        /// Error from `prometheus`.
        source: prometheus::Error,
    },
    /// The rendered exposition held invalid UTF-8.
    #[error("rendered progress counters are not utf-8")]
    MetricsUtf8 {
        /// Conversion error.
        source: std::string::FromUtf8Error,
    },
    /// `logging.format` or `--log-format` named no known format.
    #[error("unknown log format '{value}' (expected json or pretty)")]
    UnknownLogFormat {
        /// Normalised value as given.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::str::FromStr;

    use prometheus::Registry;

    use super::*;
    use crate::init::LogFormat;
    use crate::metrics::counter;

    #[test]
    fn unknown_log_format_names_the_value() {
        let err = LogFormat::from_str(" XML ").err();
        assert!(matches!(
            err,
            Some(TelemetryError::UnknownLogFormat { ref value }) if value == "xml"
        ));
        assert_eq!(
            err.map(|err| err.to_string()),
            Some("unknown log format 'xml' (expected json or pretty)".to_string())
        );
    }

    #[test]
    fn duplicate_counter_reports_its_name() -> anyhow::Result<()> {
        let registry = Registry::new();
        counter(&registry, "wscopy_objects_copied_total", "copied")?;
        let err = counter(&registry, "wscopy_objects_copied_total", "copied")
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected a registration error"))?;
        assert!(matches!(
            err,
            TelemetryError::MetricsRegister {
                name: "wscopy_objects_copied_total",
                ..
            }
        ));
        assert!(err.to_string().contains("wscopy_objects_copied_total"));
        assert!(err.source().is_some());
        Ok(())
    }

    #[test]
    fn malformed_counter_name_is_a_collector_error() {
        let err = counter(&Registry::new(), "wscopy objects", "copied").err();
        assert!(matches!(
            err,
            Some(TelemetryError::MetricsCollector {
                name: "wscopy objects",
                ..
            })
        ));
    }
}
