//! # Design
//!
//! - One variant per telemetry concern: subscriber install, collector setup, rendering.
//! - Collector failures carry the metric name and the registry step that failed.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while wiring logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed or could not be installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A Prometheus collector could not be built or registered.
    #[error("metrics collector setup failed")]
    Collector {
        /// Metric name.
        name: &'static str,
        /// Setup step (`build` or `register`).
        operation: &'static str,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be rendered in the text exposition format.
    #[error("metrics rendering failed")]
    Render {
        /// Rendering step (`encode`).
        operation: &'static str,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// Rendered metrics were not valid UTF-8.
    #[error("rendered metrics were not valid utf-8")]
    RenderUtf8 {
        /// Underlying conversion error.
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn collector(
        name: &'static str,
        operation: &'static str,
        source: prometheus::Error,
    ) -> Self {
        Self::Collector {
            name,
            operation,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use std::error::Error as _;

    #[test]
    fn collector_errors_keep_metric_context() {
        let err = TelemetryError::collector(
            "sync_items_total",
            "register",
            prometheus::Error::AlreadyReg,
        );
        assert_eq!(err.to_string(), "metrics collector setup failed");
        assert!(matches!(
            err,
            TelemetryError::Collector {
                name: "sync_items_total",
                operation: "register",
                ..
            }
        ));
        assert!(err.source().is_some());
    }

    #[test]
    fn render_errors_keep_source() -> Result<()> {
        let source = String::from_utf8(vec![0xff])
            .err()
            .ok_or_else(|| anyhow!("expected invalid utf-8"))?;
        let err = TelemetryError::RenderUtf8 { source };
        assert_eq!(err.to_string(), "rendered metrics were not valid utf-8");
        assert!(err.source().is_some());

        let err = TelemetryError::Render {
            operation: "encode",
            source: prometheus::Error::Msg("encode".into()),
        };
        assert!(err.source().is_some());
        Ok(())
    }
}
