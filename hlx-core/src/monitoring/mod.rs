//! Monitoring and observability: Prometheus metrics export, the scrape/health
//! HTTP server, and the best-effort external alert sink.

pub mod alerts;
pub mod metrics;
pub mod server;

pub use alerts::{Alert, AlertCategory, AlertId, AlertManager, AlertManagerConfig, AlertOutput, AlertSeverity};
pub use metrics::{EstimatorMetrics, MetricsRegistry, OrderMetrics, SafetyMetrics};
pub use server::{MetricsServer, MetricsServerConfig};
