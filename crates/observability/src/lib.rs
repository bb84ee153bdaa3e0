use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    faq_hits_total: AtomicU64,
    no_match_total: AtomicU64,
    fallback_total: AtomicU64,
    fallback_errors_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub faq_hits_total: u64,
    pub no_match_total: u64,
    pub fallback_total: u64,
    pub fallback_errors_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faq_requests_total").increment(1);
    }

    pub fn inc_faq_hit(&self) {
        self.faq_hits_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faq_hits_total").increment(1);
    }

    pub fn inc_no_match(&self) {
        self.no_match_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faq_no_match_total").increment(1);
    }

    pub fn inc_fallback(&self) {
        self.fallback_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faq_fallback_total").increment(1);
    }

    pub fn inc_fallback_error(&self) {
        self.fallback_errors_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faq_fallback_errors_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("faq_turn_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            faq_hits_total: self.faq_hits_total.load(Ordering::Relaxed),
            no_match_total: self.no_match_total.load(Ordering::Relaxed),
            fallback_total: self.fallback_total.load(Ordering::Relaxed),
            fallback_errors_total: self.fallback_errors_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

/// JSON logs on stdout, for long-running services.
pub fn init_tracing(service_name: &str) {
    install_subscriber(service_name, std::io::stdout);
}

/// JSON logs on stderr, for commands whose stdout is their output.
pub fn init_tracing_stderr(service_name: &str) {
    install_subscriber(service_name, std::io::stderr);
}

fn install_subscriber<W>(service_name: &str, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,faq_api=info,faq_agents=info,faq_ml=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_latency_over_requests() {
        let metrics = AppMetrics::default();
        metrics.inc_request();
        metrics.inc_request();
        metrics.inc_faq_hit();
        metrics.inc_no_match();
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.faq_hits_total, 1);
        assert_eq!(snapshot.no_match_total, 1);
        assert!((snapshot.avg_latency_millis - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_snapshot_has_zero_latency() {
        assert_eq!(AppMetrics::default().snapshot().avg_latency_millis, 0.0);
    }
}
