//! Push-model metrics sink
//!
//! Carries a fixed registry of gauge handles, renders them in the text
//! exposition format, and pushes to a gateway after each account is
//! processed. A missing or unreachable gateway is logged and ignored;
//! metrics must never take the reaper down.

use sandbox_reaper_common::metrics::{CleanupStatus, JOB_NAME, labels, names};
use std::collections::BTreeMap;
use tracing::{debug, warn};

type LabelSet = Vec<(String, String)>;

struct GaugeSeries {
    help: &'static str,
    samples: Vec<(LabelSet, f64)>,
}

/// Metrics sink with typed gauge handles, pushed to a gateway
pub struct MetricsSink {
    http: reqwest::Client,
    gateway_url: Option<String>,
    gauges: BTreeMap<&'static str, GaugeSeries>,
}

impl MetricsSink {
    /// `gateway_url = None` disables pushing; everything else still works
    /// so callers never branch on whether metrics are wired up.
    pub fn new(http: reqwest::Client, gateway_url: Option<String>) -> Self {
        let mut gauges = BTreeMap::new();
        gauges.insert(
            names::CLEANUP_STATUS,
            GaugeSeries {
                help: "Cleanup outcome per account (0=clean, 1=dirty)",
                samples: Vec::new(),
            },
        );
        gauges.insert(
            names::CURRENT_USAGE,
            GaugeSeries {
                help: "Current-window billable cost per account",
                samples: Vec::new(),
            },
        );
        gauges.insert(
            names::PREVIOUS_USAGE,
            GaugeSeries {
                help: "Previous-window billable cost per account",
                samples: Vec::new(),
            },
        );
        Self {
            http,
            gateway_url,
            gauges,
        }
    }

    fn set(&mut self, name: &'static str, account: &str, provider: &str, value: f64) {
        let label_set: LabelSet = vec![
            (labels::ACCOUNT.to_string(), account.to_string()),
            (labels::CLOUD_PROVIDER.to_string(), provider.to_string()),
        ];
        let Some(series) = self.gauges.get_mut(name) else {
            return;
        };
        if let Some(sample) = series.samples.iter_mut().find(|(ls, _)| *ls == label_set) {
            sample.1 = value;
        } else {
            series.samples.push((label_set, value));
        }
    }

    pub fn record_cleanup_status(&mut self, account: &str, provider: &str, status: CleanupStatus) {
        self.set(names::CLEANUP_STATUS, account, provider, status.as_f64());
    }

    pub fn record_usage(&mut self, account: &str, provider: &str, current: f64, previous: f64) {
        self.set(names::CURRENT_USAGE, account, provider, current);
        self.set(names::PREVIOUS_USAGE, account, provider, previous);
    }

    /// Text exposition rendering of every recorded sample
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, series) in &self.gauges {
            if series.samples.is_empty() {
                continue;
            }
            out.push_str(&format!("# HELP {name} {}\n", series.help));
            out.push_str(&format!("# TYPE {name} gauge\n"));
            for (label_set, value) in &series.samples {
                let rendered: Vec<String> = label_set
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
                    .collect();
                out.push_str(&format!("{name}{{{}}} {value}\n", rendered.join(",")));
            }
        }
        out
    }

    /// Push everything recorded so far. Failures are logged, never raised.
    pub async fn push(&self) {
        let Some(gateway) = &self.gateway_url else {
            debug!("No push gateway configured; skipping metrics push");
            return;
        };
        let body = self.render();
        if body.is_empty() {
            return;
        }

        let url = format!("{gateway}/metrics/job/{JOB_NAME}");
        match self.http.post(&url).body(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Pushed metrics");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Metrics push rejected");
            }
            Err(e) => {
                warn!(error = %e, "Metrics push failed");
            }
        }
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> MetricsSink {
        MetricsSink::new(reqwest::Client::new(), None)
    }

    #[test]
    fn test_render_format() {
        let mut sink = sink();
        sink.record_cleanup_status("acct-1", "ibm", CleanupStatus::Dirty);
        sink.record_usage("acct-1", "ibm", 12.5, 12.5);

        let body = sink.render();
        assert!(body.contains("# TYPE sandbox_cleanup_status gauge"));
        assert!(
            body.contains(r#"sandbox_cleanup_status{account="acct-1",cloud_provider="ibm"} 1"#)
        );
        assert!(body.contains(r#"sandbox_current_usage{account="acct-1",cloud_provider="ibm"} 12.5"#));
        assert!(
            body.contains(r#"sandbox_previous_usage{account="acct-1",cloud_provider="ibm"} 12.5"#)
        );
    }

    #[test]
    fn test_set_overwrites_same_labels() {
        let mut sink = sink();
        sink.record_cleanup_status("acct-1", "ibm", CleanupStatus::Dirty);
        sink.record_cleanup_status("acct-1", "ibm", CleanupStatus::Clean);

        let body = sink.render();
        assert!(body.contains("} 0\n"));
        assert!(!body.contains("} 1\n"));
    }

    #[test]
    fn test_empty_sink_renders_nothing() {
        assert!(sink().render().is_empty());
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape_label_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
    }

    #[tokio::test]
    async fn test_push_without_gateway_is_a_noop() {
        let mut sink = sink();
        sink.record_cleanup_status("acct-1", "ibm", CleanupStatus::Clean);
        // Must not panic or error.
        sink.push().await;
    }

    #[tokio::test]
    async fn test_push_to_unreachable_gateway_is_tolerated() {
        let mut sink = MetricsSink::new(
            reqwest::Client::new(),
            Some("http://127.0.0.1:1".to_string()),
        );
        sink.record_cleanup_status("acct-1", "ibm", CleanupStatus::Clean);
        sink.push().await;
    }
}
