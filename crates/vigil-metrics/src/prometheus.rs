//! Prometheus text exposition format.
//!
//! Renders the latest system health and the collector's counters for
//! scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use vigil_core::{HealthStatus, SystemHealth};

use crate::collector::MetricsSnapshot;

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Escape a label value per the exposition format.
fn label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn status_code(status: HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Degraded => 1,
        HealthStatus::Unhealthy => 2,
    }
}

/// Render health gauges plus recovery and rollback counters.
///
/// Service-labelled series appear in probe registration order for health
/// and in name order for the counters.
pub fn render_prometheus(health: &SystemHealth, metrics: &MetricsSnapshot) -> String {
    let mut out = String::new();

    header(
        &mut out,
        "vigil_system_status",
        "Overall status (0 healthy, 1 degraded, 2 unhealthy).",
        "gauge",
    );
    let _ = writeln!(
        out,
        "vigil_system_status{{environment=\"{}\"}} {}",
        label(&health.environment),
        status_code(health.status)
    );

    header(
        &mut out,
        "vigil_service_status",
        "Per-service status (0 healthy, 1 degraded, 2 unhealthy).",
        "gauge",
    );
    for r in &health.services {
        let _ = writeln!(
            out,
            "vigil_service_status{{service=\"{}\"}} {}",
            label(&r.service),
            status_code(r.status)
        );
    }

    header(
        &mut out,
        "vigil_service_response_time_ms",
        "Latency of the last completed probe in milliseconds.",
        "gauge",
    );
    for r in &health.services {
        if let Some(ms) = r.response_time_ms {
            let _ = writeln!(
                out,
                "vigil_service_response_time_ms{{service=\"{}\"}} {ms}",
                label(&r.service)
            );
        }
    }

    header(
        &mut out,
        "vigil_recovery_attempts_total",
        "Recovery action tries.",
        "counter",
    );
    for (service, c) in &metrics.recovery {
        let _ = writeln!(
            out,
            "vigil_recovery_attempts_total{{service=\"{}\"}} {}",
            label(service),
            c.attempts
        );
    }

    header(
        &mut out,
        "vigil_recovery_sequences_total",
        "Finished recovery sequences by outcome.",
        "counter",
    );
    for (service, c) in &metrics.recovery {
        let service = label(service);
        let _ = writeln!(
            out,
            "vigil_recovery_sequences_total{{service=\"{service}\",outcome=\"recovered\"}} {}",
            c.recovered
        );
        let _ = writeln!(
            out,
            "vigil_recovery_sequences_total{{service=\"{service}\",outcome=\"failed\"}} {}",
            c.failed
        );
    }

    header(
        &mut out,
        "vigil_rollbacks_total",
        "Rollback invocations by outcome.",
        "counter",
    );
    let rollbacks = &metrics.rollbacks;
    for (outcome, count) in [
        ("stabilized", rollbacks.stabilized),
        ("did_not_stabilize", rollbacks.did_not_stabilize),
        ("aborted", rollbacks.aborted),
    ] {
        let _ = writeln!(out, "vigil_rollbacks_total{{outcome=\"{outcome}\"}} {count}");
    }

    header(
        &mut out,
        "vigil_rollback_service_results_total",
        "Per-service rollback steps by result.",
        "counter",
    );
    for (service, c) in &metrics.rollback_services {
        let service = label(service);
        let _ = writeln!(
            out,
            "vigil_rollback_service_results_total{{service=\"{service}\",result=\"success\"}} {}",
            c.succeeded
        );
        let _ = writeln!(
            out,
            "vigil_rollback_service_results_total{{service=\"{service}\",result=\"failure\"}} {}",
            c.failed
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use vigil_core::HealthCheckResult;

    use super::*;
    use crate::collector::{RecoveryCounters, ServiceRollbackCounters};

    fn health() -> SystemHealth {
        SystemHealth::from_results(
            vec![
                HealthCheckResult::healthy("backend", 12),
                HealthCheckResult::unhealthy("database", "connection refused"),
            ],
            "1.0.0",
            "production",
        )
    }

    #[test]
    fn render_empty_counters_keeps_declarations() {
        let output = render_prometheus(&health(), &MetricsSnapshot::default());
        assert!(output.contains("# TYPE vigil_recovery_attempts_total counter"));
        assert!(output.contains("vigil_rollbacks_total{outcome=\"aborted\"} 0"));
        assert!(output.contains("vigil_system_status{environment=\"production\"} 2"));
    }

    #[test]
    fn render_service_health() {
        let output = render_prometheus(&health(), &MetricsSnapshot::default());
        assert!(output.contains("vigil_service_status{service=\"backend\"} 0"));
        assert!(output.contains("vigil_service_status{service=\"database\"} 2"));
        assert!(output.contains("vigil_service_response_time_ms{service=\"backend\"} 12"));
        // No latency when the check failed outright.
        assert!(!output.contains("vigil_service_response_time_ms{service=\"database\"}"));
    }

    #[test]
    fn render_counters() {
        let mut metrics = MetricsSnapshot::default();
        metrics.recovery.insert(
            "database".to_string(),
            RecoveryCounters {
                attempts: 4,
                recovered: 1,
                failed: 1,
            },
        );
        metrics.rollbacks.stabilized = 2;
        metrics.rollback_services.insert(
            "backend".to_string(),
            ServiceRollbackCounters {
                succeeded: 2,
                failed: 0,
            },
        );

        let output = render_prometheus(&health(), &metrics);
        assert!(output.contains("vigil_recovery_attempts_total{service=\"database\"} 4"));
        assert!(output.contains(
            "vigil_recovery_sequences_total{service=\"database\",outcome=\"recovered\"} 1"
        ));
        assert!(output.contains("vigil_rollbacks_total{outcome=\"stabilized\"} 2"));
        assert!(output.contains(
            "vigil_rollback_service_results_total{service=\"backend\",result=\"success\"} 2"
        ));
    }

    #[test]
    fn label_values_are_escaped() {
        let health = SystemHealth::from_results(
            vec![HealthCheckResult::healthy("odd\"name", 1)],
            "1.0.0",
            "test",
        );
        let output = render_prometheus(&health, &MetricsSnapshot::default());
        assert!(output.contains("vigil_service_status{service=\"odd\\\"name\"} 0"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&health(), &MetricsSnapshot::default());
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }
}
