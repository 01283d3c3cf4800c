//! The quality gate: every record must pass a named {schema, rule-set} pair
//! before it is allowed anywhere near the watermark tracker, deduplicator,
//! or sinks. A failing record is final for that ingestion: it is routed to
//! quarantine (fire-and-forget) and counted in the shared quality metrics,
//! never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::quarantine::Quarantine;
use crate::record::Record;

pub mod metrics;
pub mod rules;
pub mod schema;

pub use metrics::{CategoryCounts, QualityCategory, QualityMetrics};
pub use rules::{BusinessRule, RuleKind};
pub use schema::{FieldKind, FieldSpec, SchemaDefinition};

/// Outcome of one validation stage (schema or rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub failures: Vec<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            failures: Vec::new(),
        }
    }

    pub fn fail(failures: Vec<String>) -> Self {
        Self {
            passed: false,
            failures,
        }
    }

    pub fn from_failures(failures: Vec<String>) -> Self {
        if failures.is_empty() {
            Self::pass()
        } else {
            Self::fail(failures)
        }
    }
}

/// A registered {schema, rule-set} pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GateSpec {
    pub schema: SchemaDefinition,
    pub rules: Vec<BusinessRule>,
}

impl GateSpec {
    pub fn new(schema: SchemaDefinition, rules: Vec<BusinessRule>) -> Self {
        Self { schema, rules }
    }

    /// The fallback gate applied to pipelines without a registered gate:
    /// any non-null payload passes.
    pub fn generic() -> Self {
        Self {
            schema: SchemaDefinition::permissive("generic"),
            rules: vec![BusinessRule::new(
                "payload-present",
                QualityCategory::Completeness,
                RuleKind::PayloadNotNull,
            )],
        }
    }
}

/// Per-record gate outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityGateResult {
    pub passed: bool,
    /// First failure message when rejected.
    pub rejected_reason: Option<String>,
    pub quarantined: bool,
    pub schema: CheckOutcome,
    pub rules: CheckOutcome,
    pub elapsed: Duration,
}

/// Validates records against statically registered gates, one per known
/// pipeline, falling back to [`GateSpec::generic`] for unknown gate ids.
pub struct QualityGate<Q> {
    gates: HashMap<String, GateSpec>,
    fallback: GateSpec,
    metrics: Arc<QualityMetrics>,
    quarantine: Arc<Q>,
}

impl<Q> QualityGate<Q>
where
    Q: Quarantine + Send + Sync + 'static,
{
    pub fn new(
        gates: HashMap<String, GateSpec>,
        metrics: Arc<QualityMetrics>,
        quarantine: Arc<Q>,
    ) -> Self {
        Self {
            gates,
            fallback: GateSpec::generic(),
            metrics,
            quarantine,
        }
    }

    /// Runs schema checks first, then business rules; either failing marks
    /// the record rejected and quarantines it. Quarantine failures are
    /// logged, never propagated.
    pub async fn validate_record(
        &self,
        tenant_id: &str,
        gate_id: &str,
        record: &Record,
    ) -> QualityGateResult {
        let started = std::time::Instant::now();
        let spec = self.gates.get(gate_id).unwrap_or(&self.fallback);

        let schema_outcome = spec.schema.validate(&record.data);
        self.metrics
            .record_outcome(QualityCategory::Validity, schema_outcome.passed);

        let mut rule_failures = Vec::new();
        for rule in &spec.rules {
            let failure = rule.evaluate(record);
            self.metrics
                .record_outcome(rule.category, failure.is_none());
            if let Some(failure) = failure {
                rule_failures.push(failure);
            }
        }
        let rules_outcome = CheckOutcome::from_failures(rule_failures);

        let passed = schema_outcome.passed && rules_outcome.passed;
        let rejected_reason = schema_outcome
            .failures
            .first()
            .or_else(|| rules_outcome.failures.first())
            .cloned();

        if !passed {
            let quarantine = Arc::clone(&self.quarantine);
            let tenant = tenant_id.to_string();
            let reason = rejected_reason.clone().unwrap_or_default();
            let rejected = record.clone();
            // fire-and-forget: a quarantine failure must not abort the batch
            tokio::spawn(async move {
                if let Err(err) = quarantine.quarantine(&tenant, rejected, &reason).await {
                    warn!(%err, tenant, "Failed to quarantine rejected record");
                }
            });
        }

        QualityGateResult {
            passed,
            rejected_reason,
            quarantined: !passed,
            schema: schema_outcome,
            rules: rules_outcome,
            elapsed: started.elapsed(),
        }
    }

    pub fn metrics(&self) -> Arc<QualityMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    struct RecordingQuarantine {
        entries: parking_lot::Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl Quarantine for RecordingQuarantine {
        async fn quarantine(
            &self,
            tenant_id: &str,
            record: Record,
            reason: &str,
        ) -> crate::error::Result<()> {
            if self.fail {
                return Err(Error::Quarantine("store unavailable".to_string()));
            }
            self.entries.lock().push((
                tenant_id.to_string(),
                record.id,
                reason.to_string(),
            ));
            Ok(())
        }
    }

    fn order_gate() -> GateSpec {
        GateSpec::new(
            SchemaDefinition::new(
                "order",
                vec![FieldSpec::required("order_id", FieldKind::String)],
            ),
            vec![BusinessRule::new(
                "amount-range",
                QualityCategory::Accuracy,
                RuleKind::InRange {
                    field: "amount".to_string(),
                    min: 0.0,
                    max: 1000.0,
                },
            )],
        )
    }

    fn gate_with(
        quarantine: Arc<RecordingQuarantine>,
    ) -> QualityGate<RecordingQuarantine> {
        let mut gates = HashMap::new();
        gates.insert("orders".to_string(), order_gate());
        QualityGate::new(gates, Arc::new(QualityMetrics::new()), quarantine)
    }

    fn record(data: serde_json::Value) -> Record {
        Record::new("r-1", Utc::now(), data, "test")
    }

    #[tokio::test]
    async fn valid_record_passes() {
        let gate = gate_with(Arc::new(RecordingQuarantine::default()));
        let result = gate
            .validate_record("t-1", "orders", &record(json!({"order_id": "o", "amount": 10})))
            .await;
        assert!(result.passed);
        assert!(!result.quarantined);
        assert!(result.rejected_reason.is_none());
    }

    #[tokio::test]
    async fn schema_failure_quarantines() {
        let quarantine = Arc::new(RecordingQuarantine::default());
        let gate = gate_with(Arc::clone(&quarantine));

        let result = gate
            .validate_record("t-1", "orders", &record(json!({"amount": 10})))
            .await;
        assert!(!result.passed);
        assert!(result.quarantined);
        assert!(!result.schema.passed);
        assert!(result.rejected_reason.unwrap().contains("order_id"));

        // quarantine task is spawned; give it a chance to run
        tokio::task::yield_now().await;
        let entries = quarantine.entries.lock();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "t-1");
    }

    #[tokio::test]
    async fn rule_failure_quarantines() {
        let gate = gate_with(Arc::new(RecordingQuarantine::default()));
        let result = gate
            .validate_record(
                "t-1",
                "orders",
                &record(json!({"order_id": "o", "amount": 5000})),
            )
            .await;
        assert!(!result.passed);
        assert!(result.schema.passed);
        assert!(!result.rules.passed);
    }

    #[tokio::test]
    async fn quarantine_failure_does_not_propagate() {
        let quarantine = Arc::new(RecordingQuarantine {
            fail: true,
            ..Default::default()
        });
        let gate = gate_with(Arc::clone(&quarantine));

        // still returns a result; the quarantine error is only logged
        let result = gate
            .validate_record("t-1", "orders", &record(json!({})))
            .await;
        assert!(!result.passed);
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn unknown_gate_falls_back_to_generic() {
        let gate = gate_with(Arc::new(RecordingQuarantine::default()));

        let result = gate
            .validate_record("t-1", "unknown", &record(json!({"whatever": 1})))
            .await;
        assert!(result.passed);

        let result = gate
            .validate_record("t-1", "unknown", &record(serde_json::Value::Null))
            .await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn metrics_track_categories() {
        let gate = gate_with(Arc::new(RecordingQuarantine::default()));
        gate.validate_record("t-1", "orders", &record(json!({"order_id": "o", "amount": 10})))
            .await;
        gate.validate_record("t-1", "orders", &record(json!({"order_id": "o", "amount": -5})))
            .await;

        let metrics = gate.metrics();
        assert_eq!(metrics.rejection_rate(QualityCategory::Accuracy), 0.5);
        assert_eq!(metrics.rejection_rate(QualityCategory::Validity), 0.0);
    }
}
