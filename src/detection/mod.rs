//! Rule-based classification of a single reading.
//!
//! Rules are pure functions of the validated reading, its meter and an
//! optional window of prior readings. They run in declared order and never
//! touch the aggregator, so ingestion stays one lookup plus one write.

pub mod high_usage;
pub mod leak;

use crate::config::Config;
use crate::model::{AlertType, Meter, StoredReading};
use crate::validator::ValidatedReading;

pub use high_usage::HighUsageRule;
pub use leak::LeakRule;

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub reading: &'a ValidatedReading,
    pub meter: &'a Meter,
    /// Most recent readings of the meter, newest first; empty unless some rule asked for it
    pub history: &'a [StoredReading],
}

/// An alert a rule wants raised for the current reading.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub rule: &'static str,
    pub alert_type: AlertType,
    pub message: String,
    /// Whether the reading itself is flagged `is_leak`
    pub marks_leak: bool,
}

pub trait DetectionRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// How many prior readings this rule needs. Zero means none are fetched.
    fn history_window(&self) -> u64 {
        0
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AlertCandidate>;
}

/// Outcome of running every rule against one reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub is_leak: bool,
    pub candidates: Vec<AlertCandidate>,
}

pub struct DetectionEngine {
    rules: Vec<Box<dyn DetectionRule>>,
}

impl DetectionEngine {
    #[must_use]
    pub fn new(rules: Vec<Box<dyn DetectionRule>>) -> Self {
        Self { rules }
    }

    /// The leak rule always; the high-usage rule when a volume threshold is configured.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut rules: Vec<Box<dyn DetectionRule>> =
            vec![Box::new(LeakRule::new(config.leak_flow_threshold))];

        if let Some(threshold) = config.high_usage_volume_threshold {
            rules.push(Box::new(HighUsageRule::new(threshold)));
        }

        tracing::info!(
            rules = ?rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            "Initialized detection rules"
        );
        Self::new(rules)
    }

    /// Largest history window any rule asked for.
    #[must_use]
    pub fn history_window(&self) -> u64 {
        self.rules
            .iter()
            .map(|r| r.history_window())
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Verdict {
        let mut verdict = Verdict::default();
        for rule in &self.rules {
            if let Some(candidate) = rule.evaluate(ctx) {
                tracing::debug!(
                    rule = rule.name(),
                    alert_type = %candidate.alert_type,
                    meter_id = %ctx.meter.meter_id,
                    "rule_triggered"
                );
                verdict.is_leak |= candidate.marks_leak;
                verdict.candidates.push(candidate);
            }
        }
        verdict
    }
}
