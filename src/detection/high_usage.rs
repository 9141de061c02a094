use super::{AlertCandidate, DetectionRule, RuleContext};
use crate::model::AlertType;

/// Raises a `high_usage` alert when a single sample reports more volume than
/// the threshold. Does not mark the reading as a leak.
pub struct HighUsageRule {
    threshold: f64,
}

impl HighUsageRule {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl DetectionRule for HighUsageRule {
    fn name(&self) -> &'static str {
        "high_usage"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AlertCandidate> {
        let volume = ctx.reading.volume;
        (volume > self.threshold).then(|| AlertCandidate {
            rule: self.name(),
            alert_type: AlertType::HighUsage,
            message: format!(
                "Unusually high water usage of {volume:?} L recorded (threshold {:?} L).",
                self.threshold
            ),
            marks_leak: false,
        })
    }
}
