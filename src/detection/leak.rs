use super::{AlertCandidate, DetectionRule, RuleContext};
use crate::model::AlertType;

/// Flags a reading as a leak when its flow rate is strictly above the threshold.
pub struct LeakRule {
    threshold: f64,
}

impl LeakRule {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl DetectionRule for LeakRule {
    fn name(&self) -> &'static str {
        "leak"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AlertCandidate> {
        let flow_rate = ctx.reading.flow_rate;
        if flow_rate <= self.threshold {
            return None;
        }

        // `{:?}` keeps the decimal point on whole numbers ("6.0", not "6")
        Some(AlertCandidate {
            rule: self.name(),
            alert_type: AlertType::Leak,
            message: format!("Possible water leak detected with flow rate of {flow_rate:?} L/min."),
            marks_leak: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_support::reading;

    fn run(flow_rate: f64) -> Option<AlertCandidate> {
        let r = reading(0.5, flow_rate);
        LeakRule::new(5.0).evaluate(&RuleContext {
            reading: &r,
            meter: &r.meter,
            history: &[],
        })
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(run(5.0).is_none());
        assert!(run(2.0).is_none());
        assert!(run(5.001).is_some());
    }

    #[test]
    fn message_embeds_flow_rate() {
        let candidate = run(6.0).unwrap();
        assert_eq!(candidate.alert_type, AlertType::Leak);
        assert!(candidate.marks_leak);
        assert_eq!(
            candidate.message,
            "Possible water leak detected with flow rate of 6.0 L/min."
        );
        assert!(run(7.25).unwrap().message.contains("7.25"));
    }
}
