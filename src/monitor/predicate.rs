//! Anomaly rules evaluated over a full window.

use serde::{Deserialize, Serialize};

use smokewatch_types::AlertKind;

use super::SlidingWindow;

/// Which anomaly rule a monitor applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateKind {
    /// Oldest minus newest is at least the threshold.
    Drop,
    /// Max minus min is at most the threshold.
    Stall,
}

/// An anomaly rule with its threshold in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Predicate {
    /// The rule.
    pub kind: PredicateKind,
    /// Threshold in degrees.
    pub threshold: f64,
}

impl Predicate {
    /// Create a predicate.
    pub const fn new(kind: PredicateKind, threshold: f64) -> Self {
        Self { kind, threshold }
    }

    /// A drop rule.
    pub const fn drop(threshold: f64) -> Self {
        Self::new(PredicateKind::Drop, threshold)
    }

    /// A stall rule.
    pub const fn stall(threshold: f64) -> Self {
        Self::new(PredicateKind::Stall, threshold)
    }

    /// Evaluate the rule against `window`.
    ///
    /// Only a decrease from oldest to newest counts as a drop; a rise of
    /// any size never fires.
    pub fn evaluate(&self, window: &SlidingWindow) -> Option<AlertKind> {
        match self.kind {
            PredicateKind::Drop => {
                let magnitude = window.oldest()? - window.newest()?;
                (magnitude >= self.threshold).then_some(AlertKind::Drop { magnitude })
            }
            PredicateKind::Stall => {
                let spread = window.spread()?;
                (spread <= self.threshold).then_some(AlertKind::Stall { spread })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn window(values: &[f64]) -> SlidingWindow {
        let mut w = SlidingWindow::new(NonZeroUsize::new(values.len()).unwrap());
        for &v in values {
            w.push(v);
        }
        w
    }

    #[test]
    fn test_drop_fires_at_threshold() {
        let w = window(&[225.0, 220.0, 215.0, 212.0, 210.0]);
        assert_eq!(
            Predicate::drop(15.0).evaluate(&w),
            Some(AlertKind::Drop { magnitude: 15.0 })
        );
    }

    #[test]
    fn test_drop_below_threshold_is_quiet() {
        let w = window(&[225.0, 220.0, 215.0, 212.0, 211.0]);
        assert_eq!(Predicate::drop(15.0).evaluate(&w), None);
    }

    #[test]
    fn test_drop_ignores_rise() {
        let w = window(&[100.0, 150.0, 200.0, 250.0, 300.0]);
        assert_eq!(Predicate::drop(15.0).evaluate(&w), None);
    }

    #[test]
    fn test_drop_compares_ends_only() {
        // a dip in the middle that recovers is not a drop
        let w = window(&[225.0, 150.0, 150.0, 150.0, 224.0]);
        assert_eq!(Predicate::drop(15.0).evaluate(&w), None);
    }

    #[test]
    fn test_stall_fires_within_threshold() {
        let w = window(&[150.0, 150.5, 150.2, 151.0]);
        assert_eq!(
            Predicate::stall(1.0).evaluate(&w),
            Some(AlertKind::Stall { spread: 1.0 })
        );
    }

    #[test]
    fn test_stall_quiet_when_moving() {
        let w = window(&[150.0, 150.5, 151.2]);
        assert_eq!(Predicate::stall(1.0).evaluate(&w), None);
    }

    #[test]
    fn test_empty_window_never_fires() {
        let w = SlidingWindow::new(NonZeroUsize::new(3).unwrap());
        assert_eq!(Predicate::drop(0.0).evaluate(&w), None);
        assert_eq!(Predicate::stall(100.0).evaluate(&w), None);
    }

    #[test]
    fn test_kind_deserializes_lowercase() {
        let kind: PredicateKind = serde_json::from_str("\"stall\"").unwrap();
        assert_eq!(kind, PredicateKind::Stall);
    }
}
