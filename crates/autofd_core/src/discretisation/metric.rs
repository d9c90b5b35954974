use std::fmt;

/// Supplies the metric coefficient array for directions flagged as
/// stretched. The derivative stencil in such a direction is scaled by that
/// array instead of the reciprocal grid spacing.
pub trait MetricTransform: fmt::Debug {
    fn coefficient_array(&self, direction: usize) -> String;
}

/// Coefficient arrays named `<prefix><direction>` (`D0`, `D1`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StretchedMetric {
    prefix: String,
}

impl StretchedMetric {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for StretchedMetric {
    fn default() -> Self {
        Self::with_prefix("D")
    }
}

impl MetricTransform for StretchedMetric {
    fn coefficient_array(&self, direction: usize) -> String {
        format!("{}{direction}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_prefix() {
        assert_eq!(StretchedMetric::default().coefficient_array(2), "D2");
        assert_eq!(StretchedMetric::with_prefix("xi_x").coefficient_array(0), "xi_x0");
    }
}
