//! Scaling policy resolution.

use serde::Serialize;
use tracing::warn;

use crate::config::{AutoscalerMode, AutoscalerSettings, ControllerVariant};
use crate::repositories::RepositoryDescriptor;

/// Metric-driven scaling instruction for an elastic pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPolicy {
    pub metric_type: String,
    pub scale_up_threshold: u32,
    pub scale_down_threshold: u32,
    pub scale_up_factor: f64,
    pub scale_down_factor: f64,
}

/// How a pool moves between its bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum Autoscaling {
    /// `min == max`: no autoscaler is attached.
    Fixed,
    /// Elastic pool driven by an explicit autoscaler resource.
    Metric(MetricPolicy),
    /// Elastic pool that only declares its bounds.
    SizeRange,
}

/// Resolved runner bounds for one repository. `min <= max` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingPolicy {
    pub min: u32,
    pub max: u32,
    pub autoscaling: Autoscaling,
}

impl ScalingPolicy {
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    /// The autoscaler instruction, when one should be attached.
    #[must_use]
    pub fn metric(&self) -> Option<&MetricPolicy> {
        match &self.autoscaling {
            Autoscaling::Metric(metric) => Some(metric),
            Autoscaling::Fixed | Autoscaling::SizeRange => None,
        }
    }
}

/// Maps descriptors to scaling policies using operator-supplied constants.
#[derive(Debug, Clone)]
pub struct ScalingResolver {
    settings: AutoscalerSettings,
    mode: AutoscalerMode,
}

impl ScalingResolver {
    #[must_use]
    pub fn new(settings: AutoscalerSettings, variant: ControllerVariant) -> Self {
        let mode = settings.mode_for(variant);
        Self { settings, mode }
    }

    #[must_use]
    pub fn resolve(&self, descriptor: &RepositoryDescriptor) -> ScalingPolicy {
        let min = descriptor.min_runners;
        let max = if descriptor.max_runners < min {
            warn!(
                repository = %descriptor.repository_id,
                min,
                max = descriptor.max_runners,
                "maxRunners below minRunners, pinning pool to minRunners"
            );
            min
        } else {
            descriptor.max_runners
        };

        let autoscaling = if min == max {
            Autoscaling::Fixed
        } else {
            match self.mode {
                AutoscalerMode::Metrics => Autoscaling::Metric(MetricPolicy {
                    metric_type: self.settings.metric_type.clone(),
                    scale_up_threshold: self.settings.scale_up_threshold,
                    scale_down_threshold: self.settings.scale_down_threshold,
                    scale_up_factor: self.settings.scale_up_factor,
                    scale_down_factor: self.settings.scale_down_factor,
                }),
                AutoscalerMode::SizeRange => Autoscaling::SizeRange,
            }
        };

        ScalingPolicy {
            min,
            max,
            autoscaling,
        }
    }

    /// Resolve every descriptor, preserving order.
    #[must_use]
    pub fn resolve_all(&self, descriptors: &[RepositoryDescriptor]) -> Vec<ScalingPolicy> {
        descriptors.iter().map(|d| self.resolve(d)).collect()
    }
}

impl Default for ScalingResolver {
    fn default() -> Self {
        Self::new(AutoscalerSettings::default(), ControllerVariant::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(min: u32, max: u32) -> RepositoryDescriptor {
        RepositoryDescriptor::new("acme/widgets", "r1", min, max)
    }

    #[test]
    fn test_fixed_pool_has_no_autoscaler() {
        let policy = ScalingResolver::default().resolve(&descriptor(2, 2));
        assert!(policy.is_fixed());
        assert_eq!(policy.autoscaling, Autoscaling::Fixed);
        assert!(policy.metric().is_none());
    }

    #[test]
    fn test_elastic_pool_uses_metric_defaults() {
        let policy = ScalingResolver::default().resolve(&descriptor(1, 3));
        assert_eq!((policy.min, policy.max), (1, 3));

        let metric = policy.metric().unwrap();
        assert_eq!(metric.metric_type, "TotalNumberOfQueuedAndInProgressWorkflowRuns");
        assert_eq!(metric.scale_up_threshold, 1);
        assert_eq!(metric.scale_down_threshold, 0);
        assert!((metric.scale_up_factor - 2.0).abs() < f64::EPSILON);
        assert!((metric.scale_down_factor - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_size_range_mode() {
        let resolver = ScalingResolver::new(
            AutoscalerSettings {
                mode: Some(AutoscalerMode::SizeRange),
                ..AutoscalerSettings::default()
            },
            ControllerVariant::Legacy,
        );
        let policy = resolver.resolve(&descriptor(0, 10));
        assert_eq!(policy.autoscaling, Autoscaling::SizeRange);
        assert!(policy.metric().is_none());
        assert!(!policy.is_fixed());
    }

    #[test]
    fn test_scale_set_defaults_to_size_range() {
        let resolver =
            ScalingResolver::new(AutoscalerSettings::default(), ControllerVariant::ScaleSet);
        let policy = resolver.resolve(&descriptor(1, 3));
        assert_eq!(policy.autoscaling, Autoscaling::SizeRange);
        assert!(policy.metric().is_none());
    }

    #[test]
    fn test_operator_overrides() {
        let resolver = ScalingResolver::new(
            AutoscalerSettings {
                scale_up_threshold: 4,
                scale_up_factor: 1.5,
                ..AutoscalerSettings::default()
            },
            ControllerVariant::Legacy,
        );
        let policy = resolver.resolve(&descriptor(1, 3));
        let metric = policy.metric().unwrap();
        assert_eq!(metric.scale_up_threshold, 4);
        assert!((metric.scale_up_factor - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_min_never_exceeds_max() {
        let resolver = ScalingResolver::default();
        for (min, max) in [(0, 0), (0, 1), (3, 3), (5, 2), (1, 100)] {
            let policy = resolver.resolve(&descriptor(min, max));
            assert!(policy.min <= policy.max, "{min}/{max}");
        }
    }
}
