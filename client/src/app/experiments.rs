//! A/B experiments
//!
//! Deterministic variant assignment from a user id hash, a two-proportion
//! significance test, and a per-client record of enrollments.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentVariant {
    pub id: String,
    pub name: String,
    /// Share of users out of 100
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub variants: Vec<ExperimentVariant>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub conversions: u64,
    pub trials: u64,
}

/// 32-bit `h * 31 + unit` over UTF-16 code units.
fn user_hash(user_id: &str) -> i32 {
    user_id.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32)
    })
}

/// Bucket in `0..100` for a user id.
pub fn bucket(user_id: &str) -> u32 {
    ((user_hash(user_id) as i64).abs() % 100) as u32
}

/// Pick the first variant whose cumulative weight exceeds the user's
/// bucket, falling back to the last variant.
pub fn assign<'a>(user_id: &str, variants: &'a [ExperimentVariant]) -> Option<&'a ExperimentVariant> {
    let bucket = bucket(user_id);
    let mut cumulative = 0u32;
    for variant in variants {
        cumulative = cumulative.saturating_add(variant.weight);
        if bucket < cumulative {
            return Some(variant);
        }
    }
    variants.last()
}

/// Two-proportion z test. Empty samples are never significant.
pub fn is_significant(control: Outcome, treatment: Outcome, alpha: f64) -> bool {
    if control.trials == 0 || treatment.trials == 0 {
        return false;
    }

    let control_rate = control.conversions as f64 / control.trials as f64;
    let treatment_rate = treatment.conversions as f64 / treatment.trials as f64;
    let pooled = (control.conversions + treatment.conversions) as f64
        / (control.trials + treatment.trials) as f64;

    let standard_error = (pooled
        * (1.0 - pooled)
        * (1.0 / control.trials as f64 + 1.0 / treatment.trials as f64))
        .sqrt();

    let z = (treatment_rate - control_rate) / standard_error;
    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));

    p_value < alpha
}

/// Abramowitz-Stegun approximation of the standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    let y = 1.0 - poly * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentEvent {
    pub experiment_id: String,
    pub variant_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct ExperimentTracker {
    enrollments: HashMap<String, ExperimentVariant>,
}

impl ExperimentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enroll(&mut self, user_id: &str, experiment: &Experiment) -> Option<ExperimentVariant> {
        let variant = assign(user_id, &experiment.variants)?.clone();
        tracing::debug!(
            experiment = %experiment.id,
            variant = %variant.id,
            "Enrolled in experiment"
        );
        self.enrollments
            .insert(experiment.id.clone(), variant.clone());
        Some(variant)
    }

    pub fn variant(&self, experiment_id: &str) -> Option<&ExperimentVariant> {
        self.enrollments.get(experiment_id)
    }

    /// Record an event for an enrolled experiment. Returns `None` and logs a
    /// warning when the user is not enrolled.
    pub fn track_event(
        &self,
        experiment_id: &str,
        event_type: &str,
        data: Option<serde_json::Map<String, Value>>,
    ) -> Option<ExperimentEvent> {
        let Some(variant) = self.enrollments.get(experiment_id) else {
            tracing::warn!(experiment = %experiment_id, "User not enrolled in experiment");
            return None;
        };

        let event = ExperimentEvent {
            experiment_id: experiment_id.to_string(),
            variant_id: variant.id.clone(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            data: data.unwrap_or_default(),
        };
        tracing::debug!(
            experiment = %event.experiment_id,
            variant = %event.variant_id,
            event_type = %event.event_type,
            "Experiment event tracked"
        );
        Some(event)
    }

    /// Experiment id to variant id.
    pub fn enrollments(&self) -> HashMap<String, String> {
        self.enrollments
            .iter()
            .map(|(experiment, variant)| (experiment.clone(), variant.id.clone()))
            .collect()
    }
}
