use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskgate_core::AppError;

/// Last age (in days) that still classifies as green.
const GREEN_MAX_AGE_DAYS: i64 = 30;

/// Last age (in days) that still classifies as yellow.
const YELLOW_MAX_AGE_DAYS: i64 = 60;

/// Urgency tier derived from task age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLight {
    /// 0 to 30 days old.
    Green,
    /// 31 to 60 days old.
    Yellow,
    /// Older than 60 days.
    Red,
}

impl TrafficLight {
    /// Classifies an age in whole days.
    ///
    /// Negative ages come from clock skew between writers and classify as green.
    #[must_use]
    pub fn from_age_days(age_days: i64) -> Self {
        if age_days <= GREEN_MAX_AGE_DAYS {
            Self::Green
        } else if age_days <= YELLOW_MAX_AGE_DAYS {
            Self::Yellow
        } else {
            Self::Red
        }
    }

    /// Classifies a creation timestamp relative to `now`.
    #[must_use]
    pub fn at(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_age_days(age_in_days(created_at, now))
    }

    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl Display for TrafficLight {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for TrafficLight {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "red" => Ok(Self::Red),
            _ => Err(AppError::Validation(format!(
                "unknown traffic light value '{value}'"
            ))),
        }
    }
}

/// Returns the number of whole days elapsed between two instants.
#[must_use]
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(created_at).num_days()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use super::TrafficLight;

    #[test]
    fn boundaries_are_inclusive_on_the_lower_tier() {
        assert_eq!(TrafficLight::from_age_days(0), TrafficLight::Green);
        assert_eq!(TrafficLight::from_age_days(30), TrafficLight::Green);
        assert_eq!(TrafficLight::from_age_days(31), TrafficLight::Yellow);
        assert_eq!(TrafficLight::from_age_days(60), TrafficLight::Yellow);
        assert_eq!(TrafficLight::from_age_days(61), TrafficLight::Red);
    }

    #[test]
    fn negative_age_is_green() {
        assert_eq!(TrafficLight::from_age_days(-3), TrafficLight::Green);
    }

    #[test]
    fn partial_days_do_not_escalate() {
        let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single();
        assert!(created_at.is_some());
        let Some(created_at) = created_at else { return };

        let almost_31_days = created_at + Duration::days(31) - Duration::seconds(1);
        assert_eq!(
            TrafficLight::at(created_at, almost_31_days),
            TrafficLight::Green
        );
        assert_eq!(
            TrafficLight::at(created_at, created_at + Duration::days(31)),
            TrafficLight::Yellow
        );
    }

    proptest! {
        #[test]
        fn urgency_never_decreases_with_age(age in 0_i64..10_000, extra in 0_i64..1_000) {
            prop_assert!(
                TrafficLight::from_age_days(age) <= TrafficLight::from_age_days(age + extra)
            );
        }
    }
}
