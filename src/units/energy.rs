use std::{fmt, ops::Mul};

use serde::{Deserialize, Serialize};

/// Amount of energy in watt-hours.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Add,
    derive_more::AddAssign,
    derive_more::From,
    derive_more::FromStr,
    derive_more::Neg,
    derive_more::Sub,
    derive_more::SubAssign,
    derive_more::Sum,
)]
pub struct WattHours(pub f64);

impl WattHours {
    pub const ZERO: Self = Self(0.0);

    #[must_use]
    pub const fn from_kilo_watt_hours(kilo_watt_hours: f64) -> Self {
        Self(kilo_watt_hours * 1000.0)
    }

    #[must_use]
    pub const fn max(self, rhs: Self) -> Self {
        Self(self.0.max(rhs.0))
    }

    #[must_use]
    pub const fn min(self, rhs: Self) -> Self {
        Self(self.0.min(rhs.0))
    }
}

impl Mul<f64> for WattHours {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}

impl fmt::Display for WattHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} Wh", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_rounds_to_whole_watt_hours() {
        assert_eq!(WattHours(2945.4).to_string(), "2945 Wh");
    }

    #[test]
    fn test_from_kilo_watt_hours() {
        assert_eq!(WattHours::from_kilo_watt_hours(7.1), WattHours(7100.0));
    }
}
