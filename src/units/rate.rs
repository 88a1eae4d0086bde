use std::{fmt, ops::Div};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Unit price of energy in euros per kilowatt-hour.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Add,
    derive_more::From,
    derive_more::FromStr,
    derive_more::Sub,
    derive_more::Sum,
)]
pub struct KilowattHourRate(pub f64);

impl KilowattHourRate {
    /// Totally ordered view for use as a sort or extremum key.
    #[must_use]
    pub const fn ordered(self) -> OrderedFloat<f64> {
        OrderedFloat(self.0)
    }
}

impl Div<f64> for KilowattHourRate {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self(self.0 / rhs)
    }
}

impl fmt::Display for KilowattHourRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} €/kWh", self.0)
    }
}
