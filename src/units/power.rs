use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::units::WattHours;

/// Power draw or output in watts.
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
    derive_more::From,
    derive_more::FromStr,
    derive_more::Sub,
)]
pub struct Watts(pub f64);

impl Watts {
    /// Energy produced or consumed when this power is sustained over the given duration.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn over(self, duration: TimeDelta) -> WattHours {
        WattHours(self.0 * duration.num_seconds() as f64 / 3600.0)
    }
}

impl fmt::Display for Watts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} W", self.0)
    }
}
