use serde::{Deserialize, Serialize};

/// Battery state of charge as a whole percentage of capacity.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[display("{_0} %")]
pub struct StateOfCharge(u8);

impl StateOfCharge {
    /// Caps the value at 100%.
    #[must_use]
    pub const fn from_percent(percent: u8) -> Self {
        if percent > 100 { Self(100) } else { Self(percent) }
    }

    /// Rounds to the nearest whole percent and clamps into 0–100.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_percent_rounded(percent: f64) -> Self {
        Self(percent.round().clamp(0.0, 100.0) as u8)
    }

    #[must_use]
    pub const fn percent(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self.0 as f64
    }
}
