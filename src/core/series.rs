//! Upcoming energy price curve: extremum search and spike detection.

use chrono::{DateTime, Local};
use itertools::Itertools;

use crate::{prelude::*, units::KilowattHourRate};

/// One hourly price sample from the energy provider.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnergyRate {
    pub starts_at: DateTime<Local>,
    pub rate: KilowattHourRate,
}

/// Time-ascending price samples from now to the provider's forecast horizon.
///
/// Constructed fresh for every planning cycle and discarded afterwards:
/// the provider may revise prices, so nothing is cached across decisions.
pub struct PriceSeries(Vec<EnergyRate>);

/// The next price dip worth planning toward.
#[derive(Clone, Copy, Debug)]
pub struct NextMinimum {
    pub index: usize,
    pub rate: EnergyRate,

    /// The true minimum may lie beyond the fetched horizon, so the decision
    /// made against it has to be re-checked once more prices are published.
    pub low_confidence: bool,
}

/// Maximal contiguous run of samples priced above the series mean,
/// together with the samples immediately before and after the run.
#[derive(Clone, Copy, Debug)]
pub struct Spike {
    pub first_index: usize,
    pub last_index: usize,
    pub before: EnergyRate,
    pub after: EnergyRate,
}

impl PriceSeries {
    pub fn try_new(rates: Vec<EnergyRate>) -> Result<Self> {
        ensure!(!rates.is_empty(), "the price series is empty");
        ensure!(
            rates.iter().tuple_windows().all(|(lhs, rhs)| lhs.starts_at < rhs.starts_at),
            "the price series timestamps are not strictly increasing",
        );
        Ok(Self(rates))
    }

    #[must_use]
    pub fn rates(&self) -> &[EnergyRate] {
        &self.0
    }

    #[must_use]
    pub fn current(&self) -> EnergyRate {
        self.0[0]
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn mean_rate(&self) -> KilowattHourRate {
        self.0.iter().map(|sample| sample.rate).sum::<KilowattHourRate>() / self.0.len() as f64
    }

    #[must_use]
    pub fn cheapest_rate(&self) -> KilowattHourRate {
        self.0
            .iter()
            .map(|sample| sample.rate)
            .min_by_key(|rate| rate.ordered())
            .unwrap_or(self.0[0].rate)
    }

    /// First index at or past `start` where the price stops rising:
    /// a sample at least as expensive as its predecessor and strictly more
    /// expensive than its successor.
    fn local_maximum_from(&self, start: usize) -> Option<usize> {
        (start.max(1)..self.0.len().saturating_sub(1))
            .find(|&index| {
                self.0[index].rate >= self.0[index - 1].rate
                    && self.0[index].rate > self.0[index + 1].rate
            })
    }

    /// Find the next meaningful price minimum: the globally cheapest sample
    /// between the first local maximum and the rise that follows it. Ties are
    /// broken towards the earliest sample to leave the most slack before it.
    ///
    /// Degenerate curves (too short, or rising through the whole horizon)
    /// yield the last available sample with `low_confidence` set: the real
    /// minimum may only become visible once more prices are published.
    #[must_use]
    pub fn next_minimum(&self) -> NextMinimum {
        let last = self.0.len() - 1;
        if self.0.len() < 3
            || self.0.iter().tuple_windows().all(|(lhs, rhs)| lhs.rate <= rhs.rate)
        {
            return NextMinimum { index: last, rate: self.0[last], low_confidence: true };
        }

        // A curve that falls from the very start has its first sample
        // standing in for the first maximum.
        let first_maximum = self.local_maximum_from(1).unwrap_or(0);
        let second_maximum = self.local_maximum_from(first_maximum + 1);
        let search_end = second_maximum.unwrap_or(last);

        let index = (first_maximum..=search_end)
            .min_by_key(|&index| self.0[index].rate.ordered())
            .unwrap_or(last);
        NextMinimum {
            index,
            rate: self.0[index],
            low_confidence: second_maximum.is_none() || index == last,
        }
    }

    /// Find a price spike strictly between the current sample and the sample
    /// at `end`, such that both boundary samples exist within that range.
    #[must_use]
    pub fn spike_before(&self, end: usize) -> Option<Spike> {
        let mean = self.mean_rate();
        let mut index = 1;
        while index < end {
            if self.0[index].rate > mean {
                let first_index = index;
                while index < end && self.0[index].rate > mean {
                    index += 1;
                }
                if index < end {
                    return Some(Spike {
                        first_index,
                        last_index: index - 1,
                        before: self.0[first_index - 1],
                        after: self.0[index],
                    });
                }
            } else {
                index += 1;
            }
        }
        None
    }
}

/// Curve observed in production: dip, morning peak, midday dip, evening peak.
#[cfg(test)]
pub(crate) const OBSERVED_DAY: [f64; 24] = [
    0.3085, 0.3082, 0.3054, 0.3053, 0.3083, 0.3151, 0.3356, 0.3548, 0.3539, 0.3366, 0.3255,
    0.3191, 0.3106, 0.3159, 0.3211, 0.3388, 0.379, 0.4193, 0.4182, 0.3784, 0.3476, 0.3346, 0.3259,
    0.3223,
];

/// Build an hourly series starting at local midnight of a fixed date.
#[cfg(test)]
pub(crate) fn hourly(rates: &[f64]) -> PriceSeries {
    use chrono::TimeZone;

    let midnight = Local.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
    PriceSeries::try_new(
        rates
            .iter()
            .enumerate()
            .map(|(hour, &rate)| EnergyRate {
                starts_at: midnight + chrono::TimeDelta::hours(hour as i64),
                rate: KilowattHourRate(rate),
            })
            .collect(),
    )
    .unwrap()
}
