//! Net-energy-need projection over an arbitrary time window.

use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, TimeDelta};

use crate::{
    prelude::*,
    units::{WattHours, Watts},
};

/// Daytime consumption window: the configured day-usage fraction of the daily
/// total is spent between these local hours, the rest at night.
const DAY_START_HOUR: u32 = 6;
const DAY_END_HOUR: u32 = 18;

/// Today's solar situation as reported by the forecast provider.
#[derive(Clone, Copy, Debug)]
pub struct SolarDay {
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
    pub expected_output: WattHours,
}

/// What the consumption estimate is based on.
#[derive(Clone, Copy, Debug)]
pub enum ConsumptionBasis {
    /// Average of the last days' total daily consumption.
    DailyAverage(WattHours),

    /// Flat power draw configured for an absence period.
    FlatPower(Watts),
}

/// Combines the consumption estimate and the solar forecast into a net energy
/// need over any sub-window of the planning horizon. Pure once constructed.
pub struct ForecastAggregator {
    consumption: ConsumptionBasis,
    day_usage_fraction: f64,
    solar: SolarDay,
    sunlight_shrink: f64,
}

impl ForecastAggregator {
    pub fn try_new(
        consumption: ConsumptionBasis,
        day_usage_fraction: f64,
        solar: SolarDay,
        sunlight_shrink: f64,
    ) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&day_usage_fraction),
            "the day usage fraction must be between 0 and 1 (actual: {day_usage_fraction})",
        );
        ensure!(
            (0.0..0.5).contains(&sunlight_shrink),
            "the sunlight shrink must be between 0 and 0.5 (actual: {sunlight_shrink})",
        );
        Ok(Self { consumption, day_usage_fraction, solar, sunlight_shrink })
    }

    /// Expected consumption over the window.
    ///
    /// The daily average is split into a day and a night portion and each
    /// portion is prorated linearly by the window's overlap with daytime
    /// respectively nighttime hours. During an absence the flat configured
    /// power simply runs for the whole window.
    #[must_use]
    pub fn expected_usage(&self, start: DateTime<Local>, end: DateTime<Local>) -> WattHours {
        if end <= start {
            return WattHours::ZERO;
        }
        match self.consumption {
            ConsumptionBasis::FlatPower(power) => power.over(end - start),
            ConsumptionBasis::DailyAverage(daily) => {
                let (day, night) = day_night_durations(start, end);
                let average_power = Watts(daily.0 / 24.0);
                average_power.over(day) * 2.0 * self.day_usage_fraction
                    + average_power.over(night) * 2.0 * (1.0 - self.day_usage_fraction)
            }
        }
    }

    /// Expected solar harvest over the window.
    ///
    /// The daylight interval is shrunk at both edges, where the sun is at its
    /// weakest and the forecast error largest, and the day's total output is
    /// prorated linearly by the window's overlap with the shrunk interval.
    #[must_use]
    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn expected_harvest(&self, start: DateTime<Local>, end: DateTime<Local>) -> WattHours {
        let sunlight = self.solar.sunset - self.solar.sunrise;
        if end <= start || sunlight <= TimeDelta::zero() {
            return WattHours::ZERO;
        }
        let offset = TimeDelta::seconds(
            (sunlight.num_seconds() as f64 * self.sunlight_shrink).round() as i64,
        );
        let daylight_start = self.solar.sunrise + offset;
        let daylight_end = self.solar.sunset - offset;
        let daylight = daylight_end - daylight_start;

        let sunlit = overlap(start, end, daylight_start, daylight_end);
        if sunlit <= TimeDelta::zero() {
            return WattHours::ZERO;
        }
        let average_output = Watts(self.solar.expected_output.0 * 3600.0 / daylight.num_seconds() as f64);
        average_output.over(sunlit)
    }

    /// Energy the battery must supply over the window. Negative means the
    /// harvest alone covers the consumption.
    #[must_use]
    pub fn net_need(&self, start: DateTime<Local>, end: DateTime<Local>) -> WattHours {
        self.expected_usage(start, end) - self.expected_harvest(start, end)
    }
}

/// Duration shared by two time frames.
fn overlap(
    a_start: DateTime<Local>,
    a_end: DateTime<Local>,
    b_start: DateTime<Local>,
    b_end: DateTime<Local>,
) -> TimeDelta {
    (a_end.min(b_end) - a_start.max(b_start)).max(TimeDelta::zero())
}

/// Split a window into the portion overlapping daytime hours and the rest.
fn day_night_durations(start: DateTime<Local>, end: DateTime<Local>) -> (TimeDelta, TimeDelta) {
    let total = end - start;
    let mut day = TimeDelta::zero();
    let mut date = start.date_naive();
    while date <= end.date_naive() {
        if let (Some(day_start), Some(day_end)) =
            (at_local_hour(date, DAY_START_HOUR), at_local_hour(date, DAY_END_HOUR))
        {
            day += overlap(start, end, day_start, day_end);
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    (day, total - day)
}

fn at_local_hour(date: NaiveDate, hour: u32) -> Option<DateTime<Local>> {
    date.and_hms_opt(hour, 0, 0)?.and_local_timezone(Local).earliest()
}

/// Configured absence period, `<start>;<end>` in ISO-8601 with timezones.
#[derive(Clone, Copy, Debug)]
pub struct AbsenceWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl AbsenceWindow {
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Local>) -> bool {
        self.start < timestamp && timestamp < self.end
    }
}

impl FromStr for AbsenceWindow {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let (start, end) = input
            .split_once(';')
            .context("an absence window must contain exactly one `;`")?;
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw.trim())
                .with_context(|| format!("`{raw}` is not a valid timestamp"))
                .map(|timestamp| timestamp.with_timezone(&Local))
        };
        Ok(Self { start: parse(start)?, end: parse(end)? })
    }
}
