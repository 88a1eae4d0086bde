//! The charge-planning decision procedure.

use bon::Builder;
use chrono::{DateTime, Local};

use crate::{
    core::{
        battery::BatteryModel,
        forecast::ForecastAggregator,
        series::{NextMinimum, PriceSeries},
    },
    prelude::*,
    units::StateOfCharge,
};

/// When the announced prices do not reach past the visible horizon, the real
/// consumption until the true minimum is unknown; pad the estimate.
const LOW_CONFIDENCE_USAGE_SURCHARGE: f64 = 0.2;

/// Outcome of one planning cycle. Recomputed fresh at every checkpoint and
/// never persisted; re-planning with identical inputs yields the same result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChargeDecision {
    /// State of charge to force-charge to now, or `None` when the battery
    /// survives to the next checkpoint on its own.
    pub target: Option<StateOfCharge>,

    /// When the decision has to be re-derived.
    pub next_checkpoint: DateTime<Local>,

    /// The checkpoint was planned against an incomplete horizon and must be
    /// re-checked once the next day's prices are published.
    pub recheck_required: bool,
}

impl ChargeDecision {
    #[must_use]
    pub const fn should_charge(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Builder)]
pub struct ChargePlanner<'a> {
    now: DateTime<Local>,
    state_of_charge: StateOfCharge,
    series: &'a PriceSeries,
    forecast: &'a ForecastAggregator,
    battery: &'a BatteryModel,

    /// The battery must never be drained below this floor.
    min_state_of_charge: StateOfCharge,

    /// Never force-charge above this ceiling.
    max_state_of_charge: StateOfCharge,
}

impl ChargePlanner<'_> {
    /// Decide whether to charge now, to which state of charge, and when to
    /// re-evaluate.
    #[instrument(
        skip_all,
        fields(now = %self.now, state_of_charge = %self.state_of_charge),
    )]
    #[must_use]
    pub fn plan(&self) -> ChargeDecision {
        let minimum = self.series.next_minimum();
        info!(
            at = %minimum.rate.starts_at,
            rate = %minimum.rate.rate,
            low_confidence = minimum.low_confidence,
            "found the next price minimum",
        );

        let mut expected_usage = self.forecast.expected_usage(self.now, minimum.rate.starts_at);
        if minimum.low_confidence {
            expected_usage = expected_usage * (1.0 + LOW_CONFIDENCE_USAGE_SURCHARGE);
        }
        let expected_harvest = self.forecast.expected_harvest(self.now, minimum.rate.starts_at);
        let need = expected_usage - expected_harvest;
        let projected =
            self.state_of_charge.as_f64() - self.battery.percent_points(need);
        info!(
            usage = %expected_usage,
            harvest = %expected_harvest,
            need = %need,
            projected_soc = format!("{projected:.1} %"),
            floor = %self.min_state_of_charge,
            "projected the battery level at the minimum",
        );

        let floor = self.min_state_of_charge.as_f64();
        let ceiling = self.max_state_of_charge.as_f64();

        let decision = if projected >= floor {
            self.plan_opportunistic(projected, minimum)
        } else {
            self.plan_deficit(projected, floor, ceiling, minimum)
        };

        match decision.target {
            Some(target) => {
                let duration =
                    self.battery.estimate_charge_duration(self.state_of_charge, target);
                info!(
                    %target,
                    estimated_duration_minutes = duration.num_minutes(),
                    next_checkpoint = %decision.next_checkpoint,
                    "decided to charge",
                );
            }
            None => {
                info!(next_checkpoint = %decision.next_checkpoint, "decided not to charge");
            }
        }
        decision
    }

    /// The battery survives to the minimum on its own. Normally nothing is
    /// done, but when the current hour is already the cheapest visible one,
    /// waiting for the dip would only buy the same energy at a higher price.
    fn plan_opportunistic(
        &self,
        projected: f64,
        minimum: NextMinimum,
    ) -> ChargeDecision {
        let current = self.series.current();
        let target = if current.rate <= self.series.cheapest_rate() {
            // Land on the ceiling at the minimum; the cap keeps the forecast
            // solar harvest from being displaced by bought energy.
            let raw = self.state_of_charge.as_f64()
                + (self.max_state_of_charge.as_f64() - projected);
            self.cap_forward(raw)
        } else {
            // Prices only get cheaper from here; the top-up that would land
            // the projection exactly on the floor is never a forward move.
            None
        };
        ChargeDecision {
            target,
            next_checkpoint: minimum.rate.starts_at,
            recheck_required: minimum.low_confidence,
        }
    }

    /// The battery would be drained below the floor before the minimum.
    fn plan_deficit(
        &self,
        projected: f64,
        floor: f64,
        ceiling: f64,
        minimum: NextMinimum,
    ) -> ChargeDecision {
        let required = self.state_of_charge.as_f64() + (floor - projected);

        if required <= ceiling {
            // A single charge event bridges the gap.
            return ChargeDecision {
                target: self.cap_forward(required),
                next_checkpoint: minimum.rate.starts_at,
                recheck_required: minimum.low_confidence,
            };
        }

        if let Some(spike) = self.series.spike_before(minimum.index) {
            // One dip cannot bridge the gap: fill up before the spike, then
            // re-evaluate right after it for a possible second charge event.
            info!(
                spike_start = %spike.before.starts_at,
                spike_end = %spike.after.starts_at,
                "the deficit spans a price spike, charging to the ceiling before it",
            );
            let after_spike = ceiling
                - self
                    .battery
                    .percent_points(self.forecast.net_need(self.now, spike.after.starts_at));
            let at_minimum = after_spike
                - self.battery.percent_points(
                    self.forecast.net_need(spike.after.starts_at, minimum.rate.starts_at),
                );
            if at_minimum >= floor {
                info!("no second charge event should be needed after the spike");
            } else {
                info!(
                    shortfall_points = format!("{:.1}", floor - at_minimum),
                    "a second charge event will be needed after the spike",
                );
            }
            return ChargeDecision {
                target: self.cap_forward(ceiling),
                next_checkpoint: spike.after.starts_at,
                recheck_required: minimum.low_confidence,
            };
        }

        warn!(
            required = format!("{required:.1} %"),
            ceiling = %self.max_state_of_charge,
            "the plan is infeasible, charging to the ceiling as a best effort",
        );
        ChargeDecision {
            target: self.cap_forward(ceiling),
            next_checkpoint: minimum.rate.starts_at,
            recheck_required: minimum.low_confidence,
        }
    }

    /// Round and cap a raw target. A charge event must always move forward,
    /// so a target at or below the current state of charge becomes `None`.
    fn cap_forward(&self, raw: f64) -> Option<StateOfCharge> {
        let target =
            StateOfCharge::from_percent_rounded(raw.min(self.max_state_of_charge.as_f64()));
        (target > self.state_of_charge).then_some(target)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        cli::BatteryArgs,
        core::{
            forecast::{ConsumptionBasis, SolarDay},
            series::{self, OBSERVED_DAY},
        },
        units::WattHours,
    };

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 15, hour, 0, 0).unwrap()
    }

    fn battery() -> BatteryModel {
        BatteryModel::try_new(&BatteryArgs {
            capacity_watt_hours: 7100.0,
            charging_voltage: 230.0,
            cc_amperage: 10.0,
            cv_amperage: 5.0,
            cc_phase_limit: 80,
            charging_efficiency: 0.9,
        })
        .unwrap()
    }

    /// Solar day with no output: harvest never contributes.
    fn dark_solar() -> SolarDay {
        SolarDay { sunrise: at(8), sunset: at(16), expected_output: WattHours::ZERO }
    }

    fn aggregator(daily_usage: f64, solar: SolarDay) -> ForecastAggregator {
        ForecastAggregator::try_new(
            ConsumptionBasis::DailyAverage(WattHours(daily_usage)),
            0.6,
            solar,
            0.1,
        )
        .unwrap()
    }

    /// Reproduces the observed production decision: starting at midnight with
    /// 53%, needing 2945 Wh until the 12:00 minimum, the planner tops up just
    /// enough to hit the 20% floor there.
    #[test]
    fn test_single_charge_bridges_the_deficit() {
        let series = series::hourly(&OBSERVED_DAY);
        // 00:00–12:00 covers half of both usage portions, so the daily total
        // of 5890 Wh projects to 2945 Wh over the window.
        let forecast = aggregator(5890.0, dark_solar());
        let battery = battery();
        let decision = ChargePlanner::builder()
            .now(at(0))
            .state_of_charge(StateOfCharge::from_percent(53))
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(StateOfCharge::from_percent(20))
            .max_state_of_charge(StateOfCharge::from_percent(90))
            .build()
            .plan();

        assert_eq!(decision.target, Some(StateOfCharge::from_percent(61)));
        assert_eq!(decision.next_checkpoint, at(12));
        assert!(!decision.recheck_required);
    }

    #[test]
    fn test_no_charge_when_harvest_covers_the_need() {
        let series = series::hourly(&OBSERVED_DAY);
        let sunny = SolarDay {
            sunrise: at(6),
            sunset: at(18),
            expected_output: WattHours(20000.0),
        };
        let forecast = aggregator(5890.0, sunny);
        let battery = battery();
        let decision = ChargePlanner::builder()
            .now(at(0))
            .state_of_charge(StateOfCharge::from_percent(53))
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(StateOfCharge::from_percent(20))
            .max_state_of_charge(StateOfCharge::from_percent(90))
            .build()
            .plan();

        assert!(!decision.should_charge());
        assert_eq!(decision.next_checkpoint, at(12));
    }

    #[test]
    fn test_planning_is_idempotent() {
        let series = series::hourly(&OBSERVED_DAY);
        let forecast = aggregator(5890.0, dark_solar());
        let battery = battery();
        let planner = ChargePlanner::builder()
            .now(at(0))
            .state_of_charge(StateOfCharge::from_percent(53))
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(StateOfCharge::from_percent(20))
            .max_state_of_charge(StateOfCharge::from_percent(90))
            .build();
        assert_eq!(planner.plan(), planner.plan());
    }

    /// The deficit exceeds what one charge to the ceiling can bridge, and the
    /// morning spike sits between now and the minimum: fill up now and
    /// re-evaluate right after the spike.
    #[test]
    fn test_deficit_spanning_a_spike_charges_to_the_ceiling() {
        let series = series::hourly(&OBSERVED_DAY);
        // Twice the observed daily usage: the required target would be far
        // above the ceiling.
        let forecast = aggregator(17000.0, dark_solar());
        let battery = battery();
        let decision = ChargePlanner::builder()
            .now(at(0))
            .state_of_charge(StateOfCharge::from_percent(53))
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(StateOfCharge::from_percent(20))
            .max_state_of_charge(StateOfCharge::from_percent(90))
            .build()
            .plan();

        assert_eq!(decision.target, Some(StateOfCharge::from_percent(90)));
        // The sample right after the morning spike (hours 7–8).
        assert_eq!(decision.next_checkpoint, at(9));
    }

    /// Same oversized deficit, but no spike to jump before the minimum:
    /// best effort.
    #[test]
    fn test_infeasible_plan_still_charges_to_the_ceiling() {
        let series = series::hourly(&[0.30, 0.31, 0.25, 0.33, 0.28]);
        let forecast = aggregator(80000.0, dark_solar());
        let battery = battery();
        let decision = ChargePlanner::builder()
            .now(at(0))
            .state_of_charge(StateOfCharge::from_percent(53))
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(StateOfCharge::from_percent(20))
            .max_state_of_charge(StateOfCharge::from_percent(90))
            .build()
            .plan();

        assert_eq!(decision.target, Some(StateOfCharge::from_percent(90)));
    }

    #[test]
    fn test_opportunistic_charge_at_the_cheapest_hour() {
        // The current hour is the cheapest of the whole horizon.
        let series = series::hourly(&[0.10, 0.20, 0.30, 0.20, 0.15, 0.25, 0.18]);
        let forecast = aggregator(1000.0, dark_solar());
        let battery = battery();
        let decision = ChargePlanner::builder()
            .now(at(0))
            .state_of_charge(StateOfCharge::from_percent(53))
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(StateOfCharge::from_percent(20))
            .max_state_of_charge(StateOfCharge::from_percent(90))
            .build()
            .plan();

        let target = decision.target.unwrap();
        assert!(target > StateOfCharge::from_percent(53));
        assert!(target <= StateOfCharge::from_percent(90));
    }

    #[test]
    fn test_target_never_exceeds_the_ceiling_or_moves_backwards() {
        let series = series::hourly(&OBSERVED_DAY);
        let battery = battery();
        for daily_usage in [0.0, 2000.0, 5890.0, 12000.0, 30000.0] {
            let forecast = aggregator(daily_usage, dark_solar());
            for soc in [20, 53, 89, 90] {
                let decision = ChargePlanner::builder()
                    .now(at(0))
                    .state_of_charge(StateOfCharge::from_percent(soc))
                    .series(&series)
                    .forecast(&forecast)
                    .battery(&battery)
                    .min_state_of_charge(StateOfCharge::from_percent(20))
                    .max_state_of_charge(StateOfCharge::from_percent(90))
                    .build()
                    .plan();
                if let Some(target) = decision.target {
                    assert!(target > StateOfCharge::from_percent(soc));
                    assert!(target <= StateOfCharge::from_percent(90));
                }
            }
        }
    }
}
