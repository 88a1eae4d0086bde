//! State-of-charge ⇄ energy conversion and charge-duration estimation.

use chrono::TimeDelta;

use crate::{
    cli::BatteryArgs,
    prelude::*,
    units::{StateOfCharge, WattHours, Watts},
};

pub struct BatteryModel {
    capacity: WattHours,
    charging_voltage: f64,
    cc_amperage: f64,
    cv_amperage: f64,
    cc_phase_limit: StateOfCharge,
    charging_efficiency: f64,
}

impl BatteryModel {
    pub fn try_new(args: &BatteryArgs) -> Result<Self> {
        ensure!(args.capacity_watt_hours > 0.0, "the battery capacity must be positive");
        ensure!(
            (0.0..=1.0).contains(&args.charging_efficiency) && args.charging_efficiency > 0.0,
            "the charging efficiency must be between 0 and 1 (actual: {})",
            args.charging_efficiency,
        );
        Ok(Self {
            capacity: WattHours(args.capacity_watt_hours),
            charging_voltage: args.charging_voltage,
            cc_amperage: args.cc_amperage,
            cv_amperage: args.cv_amperage,
            cc_phase_limit: StateOfCharge::from_percent(args.cc_phase_limit),
            charging_efficiency: args.charging_efficiency,
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> WattHours {
        self.capacity
    }

    /// Energy stored in the battery at the given state of charge.
    #[must_use]
    pub fn energy_at(&self, state_of_charge: StateOfCharge) -> WattHours {
        self.capacity * (state_of_charge.as_f64() / 100.0)
    }

    /// The given amount of energy as percentage points of the capacity.
    #[must_use]
    pub fn percent_points(&self, energy: WattHours) -> f64 {
        energy.0 / self.capacity.0 * 100.0
    }

    /// Estimate how long charging from `from` to `to` takes.
    ///
    /// Below the CC/CV boundary the battery charges linearly at the constant
    /// current rate. Above it the charging slows down; the falloff is
    /// approximated by a flat rate at half the nominal CV-phase power, which
    /// matches the observed behavior well enough for checkpoint planning.
    /// The two phase durations are additive when the span crosses the boundary.
    #[must_use]
    pub fn estimate_charge_duration(&self, from: StateOfCharge, to: StateOfCharge) -> TimeDelta {
        if to <= from {
            return TimeDelta::zero();
        }
        // Losses stretch the time the same energy takes to arrive.
        let efficiency_factor = 1.0 + (1.0 - self.charging_efficiency);

        let cc_span = self.cc_phase_limit.as_f64().min(to.as_f64()) - from.as_f64();
        let cc_hours = if cc_span > 0.0 {
            let energy = self.capacity.0 * cc_span / 100.0;
            let power = Watts(self.charging_voltage * self.cc_amperage);
            energy / power.0 * efficiency_factor
        } else {
            0.0
        };

        let cv_span = to.as_f64() - self.cc_phase_limit.as_f64().max(from.as_f64());
        let cv_hours = if cv_span > 0.0 {
            let energy = self.capacity.0 * cv_span / 100.0;
            let power = Watts(self.charging_voltage * self.cv_amperage / 2.0);
            energy / power.0 * efficiency_factor
        } else {
            0.0
        };

        #[expect(clippy::cast_possible_truncation)]
        let seconds = ((cc_hours + cv_hours) * 3600.0).round() as i64;
        TimeDelta::seconds(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> BatteryModel {
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

    #[test]
    fn test_energy_at_state_of_charge() {
        assert_eq!(model().energy_at(StateOfCharge::from_percent(50)), WattHours(3550.0));
    }

    #[test]
    fn test_percent_points() {
        approx::assert_relative_eq!(
            model().percent_points(WattHours(2945.0)),
            41.478,
            epsilon = 1e-3,
        );
    }

    #[test]
    fn test_duration_is_zero_without_forward_progress() {
        let model = model();
        let soc = StateOfCharge::from_percent(60);
        assert_eq!(model.estimate_charge_duration(soc, soc), TimeDelta::zero());
        assert_eq!(
            model.estimate_charge_duration(soc, StateOfCharge::from_percent(50)),
            TimeDelta::zero(),
        );
    }

    #[test]
    fn test_duration_is_additive_across_the_phase_boundary() {
        let model = model();
        let low = StateOfCharge::from_percent(70);
        let boundary = StateOfCharge::from_percent(80);
        let high = StateOfCharge::from_percent(90);
        assert_eq!(
            model.estimate_charge_duration(low, high),
            model.estimate_charge_duration(low, boundary)
                + model.estimate_charge_duration(boundary, high),
        );
    }

    #[test]
    fn test_cv_phase_charges_slower() {
        let model = model();
        let below = model.estimate_charge_duration(
            StateOfCharge::from_percent(70),
            StateOfCharge::from_percent(80),
        );
        let above = model.estimate_charge_duration(
            StateOfCharge::from_percent(80),
            StateOfCharge::from_percent(90),
        );
        assert!(above > below);
    }

    #[test]
    fn test_duration_is_monotonic_in_the_charged_span() {
        let model = model();
        let start = StateOfCharge::from_percent(20);
        let mut previous = TimeDelta::zero();
        for target in 21..=100 {
            let duration =
                model.estimate_charge_duration(start, StateOfCharge::from_percent(target));
            assert!(duration > previous);
            previous = duration;
        }
    }
}
