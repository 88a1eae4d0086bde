//! Drives the inverter through a decided charge event.

use std::time::Duration;

use chrono::{DateTime, Local};

use crate::{
    core::{
        error::CycleError,
        provider::{InverterControl, OperationMode, TelemetryProvider},
    },
    prelude::*,
    units::{StateOfCharge, WattHours},
};

/// Consecutive telemetry failures tolerated while polling before the charge
/// event is abandoned.
const MAX_POLL_ERRORS: u32 = 3;

pub struct ChargeExecutor<'a> {
    pub inverter: &'a dyn InverterControl,
    pub telemetry: &'a dyn TelemetryProvider,
    pub poll_interval: Duration,
    pub dry_run: bool,
}

/// What a finished charge event looked like.
#[derive(Clone, Copy, Debug)]
pub struct ChargeReport {
    pub final_state_of_charge: StateOfCharge,
    pub energy_bought: WattHours,

    /// Charging was cut off at the deadline instead of reaching the target.
    pub deadline_reached: bool,
}

impl ChargeExecutor<'_> {
    /// Charge until `target` is reached or `deadline` passes, then switch the
    /// inverter back to normal operation.
    ///
    /// Both mode switches are verified by read-back; a mismatch aborts the
    /// cycle before any polling starts. In dry-run mode the intended actions
    /// are logged and nothing is commanded.
    #[instrument(skip_all, fields(current = %current, target = %target, deadline = %deadline))]
    pub async fn charge_to(
        &self,
        current: StateOfCharge,
        target: StateOfCharge,
        deadline: DateTime<Local>,
    ) -> Result<ChargeReport, CycleError> {
        if self.dry_run {
            info!("dry run: would charge the battery now");
            return Ok(ChargeReport {
                final_state_of_charge: target,
                energy_bought: WattHours::ZERO,
                deadline_reached: false,
            });
        }

        let bought_before = self
            .telemetry
            .fetch_energy_purchased_today()
            .await
            .map_err(CycleError::ProviderUnavailable)?;
        self.switch_mode(OperationMode::Charge).await?;
        info!("charging, checking the progress periodically");

        let mut last_seen = current;
        let mut error_count = 0;
        let mut deadline_reached = false;
        loop {
            tokio::time::sleep(self.poll_interval).await;

            if Local::now() >= deadline {
                warn!(%last_seen, "the checkpoint arrived before the target was reached");
                deadline_reached = true;
                break;
            }

            match self.poll_once().await {
                Ok((mode, state_of_charge)) => {
                    error_count = 0;
                    last_seen = state_of_charge;
                    if mode != OperationMode::Charge {
                        warn!(%mode, "the operation mode was changed externally, stopping");
                        break;
                    }
                    if state_of_charge >= target {
                        info!(%state_of_charge, "the target was reached");
                        break;
                    }
                    debug!(%state_of_charge, "still charging");
                }
                Err(error) => {
                    error_count += 1;
                    warn!(error_count, "failed to check the charging progress: {error:#}");
                    if error_count >= MAX_POLL_ERRORS {
                        warn!("giving up on this charge event");
                        break;
                    }
                }
            }
        }

        self.switch_mode(OperationMode::Normal).await?;

        // Give the telemetry portal a moment to catch up before reading the
        // purchased-energy counter again.
        tokio::time::sleep(self.poll_interval).await;
        let bought_after = self
            .telemetry
            .fetch_energy_purchased_today()
            .await
            .map_err(CycleError::ProviderUnavailable)?;

        Ok(ChargeReport {
            final_state_of_charge: last_seen,
            energy_bought: bought_after - bought_before,
            deadline_reached,
        })
    }

    async fn poll_once(&self) -> Result<(OperationMode, StateOfCharge)> {
        let mode = self.inverter.mode().await?;
        let state_of_charge = self.telemetry.fetch_state_of_charge().await?;
        Ok((mode, state_of_charge))
    }

    async fn switch_mode(&self, mode: OperationMode) -> Result<(), CycleError> {
        self.inverter.set_mode(mode).await.map_err(CycleError::InverterUnreachable)?;
        let actual = self.inverter.mode().await.map_err(CycleError::InverterUnreachable)?;
        if actual != mode {
            return Err(CycleError::ModeMismatch { commanded: mode, actual });
        }
        info!(%mode, "the inverter confirmed the mode");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::TimeDelta;

    use super::*;

    struct FakeInverter {
        mode: Mutex<OperationMode>,
        mode_reads: AtomicUsize,
        /// When set, commanded modes are silently dropped.
        ignore_writes: bool,
        /// When set, the mode flips back to normal after this many reads,
        /// as if the user had changed it from the wall unit.
        flip_to_normal_after: Option<usize>,
    }

    impl FakeInverter {
        fn new() -> Self {
            Self {
                mode: Mutex::new(OperationMode::Normal),
                mode_reads: AtomicUsize::new(0),
                ignore_writes: false,
                flip_to_normal_after: None,
            }
        }
    }

    #[async_trait]
    impl InverterControl for FakeInverter {
        async fn mode(&self) -> Result<OperationMode> {
            let reads = self.mode_reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.flip_to_normal_after.is_some_and(|threshold| reads > threshold) {
                *self.mode.lock().unwrap() = OperationMode::Normal;
            }
            Ok(*self.mode.lock().unwrap())
        }

        async fn set_mode(&self, mode: OperationMode) -> Result<()> {
            if !self.ignore_writes {
                *self.mode.lock().unwrap() = mode;
            }
            Ok(())
        }
    }

    struct FakeTelemetry {
        state_of_charge: Mutex<Vec<StateOfCharge>>,
        state_of_charge_calls: AtomicUsize,
        energy_purchased: Mutex<Vec<WattHours>>,
    }

    impl FakeTelemetry {
        fn new(socs: &[u8], purchased: &[f64]) -> Self {
            Self {
                state_of_charge: Mutex::new(
                    socs.iter().rev().copied().map(StateOfCharge::from_percent).collect(),
                ),
                state_of_charge_calls: AtomicUsize::new(0),
                energy_purchased: Mutex::new(purchased.iter().rev().copied().map(WattHours).collect()),
            }
        }
    }

    #[async_trait]
    impl TelemetryProvider for FakeTelemetry {
        async fn fetch_state_of_charge(&self) -> Result<StateOfCharge> {
            self.state_of_charge_calls.fetch_add(1, Ordering::SeqCst);
            self.state_of_charge.lock().unwrap().pop().context("no more readings")
        }

        async fn fetch_energy_purchased_today(&self) -> Result<WattHours> {
            self.energy_purchased.lock().unwrap().pop().context("no more readings")
        }
    }

    fn executor<'a>(
        inverter: &'a FakeInverter,
        telemetry: &'a FakeTelemetry,
    ) -> ChargeExecutor<'a> {
        ChargeExecutor { inverter, telemetry, poll_interval: Duration::ZERO, dry_run: false }
    }

    #[tokio::test]
    async fn test_charges_until_the_target_is_reached() -> Result {
        let inverter = FakeInverter::new();
        let telemetry = FakeTelemetry::new(&[55, 58, 62], &[1000.0, 3000.0]);
        let report = executor(&inverter, &telemetry)
            .charge_to(
                StateOfCharge::from_percent(53),
                StateOfCharge::from_percent(61),
                Local::now() + TimeDelta::hours(1),
            )
            .await?;

        assert_eq!(report.final_state_of_charge, StateOfCharge::from_percent(62));
        assert_eq!(report.energy_bought, WattHours(2000.0));
        assert!(!report.deadline_reached);
        assert_eq!(inverter.mode().await?, OperationMode::Normal);
        Ok(())
    }

    #[tokio::test]
    async fn test_mode_mismatch_aborts_before_polling() {
        let inverter = FakeInverter { ignore_writes: true, ..FakeInverter::new() };
        let telemetry = FakeTelemetry::new(&[55], &[1000.0, 1000.0]);
        let result = executor(&inverter, &telemetry)
            .charge_to(
                StateOfCharge::from_percent(53),
                StateOfCharge::from_percent(61),
                Local::now() + TimeDelta::hours(1),
            )
            .await;

        assert!(matches!(result, Err(CycleError::ModeMismatch { .. })));
        assert_eq!(telemetry.state_of_charge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deadline_cuts_the_charge_event_off() -> Result {
        let inverter = FakeInverter::new();
        let telemetry = FakeTelemetry::new(&[], &[1000.0, 1400.0]);
        let report = executor(&inverter, &telemetry)
            .charge_to(
                StateOfCharge::from_percent(53),
                StateOfCharge::from_percent(61),
                Local::now() - TimeDelta::minutes(1),
            )
            .await?;

        assert!(report.deadline_reached);
        assert_eq!(report.final_state_of_charge, StateOfCharge::from_percent(53));
        assert_eq!(report.energy_bought, WattHours(400.0));
        assert_eq!(inverter.mode().await?, OperationMode::Normal);
        Ok(())
    }

    #[tokio::test]
    async fn test_external_mode_change_stops_charging() -> Result {
        let inverter = FakeInverter {
            // Read 1 is the read-back check, read 2 the first poll; from the
            // third read on the user has flipped the mode back.
            flip_to_normal_after: Some(2),
            ..FakeInverter::new()
        };
        let telemetry = FakeTelemetry::new(&[55, 57], &[1000.0, 1500.0]);
        let report = executor(&inverter, &telemetry)
            .charge_to(
                StateOfCharge::from_percent(53),
                StateOfCharge::from_percent(90),
                Local::now() + TimeDelta::hours(1),
            )
            .await?;

        assert!(!report.deadline_reached);
        assert_eq!(report.final_state_of_charge, StateOfCharge::from_percent(57));
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_commands_nothing() -> Result {
        let inverter = FakeInverter::new();
        let telemetry = FakeTelemetry::new(&[], &[]);
        let executor =
            ChargeExecutor { inverter: &inverter, telemetry: &telemetry, poll_interval: Duration::ZERO, dry_run: true };
        let report = executor
            .charge_to(
                StateOfCharge::from_percent(53),
                StateOfCharge::from_percent(61),
                Local::now() + TimeDelta::hours(1),
            )
            .await?;

        assert_eq!(report.final_state_of_charge, StateOfCharge::from_percent(61));
        assert_eq!(inverter.mode().await?, OperationMode::Normal);
        assert_eq!(telemetry.state_of_charge_calls.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
