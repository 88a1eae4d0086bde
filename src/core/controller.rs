//! The long-running loop around the planning and charging cycle.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeDelta};

use crate::{
    cli::SettingsArgs,
    core::{
        battery::BatteryModel,
        executor::ChargeExecutor,
        forecast::{ConsumptionBasis, ForecastAggregator},
        planner::{ChargeDecision, ChargePlanner},
        provider::{
            ConsumptionProvider,
            InverterControl,
            PriceProvider,
            SolarForecastProvider,
            TelemetryProvider,
        },
        series::PriceSeries,
    },
    prelude::*,
    units::{StateOfCharge, WattHours},
};

/// How long to wait before retrying after a failed cycle.
const RETRY_BACKOFF: Duration = Duration::from_secs(10 * 60);

/// Local hour at which the next day's prices are reliably published.
const RECHECK_HOUR: u32 = 14;

pub struct ControlLoop<'a> {
    pub prices: &'a dyn PriceProvider,
    pub consumption: &'a dyn ConsumptionProvider,
    pub solar: &'a dyn SolarForecastProvider,
    pub telemetry: &'a dyn TelemetryProvider,
    pub inverter: &'a dyn InverterControl,
    pub settings: &'a SettingsArgs,
    pub poll_interval: Duration,
    pub dry_run: bool,
}

impl ControlLoop<'_> {
    /// Run forever: decide at every checkpoint, charge when needed, and sleep
    /// until the next one. A failed cycle is logged and retried after a fixed
    /// back-off, whatever the cause: the providers are all remote systems
    /// that come back on their own.
    pub async fn run(&self) -> Result {
        loop {
            match self.run_cycle(Local::now()).await {
                Ok(wake_at) => {
                    info!(%wake_at, "the cycle finished, sleeping until the next checkpoint");
                    sleep_until(wake_at).await;
                }
                Err(error) => {
                    error!("the cycle failed: {error:#}");
                    warn!(
                        backoff_minutes = RETRY_BACKOFF.as_secs() / 60,
                        "retrying after the back-off",
                    );
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    /// One full cycle: fetch fresh provider snapshots, plan, and charge when
    /// needed. Returns the time the loop should wake up at next.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn run_cycle(&self, now: DateTime<Local>) -> Result<DateTime<Local>> {
        let (decision, state_of_charge) = self.decide(now).await?;
        if let Some(target) = decision.target {
            let executor = ChargeExecutor {
                inverter: self.inverter,
                telemetry: self.telemetry,
                poll_interval: self.poll_interval,
                dry_run: self.dry_run,
            };
            let report =
                executor.charge_to(state_of_charge, target, decision.next_checkpoint).await?;
            info!(
                final_state_of_charge = %report.final_state_of_charge,
                energy_bought = %report.energy_bought,
                deadline_reached = report.deadline_reached,
                "the charge event finished",
            );
        }
        Ok(self.wake_time(now, &decision))
    }

    /// Fetch the provider snapshots and derive the charge decision.
    pub async fn decide(
        &self,
        now: DateTime<Local>,
    ) -> Result<(ChargeDecision, StateOfCharge)> {
        let rates = self
            .prices
            .fetch_upcoming_rates(now)
            .await
            .context("failed to fetch the energy rates")?;
        let series = PriceSeries::try_new(rates)?;
        let state_of_charge = self
            .telemetry
            .fetch_state_of_charge()
            .await
            .context("failed to fetch the state of charge")?;
        let solar = self.solar.fetch_today().await.context("failed to fetch the solar forecast")?;
        let consumption = self.consumption_basis(now).await?;

        let battery = BatteryModel::try_new(&self.settings.battery)?;
        let forecast = ForecastAggregator::try_new(
            consumption,
            self.settings.forecast.day_usage_fraction,
            solar,
            self.settings.forecast.sunlight_shrink,
        )?;
        let decision = ChargePlanner::builder()
            .now(now)
            .state_of_charge(state_of_charge)
            .series(&series)
            .forecast(&forecast)
            .battery(&battery)
            .min_state_of_charge(self.settings.planner.min_state_of_charge)
            .max_state_of_charge(self.settings.planner.max_state_of_charge)
            .build()
            .plan();
        Ok((decision, state_of_charge))
    }

    /// During a configured absence the household draws a known flat power,
    /// otherwise the recent daily totals are averaged.
    async fn consumption_basis(&self, now: DateTime<Local>) -> Result<ConsumptionBasis> {
        if let Some(window) = self.settings.absence.window()
            && window.contains(now)
        {
            info!(power = %self.settings.absence.power, "absent, using the configured flat power");
            return Ok(ConsumptionBasis::FlatPower(self.settings.absence.power));
        }
        let totals = self
            .consumption
            .fetch_daily_totals(self.settings.forecast.history_days)
            .await
            .context("failed to fetch the consumption history")?;
        ensure!(!totals.is_empty(), "the consumption history is empty");
        #[expect(clippy::cast_precision_loss)]
        let average = WattHours(totals.iter().map(|total| total.0).sum::<f64>() / totals.len() as f64);
        info!(days = totals.len(), %average, "averaged the consumption history");
        Ok(ConsumptionBasis::DailyAverage(average))
    }

    /// A low-confidence decision is re-derived as soon as the next day's
    /// prices come out, instead of sleeping all the way to the checkpoint.
    fn wake_time(&self, now: DateTime<Local>, decision: &ChargeDecision) -> DateTime<Local> {
        if decision.recheck_required {
            let recheck = next_recheck(now);
            if recheck < decision.next_checkpoint {
                info!(%recheck, "the horizon was incomplete, waking up early to re-check");
                return recheck;
            }
        }
        decision.next_checkpoint
    }
}

/// The next occurrence of the price-publication hour.
fn next_recheck(now: DateTime<Local>) -> DateTime<Local> {
    let publication_time =
        NaiveTime::from_hms_opt(RECHECK_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.with_time(publication_time).earliest().unwrap_or(now);
    if today > now { today } else { today + TimeDelta::days(1) }
}

async fn sleep_until(wake_at: DateTime<Local>) {
    let duration = (wake_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(duration).await;
}
