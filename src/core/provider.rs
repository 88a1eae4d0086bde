//! Narrow interfaces behind which the external collaborators live.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{
    core::{forecast::SolarDay, series::EnergyRate},
    prelude::*,
    units::{StateOfCharge, WattHours},
};

/// Inverter operation mode: either force-charging from the grid or its
/// normal self-use behavior. Nothing else of the firmware is modeled.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    #[display("charge")]
    Charge,

    #[display("normal")]
    Normal,
}

#[async_trait]
pub trait PriceProvider: Sync {
    /// Fetch the upcoming hourly rates, covering at least the slot that
    /// contains `since`, in ascending time order.
    async fn fetch_upcoming_rates(&self, since: DateTime<Local>) -> Result<Vec<EnergyRate>>;
}

#[async_trait]
pub trait ConsumptionProvider: Sync {
    /// Total daily consumption of the last full days, excluding today.
    async fn fetch_daily_totals(&self, last_n_days: usize) -> Result<Vec<WattHours>>;
}

#[async_trait]
pub trait SolarForecastProvider: Sync {
    async fn fetch_today(&self) -> Result<SolarDay>;
}

#[async_trait]
pub trait TelemetryProvider: Sync {
    async fn fetch_state_of_charge(&self) -> Result<StateOfCharge>;

    /// Cumulative energy bought from the grid since local midnight.
    async fn fetch_energy_purchased_today(&self) -> Result<WattHours>;
}

#[async_trait]
pub trait InverterControl: Sync {
    async fn mode(&self) -> Result<OperationMode>;

    async fn set_mode(&self, mode: OperationMode) -> Result<()>;
}
