//! Command-line arguments, all with environment fallbacks.

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Url;

use crate::{
    core::forecast::AbsenceWindow,
    prelude::*,
    units::{StateOfCharge, WattHours, Watts},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: wake up at every checkpoint, decide, and charge when needed.
    #[clap(name = "run")]
    Run(Box<RunArgs>),

    /// Run a single planning cycle and log the decision without touching the inverter.
    #[clap(name = "plan")]
    Plan(Box<PlanArgs>),

    /// Provider connectivity checks.
    #[clap(name = "debug")]
    Debug(Box<DebugArgs>),
}

#[derive(Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    pub providers: ProviderArgs,

    #[clap(flatten)]
    pub settings: SettingsArgs,

    /// Log the intended inverter commands without sending them.
    #[clap(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Charging progress polling interval in seconds.
    #[clap(long = "poll-interval-secs", default_value = "300", env = "POLL_INTERVAL_SECS")]
    pub poll_interval_secs: u64,
}

impl RunArgs {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Parser)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub providers: ProviderArgs,

    #[clap(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Parser)]
pub struct DebugArgs {
    #[clap(flatten)]
    pub providers: ProviderArgs,

    #[command(subcommand)]
    pub command: DebugCommand,
}

#[derive(Subcommand)]
pub enum DebugCommand {
    /// Fetch and print the upcoming energy rates.
    Prices,

    /// Fetch and print the recent daily consumption totals.
    Consumption,

    /// Fetch and print today's solar forecast.
    Solar,

    /// Fetch and print the battery telemetry.
    Telemetry,
}

/// Everything the planning cycle needs besides the providers.
#[derive(Parser)]
pub struct SettingsArgs {
    #[clap(flatten)]
    pub battery: BatteryArgs,

    #[clap(flatten)]
    pub planner: PlannerArgs,

    #[clap(flatten)]
    pub forecast: ForecastArgs,

    #[clap(flatten)]
    pub absence: AbsenceArgs,
}

#[derive(Copy, Clone, Parser)]
pub struct BatteryArgs {
    /// Usable battery capacity in watt-hours.
    #[clap(long = "battery-capacity-watt-hours", env = "BATTERY_CAPACITY_WATT_HOURS")]
    pub capacity_watt_hours: f64,

    /// Battery charging voltage in volts.
    #[clap(long = "battery-charging-voltage", env = "BATTERY_CHARGING_VOLTAGE")]
    pub charging_voltage: f64,

    /// Charging amperage during the constant-current phase.
    #[clap(long = "battery-cc-amperage", env = "BATTERY_CC_AMPERAGE")]
    pub cc_amperage: f64,

    /// Charging amperage during the constant-voltage phase.
    #[clap(long = "battery-cv-amperage", env = "BATTERY_CV_AMPERAGE")]
    pub cv_amperage: f64,

    /// State of charge percentage above which the constant-voltage phase starts.
    #[clap(long = "battery-cc-phase-limit", default_value = "80", env = "BATTERY_CC_PHASE_LIMIT")]
    pub cc_phase_limit: u8,

    #[clap(
        long = "battery-charging-efficiency",
        default_value = "0.9",
        env = "BATTERY_CHARGING_EFFICIENCY"
    )]
    pub charging_efficiency: f64,
}

#[derive(Copy, Clone, Parser)]
pub struct PlannerArgs {
    /// The battery must never drop below this state of charge percentage.
    #[clap(long = "min-state-of-charge", default_value = "20", env = "MIN_STATE_OF_CHARGE")]
    pub min_state_of_charge: StateOfCharge,

    /// Never force-charge above this state of charge percentage.
    #[clap(long = "max-state-of-charge", default_value = "90", env = "MAX_STATE_OF_CHARGE")]
    pub max_state_of_charge: StateOfCharge,
}

#[derive(Copy, Clone, Parser)]
pub struct ForecastArgs {
    /// Share of the daily consumption spent between 06:00 and 18:00.
    #[clap(long = "day-usage-fraction", default_value = "0.6", env = "DAY_USAGE_FRACTION")]
    pub day_usage_fraction: f64,

    /// Fraction of the daylight duration trimmed off each edge, where the sun
    /// is at its weakest.
    #[clap(long = "sunlight-shrink", default_value = "0.1", env = "SUNLIGHT_SHRINK")]
    pub sunlight_shrink: f64,

    /// Number of past full days averaged into the consumption estimate.
    #[clap(
        long = "consumption-history-days",
        default_value = "7",
        env = "CONSUMPTION_HISTORY_DAYS"
    )]
    pub history_days: usize,
}

#[derive(Parser)]
pub struct AbsenceArgs {
    /// Absence timeframe as `start;end` in RFC 3339.
    ///
    /// For example: `2025-01-10T00:00:00+01:00;2025-01-20T00:00:00+01:00`.
    #[clap(long = "absence-timeframe", env = "ABSENCE_TIMEFRAME")]
    pub timeframe: Option<String>,

    /// Flat household power draw in watts assumed during an absence.
    #[clap(long = "absence-power-watts", default_value = "150", env = "ABSENCE_POWER_WATTS")]
    pub power: Watts,
}

impl AbsenceArgs {
    /// The parsed absence window. Malformed configuration is logged and ignored.
    #[must_use]
    pub fn window(&self) -> Option<AbsenceWindow> {
        let raw = self.timeframe.as_deref()?;
        match raw.parse() {
            Ok(window) => Some(window),
            Err(error) => {
                warn!(raw, "ignoring the malformed absence timeframe: {error:#}");
                None
            }
        }
    }
}

#[derive(Parser)]
pub struct ProviderArgs {
    #[clap(flatten)]
    pub tibber: TibberArgs,

    #[clap(flatten)]
    pub sems: SemsArgs,

    #[clap(flatten)]
    pub solar: SolarArgs,

    #[clap(flatten)]
    pub inverter: InverterArgs,
}

#[derive(Parser)]
pub struct TibberArgs {
    /// Tibber API access token.
    #[clap(long = "tibber-access-token", env = "TIBBER_ACCESS_TOKEN")]
    pub access_token: String,
}

#[derive(Parser)]
pub struct SemsArgs {
    /// SEMS portal account name.
    #[clap(long = "sems-account", env = "SEMS_ACCOUNT")]
    pub account: String,

    /// SEMS portal password.
    #[clap(long = "sems-password", env = "SEMS_PASSWORD")]
    pub password: String,

    /// SEMS power station identifier.
    #[clap(long = "sems-power-station-id", env = "SEMS_POWER_STATION_ID")]
    pub power_station_id: String,
}

#[derive(Parser)]
pub struct SolarArgs {
    #[clap(long = "location-latitude", env = "LOCATION_LATITUDE")]
    pub latitude: f64,

    #[clap(long = "location-longitude", env = "LOCATION_LONGITUDE")]
    pub longitude: f64,

    /// Solar panel plane declination in degrees: 0 is horizontal, 90 is vertical.
    #[clap(long = "panel-declination", env = "PANEL_DECLINATION")]
    pub declination: f64,

    /// Solar panel plane azimuth in degrees: -90 is east, 0 is south, 90 is west.
    #[clap(long = "panel-azimuth", env = "PANEL_AZIMUTH")]
    pub azimuth: f64,

    /// Total installed panel peak power in kilowatts.
    #[clap(long = "panel-kilowatt-peak", env = "PANEL_KILOWATT_PEAK")]
    pub kilowatt_peak: f64,

    /// Fixed daily solar output in watt-hours, skipping the rate-limited
    /// forecast call.
    #[clap(long = "debug-solar-output", env = "DEBUG_SOLAR_OUTPUT")]
    pub debug_output: Option<WattHours>,
}

#[derive(Parser)]
pub struct InverterArgs {
    /// Base URL of the local inverter bridge. For example: `http://inverter.local:8080`.
    #[clap(long = "inverter-url", env = "INVERTER_URL")]
    pub url: Url,
}
