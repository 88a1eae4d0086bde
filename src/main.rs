#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod core;
mod prelude;
mod units;

use std::time::Duration;

use chrono::Local;
use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{inverter, sems, solar, tibber},
    cli::{Args, Command, DebugCommand, ProviderArgs},
    core::controller::ControlLoop,
    prelude::*,
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Run(args) => {
            let providers = Providers::try_new(&args.providers)?;
            let control_loop = ControlLoop {
                prices: &providers.tibber,
                consumption: &providers.sems,
                solar: &providers.solar,
                telemetry: &providers.sems,
                inverter: &providers.inverter,
                settings: &args.settings,
                poll_interval: args.poll_interval(),
                dry_run: args.dry_run,
            };
            control_loop.run().await
        }

        Command::Plan(args) => {
            let providers = Providers::try_new(&args.providers)?;
            let control_loop = ControlLoop {
                prices: &providers.tibber,
                consumption: &providers.sems,
                solar: &providers.solar,
                telemetry: &providers.sems,
                inverter: &providers.inverter,
                settings: &args.settings,
                poll_interval: Duration::ZERO,
                dry_run: true,
            };
            let (decision, state_of_charge) = control_loop.decide(Local::now()).await?;
            info!(
                %state_of_charge,
                target = ?decision.target,
                next_checkpoint = %decision.next_checkpoint,
                recheck_required = decision.recheck_required,
                "done",
            );
            Ok(())
        }

        Command::Debug(args) => match args.command {
            DebugCommand::Prices => {
                let rates =
                    tibber::Api::try_new(&args.providers.tibber)?.get_upcoming_rates(Local::now()).await?;
                for rate in &rates {
                    info!(starts_at = %rate.starts_at, rate = %rate.rate, "rate");
                }
                Ok(())
            }

            DebugCommand::Consumption => {
                let totals = sems::Api::try_new(&args.providers.sems)?.get_daily_consumption(7).await?;
                for total in &totals {
                    info!(%total, "daily consumption");
                }
                Ok(())
            }

            DebugCommand::Solar => {
                let day = solar::Api::try_new(&args.providers.solar)?.get_today().await?;
                info!(
                    sunrise = %day.sunrise,
                    sunset = %day.sunset,
                    expected_output = %day.expected_output,
                    "solar forecast",
                );
                Ok(())
            }

            DebugCommand::Telemetry => {
                let sems = sems::Api::try_new(&args.providers.sems)?;
                info!(state_of_charge = %sems.get_state_of_charge().await?, "telemetry");
                info!(energy_bought = %sems.get_energy_bought_today().await?, "telemetry");
                Ok(())
            }
        },
    }
}

/// All the provider clients, built once from the parsed arguments.
struct Providers {
    tibber: tibber::Api,
    sems: sems::Api,
    solar: solar::Api,
    inverter: inverter::Api,
}

impl Providers {
    fn try_new(args: &ProviderArgs) -> Result<Self> {
        Ok(Self {
            tibber: tibber::Api::try_new(&args.tibber)?,
            sems: sems::Api::try_new(&args.sems)?,
            solar: solar::Api::try_new(&args.solar)?,
            inverter: inverter::Api::try_new(&args.inverter)?,
        })
    }
}
