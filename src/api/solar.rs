//! Solar forecast: daily yield from forecast.solar, sun times from
//! sunrise-sunset.org.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Deserialize;

use crate::{
    api::client,
    cli::SolarArgs,
    core::{forecast::SolarDay, provider::SolarForecastProvider},
    prelude::*,
    units::WattHours,
};

const ESTIMATE_BASE_URL: &str = "https://api.forecast.solar/estimate/watthours/day";
const SUN_TIMES_URL: &str = "https://api.sunrise-sunset.org/json";

pub struct Api {
    client: reqwest::Client,
    latitude: f64,
    longitude: f64,
    declination: f64,
    azimuth: f64,
    kilowatt_peak: f64,

    /// Fixed output that skips the rate-limited forecast call.
    debug_output: Option<WattHours>,
}

impl Api {
    pub fn try_new(args: &SolarArgs) -> Result<Self> {
        Ok(Self {
            client: client::try_new(Duration::from_secs(10))?,
            latitude: args.latitude,
            longitude: args.longitude,
            declination: args.declination,
            azimuth: args.azimuth,
            kilowatt_peak: args.kilowatt_peak,
            debug_output: args.debug_output,
        })
    }

    #[instrument(skip_all)]
    pub async fn get_today(&self) -> Result<SolarDay> {
        let (sunrise, sunset) = self.get_sun_times().await?;
        let expected_output = self.get_expected_output().await?;
        info!(%sunrise, %sunset, %expected_output, "fetched today's solar forecast");
        Ok(SolarDay { sunrise, sunset, expected_output })
    }

    async fn get_expected_output(&self) -> Result<WattHours> {
        if let Some(output) = self.debug_output {
            debug!(%output, "using the configured output instead of the forecast");
            return Ok(output);
        }
        let url = format!(
            "{ESTIMATE_BASE_URL}/{}/{}/{}/{}/{}",
            self.latitude, self.longitude, self.declination, self.azimuth, self.kilowatt_peak,
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to call the solar forecast API")?
            .json::<EstimateResponse>()
            .await
            .context("failed to deserialize the solar forecast response")?;
        let today = Local::now().date_naive();
        response
            .result
            .get(&today)
            .copied()
            .map(WattHours)
            .with_context(|| format!("the solar forecast has no estimate for {today}"))
    }

    async fn get_sun_times(&self) -> Result<(DateTime<Local>, DateTime<Local>)> {
        let response = self
            .client
            .get(SUN_TIMES_URL)
            .query(&[
                ("lat", self.latitude.to_string()),
                ("lng", self.longitude.to_string()),
                ("formatted", "0".to_string()),
            ])
            .send()
            .await
            .context("failed to call the sun times API")?
            .json::<SunTimesResponse>()
            .await
            .context("failed to deserialize the sun times response")?;
        ensure!(
            response.status == "OK",
            "the sun times API failed with status `{}`",
            response.status,
        );
        Ok((
            response.results.sunrise.with_timezone(&Local),
            response.results.sunset.with_timezone(&Local),
        ))
    }
}

#[async_trait]
impl SolarForecastProvider for Api {
    async fn fetch_today(&self) -> Result<SolarDay> {
        self.get_today().await
    }
}

#[derive(Deserialize)]
struct EstimateResponse {
    result: BTreeMap<NaiveDate, f64>,
}

#[derive(Deserialize)]
struct SunTimesResponse {
    results: SunTimes,
    status: String,
}

#[derive(Deserialize)]
struct SunTimes {
    sunrise: DateTime<Utc>,
    sunset: DateTime<Utc>,
}
