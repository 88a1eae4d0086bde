//! SEMS portal API: battery telemetry and household consumption history.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::{
    api::client,
    cli::SemsArgs,
    core::provider::{ConsumptionProvider, TelemetryProvider},
    prelude::*,
    units::{StateOfCharge, WattHours},
};

const LOGIN_URL: &str = "https://www.semsportal.com/api/v1/Common/CrossLogin";
const CHART_BASE_URL: &str = "https://eu.semsportal.com/api/";
const LOGIN_TOKEN: &str = r#"{"version":"v2.1.0","client":"ios","language":"en"}"#;

pub struct Api {
    client: reqwest::Client,
    account: String,
    password: String,
    power_station_id: String,
}

impl Api {
    pub fn try_new(args: &SemsArgs) -> Result<Self> {
        Ok(Self {
            client: client::try_new(Duration::from_secs(20))?,
            account: args.account.clone(),
            password: args.password.clone(),
            power_station_id: args.power_station_id.clone(),
        })
    }

    /// Total consumption of the last full days, oldest first, today excluded
    /// because it is still running.
    #[instrument(skip_all)]
    pub async fn get_daily_consumption(&self, last_n_days: usize) -> Result<Vec<WattHours>> {
        let data = self.get_consumption_chart().await?;
        let totals = extract_daily_totals(&data.lines, last_n_days)?;
        info!(n_days = totals.len(), "fetched the consumption history");
        Ok(totals)
    }

    /// Cumulative energy bought from the grid since local midnight.
    #[instrument(skip_all)]
    pub async fn get_energy_bought_today(&self) -> Result<WattHours> {
        let data = self.get_consumption_chart().await?;
        let bought = WattHours::from_kilo_watt_hours(extract_last_value(&data.lines, "buy")?);
        info!(%bought, "fetched the energy bought today");
        Ok(bought)
    }

    #[instrument(skip_all)]
    pub async fn get_state_of_charge(&self) -> Result<StateOfCharge> {
        let data = self.get_power_chart().await?;
        let state_of_charge =
            StateOfCharge::from_percent_rounded(extract_last_value(&data.lines, "soc")?);
        info!(%state_of_charge, "fetched the state of charge");
        Ok(state_of_charge)
    }

    /// Authenticate against the portal. The issued tokens expire within
    /// seconds, so every request logs in again.
    async fn login(&self) -> Result<String> {
        debug!("logging in into the SEMS portal…");
        let response = self
            .client
            .post(LOGIN_URL)
            .header("Token", LOGIN_TOKEN)
            .json(&LoginRequest { account: &self.account, pwd: &self.password })
            .send()
            .await
            .context("failed to call the SEMS login endpoint")?
            .json::<LoginResponse>()
            .await
            .context("failed to deserialize the SEMS login response")?;
        // The portal responds with HTTP 200 even when the login fails.
        ensure!(
            response.code == 0,
            "the SEMS login failed: {} (code {})",
            response.msg,
            response.code,
        );
        let data = response.data.context("the SEMS login response is missing its token data")?;
        Ok(format!(
            r#"{{"version":"v2.1.0","client":"ios","language":"en","timestamp":"{}","uid":"{}","token":"{}"}}"#,
            data.timestamp, data.uid, data.token,
        ))
    }

    async fn get_consumption_chart(&self) -> Result<ChartData> {
        self.get_chart(
            "v2/Charts/GetChartByPlant",
            &ConsumptionChartRequest {
                id: &self.power_station_id,
                range: 2,
                chart_index_id: "8",
                date: today(),
            },
        )
        .await
    }

    async fn get_power_chart(&self) -> Result<ChartData> {
        self.get_chart(
            "v2/Charts/GetPlantPowerChart",
            &PowerChartRequest { id: &self.power_station_id, date: today(), full_script: false },
        )
        .await
    }

    #[instrument(skip_all, fields(path = path))]
    async fn get_chart<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<ChartData> {
        let token = self.login().await?;
        let response = self
            .client
            .post(format!("{CHART_BASE_URL}{path}"))
            .header("Token", token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to call `{path}`"))?
            .json::<ChartResponse>()
            .await
            .with_context(|| format!("failed to deserialize the `{path}` response"))?;
        ensure!(response.code == 0, "`{path}` failed: {} (code {})", response.msg, response.code);
        response.data.with_context(|| format!("the `{path}` response is missing its data"))
    }
}

#[async_trait]
impl ConsumptionProvider for Api {
    async fn fetch_daily_totals(&self, last_n_days: usize) -> Result<Vec<WattHours>> {
        self.get_daily_consumption(last_n_days).await
    }
}

#[async_trait]
impl TelemetryProvider for Api {
    async fn fetch_state_of_charge(&self) -> Result<StateOfCharge> {
        self.get_state_of_charge().await
    }

    async fn fetch_energy_purchased_today(&self) -> Result<WattHours> {
        self.get_energy_bought_today().await
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Daily totals in kilowatt-hours from the consumption line, today dropped.
fn extract_daily_totals(lines: &[Line], last_n_days: usize) -> Result<Vec<WattHours>> {
    let mut points = find_line(lines, "consumption")?.xy.clone();
    points.sort_by(|lhs, rhs| lhs.x.cmp(&rhs.x));
    points.pop();
    let skipped = points.len().saturating_sub(last_n_days);
    Ok(points
        .into_iter()
        .skip(skipped)
        .map(|point| WattHours::from_kilo_watt_hours(point.y))
        .collect())
}

/// The latest value of the first line whose label contains `needle`.
fn extract_last_value(lines: &[Line], needle: &str) -> Result<f64> {
    let line = find_line(lines, needle)?;
    let point =
        line.xy.last().with_context(|| format!("the `{}` line is empty", line.label))?;
    Ok(point.y)
}

fn find_line<'a>(lines: &'a [Line], needle: &str) -> Result<&'a Line> {
    lines
        .iter()
        .find(|line| line.label.to_lowercase().contains(needle))
        .with_context(|| format!("no `{needle}` line in the chart"))
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    account: &'a str,
    pwd: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    code: i64,
    msg: String,
    data: Option<LoginData>,
}

#[derive(Deserialize)]
struct LoginData {
    uid: String,
    timestamp: i64,
    token: String,
}

#[derive(Serialize)]
struct ConsumptionChartRequest<'a> {
    id: &'a str,
    range: u8,

    #[serde(rename = "chartIndexId")]
    chart_index_id: &'a str,

    date: String,
}

#[derive(Serialize)]
struct PowerChartRequest<'a> {
    id: &'a str,
    date: String,
    full_script: bool,
}

#[derive(Deserialize)]
struct ChartResponse {
    code: i64,
    msg: String,
    data: Option<ChartData>,
}

#[derive(Deserialize)]
struct ChartData {
    lines: Vec<Line>,
}

#[derive(Clone, Deserialize)]
struct Line {
    label: String,
    xy: Vec<Point>,
}

#[derive(Clone, Deserialize)]
struct Point {
    x: String,
    y: f64,
}
