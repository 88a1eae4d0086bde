//! Tibber GraphQL API: the hourly energy prices.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{
    api::client,
    cli::TibberArgs,
    core::{provider::PriceProvider, series::EnergyRate},
    prelude::*,
    units::KilowattHourRate,
};

const ENDPOINT: &str = "https://api.tibber.com/v1-beta/gql";

pub struct Api {
    client: reqwest::Client,
    access_token: String,
}

impl Api {
    pub fn try_new(args: &TibberArgs) -> Result<Self> {
        Ok(Self {
            client: client::try_new(Duration::from_secs(10))?,
            access_token: args.access_token.clone(),
        })
    }

    /// Today's and tomorrow's hourly rates, filtered down to the slots that
    /// have not fully passed yet. Near the end of a day the tomorrow list is
    /// often still empty; the short horizon is the caller's problem.
    #[instrument(skip_all, fields(since = %since))]
    pub async fn get_upcoming_rates(&self, since: DateTime<Local>) -> Result<Vec<EnergyRate>> {
        info!("fetching…");
        let response = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&self.access_token)
            .json(&Request::new())
            .send()
            .await
            .context("failed to call the Tibber API")?
            .json::<Response>()
            .await
            .context("failed to deserialize the Tibber response")?;
        let price_info = response
            .data
            .viewer
            .homes
            .into_iter()
            .next()
            .context("the Tibber account has no homes")?
            .current_subscription
            .context("the Tibber home has no active subscription")?
            .price_info;
        let rates = price_info
            .today
            .into_iter()
            .chain(price_info.tomorrow)
            .map(PricePoint::into_rate)
            .filter(|rate| rate.starts_at + TimeDelta::hours(1) > since)
            .collect::<Vec<_>>();
        info!(n_rates = rates.len(), "fetched the upcoming rates");
        Ok(rates)
    }
}

#[async_trait]
impl PriceProvider for Api {
    async fn fetch_upcoming_rates(&self, since: DateTime<Local>) -> Result<Vec<EnergyRate>> {
        self.get_upcoming_rates(since).await
    }
}

#[derive(Serialize)]
struct Request {
    query: &'static str,
}

impl Request {
    const fn new() -> Self {
        Self {
            query: "{ viewer { homes { currentSubscription { priceInfo { today { total startsAt } tomorrow { total startsAt } } } } } }",
        }
    }
}

#[derive(Deserialize)]
struct Response {
    data: Data,
}

#[derive(Deserialize)]
struct Data {
    viewer: Viewer,
}

#[derive(Deserialize)]
struct Viewer {
    homes: Vec<Home>,
}

#[derive(Deserialize)]
struct Home {
    #[serde(rename = "currentSubscription")]
    current_subscription: Option<Subscription>,
}

#[derive(Deserialize)]
struct Subscription {
    #[serde(rename = "priceInfo")]
    price_info: PriceInfo,
}

#[derive(Deserialize)]
struct PriceInfo {
    today: Vec<PricePoint>,
    tomorrow: Vec<PricePoint>,
}

#[derive(Clone, Copy, Deserialize)]
struct PricePoint {
    total: f64,

    #[serde(rename = "startsAt")]
    starts_at: DateTime<Local>,
}

impl PricePoint {
    fn into_rate(self) -> EnergyRate {
        EnergyRate { starts_at: self.starts_at, rate: KilowattHourRate(self.total) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_price_info() -> Result {
        let response: Response = serde_json::from_str(
            r#"{
                "data": {
                    "viewer": {
                        "homes": [{
                            "currentSubscription": {
                                "priceInfo": {
                                    "today": [
                                        {"total": 0.3586, "startsAt": "2025-01-15T00:00:00+01:00"},
                                        {"total": 0.3484, "startsAt": "2025-01-15T01:00:00+01:00"}
                                    ],
                                    "tomorrow": []
                                }
                            }
                        }]
                    }
                }
            }"#,
        )?;

        let home = response.data.viewer.homes.into_iter().next().unwrap();
        let price_info = home.current_subscription.unwrap().price_info;
        assert_eq!(price_info.today.len(), 2);
        assert!(price_info.tomorrow.is_empty());
        let rate = price_info.today[0].into_rate();
        assert_eq!(rate.rate, KilowattHourRate(0.3586));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "makes the API request"]
    async fn test_get_upcoming_rates_ok() -> Result {
        let args = TibberArgs { access_token: std::env::var("TIBBER_ACCESS_TOKEN")? };
        let rates = Api::try_new(&args)?.get_upcoming_rates(Local::now()).await?;
        assert!(!rates.is_empty());
        assert!(rates.iter().is_sorted_by_key(|rate| rate.starts_at));
        Ok(())
    }
}
