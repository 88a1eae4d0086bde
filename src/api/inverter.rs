//! Local inverter bridge: the operation-mode switch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    api::client,
    cli::InverterArgs,
    core::provider::{InverterControl, OperationMode},
    prelude::*,
};

pub struct Api {
    client: reqwest::Client,
    url: Url,
}

impl Api {
    pub fn try_new(args: &InverterArgs) -> Result<Self> {
        let url = args.url.join("operation-mode").context("failed to build the bridge URL")?;
        Ok(Self { client: client::try_new(Duration::from_secs(10))?, url })
    }

    #[instrument(skip_all)]
    pub async fn get_mode(&self) -> Result<OperationMode> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("failed to call the inverter bridge")?
            .error_for_status()
            .context("the inverter bridge rejected the request")?
            .json::<ModeBody>()
            .await
            .context("failed to deserialize the inverter mode")?;
        debug!(mode = %body.mode, "read the operation mode");
        Ok(body.mode)
    }

    #[instrument(skip_all, fields(mode = %mode))]
    pub async fn post_mode(&self, mode: OperationMode) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(&ModeBody { mode })
            .send()
            .await
            .context("failed to call the inverter bridge")?
            .error_for_status()
            .context("the inverter bridge rejected the mode change")?;
        info!("commanded the operation mode");
        Ok(())
    }
}

#[async_trait]
impl InverterControl for Api {
    async fn mode(&self) -> Result<OperationMode> {
        self.get_mode().await
    }

    async fn set_mode(&self, mode: OperationMode) -> Result<()> {
        self.post_mode(mode).await
    }
}

#[derive(Deserialize, Serialize)]
struct ModeBody {
    mode: OperationMode,
}
