use std::time::Duration;

use reqwest::Client;

use crate::prelude::*;

/// Build a client with the defaults shared by all the providers.
pub fn try_new(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().user_agent("offpeak").timeout(timeout).build()?)
}
