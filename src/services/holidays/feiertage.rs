use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use super::HolidayApi;

/// Client for feiertage-api.de (`?jahr=<year>&nur_land=<region>`).
pub struct FeiertageApi {
    base_url: String,
    client: reqwest::Client,
}

impl FeiertageApi {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build holiday API client")?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl HolidayApi for FeiertageApi {
    async fn fetch_year(&self, year: i32, region: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("jahr", year.to_string()), ("nur_land", region.to_string())])
            .send()
            .await
            .context("failed to call holiday API")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("holiday API returned status {}", status);
        }

        resp.text()
            .await
            .context("failed to read holiday API response")
    }
}
