use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    types::{
        measurement::{MeasurementRequest, MeasurementResponse, MeasurementStatus},
        probe::{Probe, ProbePage},
        trace::PathTrace,
        Asn, MeasurementId,
    },
};

use super::{MeasurementService, ProbeInventory};

pub const BASE_URL: &str = "https://atlas.ripe.net/api/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
// Caps pagination in case the API keeps returning `next` links
const MAX_PROBE_PAGES: usize = 100;

pub struct AtlasClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AtlasClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_owned(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let body = check_status(response, reqwest::StatusCode::OK).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

async fn check_status(response: reqwest::Response, expected: reqwest::StatusCode) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if status != expected {
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl ProbeInventory for AtlasClient {
    #[instrument(skip(self))]
    async fn list_probes(&self, asns: &[Asn]) -> Result<HashMap<Asn, Vec<Probe>>> {
        if asns.is_empty() {
            return Err(Error::validation("no ASNs provided"));
        }
        let mut url = format!(
            "{}/probes/?status=1&asn_v4__in={}",
            self.base_url,
            asns.iter().join(",")
        );
        let mut probes = Vec::new();
        for _ in 0..MAX_PROBE_PAGES {
            let page: ProbePage = self.get_json(&url).await?;
            debug!("Received {} of {} probes", page.results.len(), page.count);
            probes.extend(page.results);
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(probes
            .into_iter()
            .filter_map(|probe| probe.asn().map(|asn| (asn, probe)))
            .into_group_map())
    }
}

#[async_trait]
impl MeasurementService for AtlasClient {
    #[instrument(skip_all)]
    async fn submit(&self, request: &MeasurementRequest) -> Result<MeasurementId> {
        let response = self
            .client
            .post(format!("{}/measurements/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Key {}", self.api_key))
            .json(request)
            .send()
            .await?;
        let body = check_status(response, reqwest::StatusCode::CREATED).await?;
        let created: MeasurementResponse = serde_json::from_str(&body)?;
        created
            .measurements
            .first()
            .copied()
            .ok_or_else(|| Error::UnexpectedResponse("no measurement ID returned".to_owned()))
    }

    async fn status(&self, id: MeasurementId) -> Result<MeasurementStatus> {
        self.get_json(&format!("{}/measurements/{id}/", self.base_url))
            .await
    }

    async fn results(&self, id: MeasurementId) -> Result<Vec<PathTrace>> {
        self.get_json(&format!("{}/measurements/{id}/results/", self.base_url))
            .await
    }
}
