use std::{fmt, net::IpAddr, str::FromStr, time::Duration};

use itertools::Itertools;
use rand::{seq::IndexedRandom, Rng};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

pub const IP_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";
const AWS_PREFIX: &str = "aws_";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const TARGET_SERVICES: [&str; 2] = ["EC2", "AMAZON"];

/// Measurement destination as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Address(IpAddr),
    /// `aws_<region>`, e.g. `aws_us-west-2`
    AwsRegion(String),
    Host(String),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::validation("empty target"));
        }
        if let Some(region) = s.strip_prefix(AWS_PREFIX) {
            if region.is_empty() {
                return Err(Error::validation(format!("missing AWS region in '{s}'")));
            }
            return Ok(Self::AwsRegion(region.to_owned()));
        }
        Ok(match s.parse::<IpAddr>() {
            Ok(address) => Self::Address(address),
            Err(_) => Self::Host(s.to_owned()),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{address}"),
            Self::AwsRegion(region) => write!(f, "{AWS_PREFIX}{region}"),
            Self::Host(host) => f.write_str(host),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IpRanges {
    #[serde(default)]
    pub prefixes: Vec<IpPrefix>,
}

#[derive(Debug, Deserialize)]
pub struct IpPrefix {
    pub ip_prefix: String,
    pub region: String,
    pub service: String,
}

impl IpRanges {
    pub fn region_prefixes<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.prefixes
            .iter()
            .filter(move |p| p.region == region && TARGET_SERVICES.contains(&p.service.as_str()))
            .map(|p| p.ip_prefix.as_str())
    }

    pub fn regions(&self) -> Vec<String> {
        self.prefixes
            .iter()
            .filter(|p| !p.region.is_empty() && TARGET_SERVICES.contains(&p.service.as_str()))
            .map(|p| p.region.clone())
            .sorted()
            .dedup()
            .collect()
    }

    /// Network address of a random prefix announced for `region`.
    pub fn pick_address<R: Rng + ?Sized>(&self, region: &str, rng: &mut R) -> Result<String> {
        let prefixes: Vec<&str> = self.region_prefixes(region).collect();
        let prefix = prefixes
            .choose(rng)
            .ok_or_else(|| Error::validation(format!("no IP ranges found for region: {region}")))?;
        let address = prefix.split('/').next().unwrap_or_default();
        Ok(address.to_owned())
    }
}

/// Published AWS address ranges.
pub struct AwsIpRanges {
    client: reqwest::Client,
    url: String,
}

impl AwsIpRanges {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?,
            url: IP_RANGES_URL.to_owned(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<IpRanges> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        let ranges: IpRanges = serde_json::from_str(&body)?;
        debug!("Loaded {} AWS prefixes", ranges.prefixes.len());
        Ok(ranges)
    }
}

/// Turns a target into something the measurement platform can trace to.
pub async fn resolve<R: Rng + ?Sized>(
    target: &Target,
    ranges: &AwsIpRanges,
    rng: &mut R,
) -> Result<String> {
    match target {
        Target::Address(address) => Ok(address.to_string()),
        Target::Host(host) => Ok(host.clone()),
        Target::AwsRegion(region) => ranges.fetch().await?.pick_address(region, rng),
    }
}
