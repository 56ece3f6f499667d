use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    types::Asn,
};

use super::{AsnLookup, AsnRecord};

pub const ASLOOKUP_URL: &str = "https://api.hackertarget.com/aslookup/";
pub const ASN_INFO_URL: &str = "https://api.bgpview.io/asn";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Address lookups go to HackerTarget, ASN names come from BGPView.
pub struct HttpAsnLookup {
    client: reqwest::Client,
    aslookup_url: String,
    asn_info_url: String,
}

#[derive(Deserialize)]
struct AsnInfoResponse {
    data: AsnInfo,
}

#[derive(Deserialize)]
struct AsnInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description_short: Option<String>,
}

impl HttpAsnLookup {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?,
            aslookup_url: ASLOOKUP_URL.to_owned(),
            asn_info_url: ASN_INFO_URL.to_owned(),
        })
    }

    pub fn with_urls(mut self, aslookup_url: impl Into<String>, asn_info_url: impl Into<String>) -> Self {
        self.aslookup_url = aslookup_url.into();
        self.asn_info_url = asn_info_url.into();
        self
    }
}

#[async_trait]
impl AsnLookup for HttpAsnLookup {
    async fn lookup_asn(&self, address: &str) -> Result<AsnRecord> {
        let body = self
            .client
            .get(&self.aslookup_url)
            .query(&[("q", address)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_aslookup(&body)
    }

    async fn lookup_name(&self, asn: Asn) -> Result<String> {
        let body = self
            .client
            .get(format!("{}/{asn}", self.asn_info_url.trim_end_matches('/')))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let info: AsnInfoResponse = serde_json::from_str(&body)?;
        [info.data.name, info.data.description_short]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .ok_or_else(|| Error::Lookup(format!("no name for AS{asn}")))
    }
}

/// Parses an aslookup answer. Two formats are in use:
/// `"8.8.8.8","15169","8.8.8.0/24","GOOGLE, US"` and the older `AS15169 GOOGLE, US`.
fn parse_aslookup(body: &str) -> Result<AsnRecord> {
    let body = body.trim();
    if body.is_empty() || body.contains("error") || body.contains("API count exceeded") {
        return Err(Error::Lookup(body.to_owned()));
    }

    let line = body.lines().next().unwrap_or_default();
    let (asn, holder) = if let Some(rest) = line.strip_prefix("AS") {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        (&rest[..digits], rest[digits..].trim())
    } else {
        let mut fields = line.split(',').map(|field| field.trim().trim_matches('"'));
        let asn = fields.nth(1).unwrap_or_default();
        // the holder may itself contain commas
        let holder = line
            .splitn(4, "\",\"")
            .nth(3)
            .map(|h| h.trim().trim_matches('"'))
            .unwrap_or_default();
        (asn, holder)
    };

    let asn: Asn = asn
        .parse()
        .map_err(|_| Error::Lookup(format!("unexpected aslookup answer: {line}")))?;
    Ok(AsnRecord {
        asn,
        holder: (!holder.is_empty()).then(|| holder.to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_answer() {
        let record = parse_aslookup("\"8.8.8.8\",\"15169\",\"8.8.8.0/24\",\"GOOGLE, US\"\n").unwrap();
        assert_eq!(
            record,
            AsnRecord {
                asn: 15169,
                holder: Some("GOOGLE, US".to_owned())
            }
        );
    }

    #[test]
    fn test_parse_legacy_answer() {
        let record = parse_aslookup("AS3320 DTAG Internet service provider operations, DE").unwrap();
        assert_eq!(record.asn, 3320);
        assert_eq!(
            record.holder.as_deref(),
            Some("DTAG Internet service provider operations, DE")
        );
        assert_eq!(parse_aslookup("AS64500").unwrap().holder, None);
    }

    #[test]
    fn test_parse_failures() {
        assert!(parse_aslookup("API count exceeded - Increase Quota with Membership").is_err());
        assert!(parse_aslookup("error input invalid - enter IP or Query AS number").is_err());
        assert!(parse_aslookup("\"10.0.0.1\",\"NA\",\"NA\",\"NA\"").is_err());
        assert!(parse_aslookup("").is_err());
    }
}
