use serde::Deserialize;

use super::{Asn, ProbeId};

#[derive(Debug, Clone, Deserialize)]
pub struct Probe {
    pub id: ProbeId,
    #[serde(default)]
    pub address_v4: Option<String>,
    #[serde(default)]
    pub asn_v4: Option<Asn>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl Probe {
    pub fn new(id: ProbeId, asn: Asn) -> Self {
        Self {
            id,
            address_v4: None,
            asn_v4: Some(asn),
            country_code: None,
            description: None,
            is_public: true,
        }
    }

    /// The origin network of the probe, if the inventory reported one.
    pub fn asn(&self) -> Option<Asn> {
        self.asn_v4.filter(|asn| *asn > 0)
    }
}

/// One page of the probe listing. `next` is an absolute URL of the following page.
#[derive(Debug, Deserialize)]
pub struct ProbePage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Probe>,
}
