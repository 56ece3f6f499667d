use serde::Deserialize;

use super::{MeasurementId, ProbeId};

const TIMEOUT_MARKER: &str = "*";

/// Traceroute result reported by a single probe.
#[derive(Debug, Clone, Deserialize)]
pub struct PathTrace {
    #[serde(rename = "prb_id")]
    pub probe_id: ProbeId,
    #[serde(rename = "msm_id", default)]
    pub measurement_id: MeasurementId,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub dst_addr: String,
    #[serde(default)]
    pub src_addr: String,
    #[serde(rename = "result", default)]
    pub hops: Vec<Hop>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hop {
    pub hop: u32,
    #[serde(rename = "result", default)]
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub rtt: Option<f64>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub err: Option<ReplyError>,
    #[serde(default)]
    pub x: Option<String>,
}

/// ICMP error attached to a reply: a letter flag ("N", "H", "A", ...) or a numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReplyError {
    Code(i64),
    Flag(String),
}

impl Reply {
    pub fn from_address(address: &str) -> Self {
        Self {
            from: Some(address.to_owned()),
            ..Default::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            x: Some(TIMEOUT_MARKER.to_owned()),
            ..Default::default()
        }
    }

    /// Address of the responding router, unless the reply is a timeout or empty.
    pub fn address(&self) -> Option<&str> {
        if self.x.as_deref() == Some(TIMEOUT_MARKER) {
            return None;
        }
        self.from.as_deref().filter(|from| !from.is_empty())
    }
}

impl Hop {
    pub fn new(hop: u32, replies: Vec<Reply>) -> Self {
        Self { hop, replies }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.replies.iter().filter_map(Reply::address)
    }

    pub fn first_address(&self) -> Option<&str> {
        self.addresses().next()
    }

    pub fn responded(&self) -> bool {
        self.first_address().is_some()
    }
}

impl PathTrace {
    pub fn new(probe_id: ProbeId, hops: Vec<Hop>) -> Self {
        Self {
            probe_id,
            measurement_id: 0,
            timestamp: 0,
            from: String::new(),
            dst_addr: String::new(),
            src_addr: String::new(),
            hops,
        }
    }

    /// All responding addresses in hop order, repetitions included.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.hops.iter().flat_map(Hop::addresses)
    }

    /// A trace is incomplete when nothing answered at its last hop.
    pub fn is_incomplete(&self) -> bool {
        self.hops.last().is_some_and(|hop| !hop.responded())
    }
}
