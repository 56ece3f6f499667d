use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{MeasurementId, ProbeId};

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub af: u8,
    pub target: String,
    pub description: String,
    pub protocol: String,
    pub packets: u32,
    pub size: u32,
    pub max_hops: u32,
    pub paris: u32,
    pub response_timeout: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSet {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub requested: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRequest {
    pub definitions: Vec<MeasurementDefinition>,
    pub probes: Vec<ProbeSet>,
    pub is_oneoff: bool,
}

impl MeasurementRequest {
    /// One-off IPv4 ICMP traceroute from an explicit list of probes.
    pub fn traceroute(
        target: impl Into<String>,
        description: impl Into<String>,
        probe_ids: &[ProbeId],
    ) -> Self {
        Self {
            definitions: vec![MeasurementDefinition {
                kind: "traceroute".to_owned(),
                af: 4,
                target: target.into(),
                description: description.into(),
                protocol: "ICMP".to_owned(),
                packets: 3,
                size: 48,
                max_hops: 40,
                paris: 16,
                response_timeout: 4000,
            }],
            probes: vec![ProbeSet {
                kind: "probes".to_owned(),
                value: probe_ids.iter().join(","),
                requested: probe_ids.len(),
            }],
            is_oneoff: true,
        }
    }

    pub fn requested_probes(&self) -> usize {
        self.probes.iter().map(|set| set.requested).sum()
    }
}

#[derive(Debug, Deserialize)]
pub struct MeasurementResponse {
    #[serde(default)]
    pub measurements: Vec<MeasurementId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementStatus {
    pub id: MeasurementId,
    pub status: StatusInfo,
    #[serde(default)]
    pub probes_requested: Option<u32>,
    #[serde(default)]
    pub probes_scheduled: Option<u32>,
    #[serde(default)]
    pub participant_count: Option<u32>,
}

impl MeasurementStatus {
    pub fn code(&self) -> StatusCode {
        StatusCode::from_id(self.status.id)
    }
}

/// Measurement status codes as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Specified,
    Scheduled,
    Ongoing,
    Stopped,
    ForcedToStop,
    NoSuitableProbes,
    Failed,
    Archived,
    Unknown(i64),
}

impl StatusCode {
    pub fn from_id(id: i64) -> Self {
        match id {
            0 => Self::Specified,
            1 => Self::Scheduled,
            2 => Self::Ongoing,
            4 => Self::Stopped,
            5 => Self::ForcedToStop,
            6 => Self::NoSuitableProbes,
            7 => Self::Failed,
            8 => Self::Archived,
            other => Self::Unknown(other),
        }
    }

    /// The measurement has finished and its results are final.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stopped | Self::ForcedToStop | Self::Archived)
    }

    pub fn failure_reason(&self) -> Option<&'static str> {
        match self {
            Self::NoSuitableProbes => Some("no suitable probes"),
            Self::Failed => Some("measurement failed"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceroute_request() {
        let request = MeasurementRequest::traceroute("192.0.2.1", "test", &[10, 20, 30]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["definitions"][0]["type"], "traceroute");
        assert_eq!(json["definitions"][0]["protocol"], "ICMP");
        assert_eq!(json["definitions"][0]["max_hops"], 40);
        assert_eq!(json["probes"][0]["type"], "probes");
        assert_eq!(json["probes"][0]["value"], "10,20,30");
        assert_eq!(json["probes"][0]["requested"], 3);
        assert_eq!(json["is_oneoff"], true);
        assert_eq!(request.requested_probes(), 3);
    }

    #[test]
    fn test_status_codes() {
        assert!(StatusCode::from_id(4).is_success());
        assert!(StatusCode::from_id(5).is_success());
        assert!(!StatusCode::from_id(2).is_success());
        assert_eq!(StatusCode::from_id(6).failure_reason(), Some("no suitable probes"));
        assert_eq!(StatusCode::from_id(7).failure_reason(), Some("measurement failed"));
        assert_eq!(StatusCode::from_id(3), StatusCode::Unknown(3));
        assert_eq!(StatusCode::Unknown(3).failure_reason(), None);
    }
}
