use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    error::Result,
    types::{
        measurement::{MeasurementRequest, MeasurementStatus},
        probe::Probe,
        trace::PathTrace,
        Asn, MeasurementId,
    },
};

pub mod client;

pub use client::AtlasClient;

pub fn measurement_url(id: MeasurementId) -> String {
    format!("https://atlas.ripe.net/measurements/{id}")
}

#[async_trait]
pub trait ProbeInventory: Send + Sync {
    /// Connected probes hosted in any of `asns`, grouped by ASN.
    async fn list_probes(&self, asns: &[Asn]) -> Result<HashMap<Asn, Vec<Probe>>>;
}

#[async_trait]
pub trait MeasurementService: Send + Sync {
    async fn submit(&self, request: &MeasurementRequest) -> Result<MeasurementId>;

    async fn status(&self, id: MeasurementId) -> Result<MeasurementStatus>;

    async fn results(&self, id: MeasurementId) -> Result<Vec<PathTrace>>;

    /// Number of probes that have reported so far.
    async fn result_count(&self, id: MeasurementId) -> Result<usize> {
        Ok(self.results(id).await?.len())
    }
}
