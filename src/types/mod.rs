pub mod measurement;
pub mod probe;
pub mod trace;

/// Autonomous system number. Probes are grouped by the ASN they are hosted in.
pub type Asn = u32;
pub type ProbeId = u32;
pub type MeasurementId = u64;
