use crate::types::Asn;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("None of the requested ASNs have available probes (without probes: {without_probes:?})")]
    NoProbes { without_probes: Vec<Asn> },
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Couldn't decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Lookup failed: {0}")]
    Lookup(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
