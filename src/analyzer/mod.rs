use tracing::{debug, instrument};

use crate::{
    asn::{AsnLookup, AsnResolver},
    error::Result,
    types::trace::PathTrace,
};

mod common;
mod stats;

pub use common::{common_asns, observe_asns, AsnObservation, AsnSummary, HOP_RANGE_SPAN};
pub use stats::{path_stats, PathStats};

/// Finds the ASNs crossed by at least `threshold` of the traces, resolving every responding
/// address through `resolver` first.
#[instrument(skip_all, fields(traces = traces.len(), threshold = threshold))]
pub async fn analyze_common_asns<L: AsnLookup>(
    traces: &[PathTrace],
    threshold: f64,
    resolver: &AsnResolver<L>,
) -> Result<Vec<AsnSummary>> {
    common::validate(traces, threshold)?;

    let resolved = resolver
        .resolve_all(traces.iter().flat_map(PathTrace::addresses))
        .await;
    debug!("Resolved {} addresses", resolved.len());

    let mut summaries = common_asns(traces, threshold, |address| resolved.get(address).copied())?;
    let names = resolver
        .resolve_names(summaries.iter().map(|summary| summary.asn))
        .await;
    for summary in &mut summaries {
        if let Some(name) = names.get(&summary.asn) {
            summary.name.clone_from(name);
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        asn::AsnRecord,
        error::Error,
        types::{
            trace::{Hop, Reply},
            Asn,
        },
    };

    struct StaticLookup(HashMap<&'static str, Asn>);

    #[async_trait]
    impl AsnLookup for StaticLookup {
        async fn lookup_asn(&self, address: &str) -> Result<AsnRecord> {
            self.0
                .get(address)
                .map(|asn| AsnRecord {
                    asn: *asn,
                    holder: None,
                })
                .ok_or_else(|| Error::Lookup(address.to_owned()))
        }

        async fn lookup_name(&self, asn: Asn) -> Result<String> {
            match asn {
                64500 => Ok("TRANSIT-A".to_owned()),
                _ => Err(Error::Lookup(asn.to_string())),
            }
        }
    }

    fn trace(addresses: &[&str]) -> PathTrace {
        let hops = addresses
            .iter()
            .enumerate()
            .map(|(i, address)| Hop::new(i as u32 + 1, vec![Reply::from_address(address)]))
            .collect();
        PathTrace::new(1, hops)
    }

    #[tokio::test]
    async fn test_analyze_with_partial_resolution() {
        let resolver = AsnResolver::new(
            StaticLookup(HashMap::from([("192.0.2.1", 64500), ("198.51.100.1", 64501)])),
            4,
        );
        let traces = vec![
            trace(&["10.0.0.1", "192.0.2.1", "198.51.100.1"]),
            trace(&["10.0.0.2", "192.0.2.1", "203.0.113.1"]),
        ];
        let summaries = analyze_common_asns(&traces, 0.5, &resolver).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].asn, 64500);
        assert_eq!(summaries[0].name, "TRANSIT-A");
        assert_eq!(summaries[0].percentage, 100.0);
        assert_eq!(summaries[1].asn, 64501);
        assert_eq!(summaries[1].name, "AS64501");
        assert_eq!(summaries[1].percentage, 50.0);
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_input() {
        let resolver = AsnResolver::new(StaticLookup(HashMap::new()), 4);
        let result = analyze_common_asns(&[], 0.8, &resolver).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
