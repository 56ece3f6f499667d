use std::collections::{BTreeMap, HashSet};

use crate::{
    asn::placeholder_name,
    error::{Error, Result},
    types::{trace::PathTrace, Asn},
};

/// The reported hop range is `avg..avg + HOP_RANGE_SPAN`. It's an approximation of where
/// the ASN usually sits on the path, not the observed maximum.
pub const HOP_RANGE_SPAN: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsnObservation {
    /// Number of traces the ASN appeared in
    pub occurrences: usize,
    pub hop_positions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsnSummary {
    pub asn: Asn,
    pub name: String,
    pub occurrences: usize,
    pub percentage: f64,
    pub avg_hop_start: u32,
    pub avg_hop_end: u32,
}

pub(super) fn validate(traces: &[PathTrace], threshold: f64) -> Result<()> {
    if traces.is_empty() {
        return Err(Error::validation("no results to analyze"));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::validation(format!(
            "threshold must be between 0 and 1, got {threshold}"
        )));
    }
    Ok(())
}

/// Counts every ASN once per trace, remembering each hop it was seen at.
pub fn observe_asns(
    traces: &[PathTrace],
    asn_of: impl Fn(&str) -> Option<Asn>,
) -> BTreeMap<Asn, AsnObservation> {
    let mut observations: BTreeMap<Asn, AsnObservation> = BTreeMap::new();
    for trace in traces {
        let mut in_trace = HashSet::new();
        for hop in &trace.hops {
            let mut in_hop = HashSet::new();
            for asn in hop.addresses().filter_map(&asn_of) {
                if !in_hop.insert(asn) {
                    continue;
                }
                let observation = observations.entry(asn).or_default();
                observation.hop_positions.push(hop.hop);
                if in_trace.insert(asn) {
                    observation.occurrences += 1;
                }
            }
        }
    }
    observations
}

/// ASNs present in at least `floor(threshold * traces)` traces, most frequent first.
pub fn common_asns(
    traces: &[PathTrace],
    threshold: f64,
    asn_of: impl Fn(&str) -> Option<Asn>,
) -> Result<Vec<AsnSummary>> {
    validate(traces, threshold)?;
    let total = traces.len();
    let min_occurrences = (threshold * total as f64).floor() as usize;

    let mut summaries: Vec<AsnSummary> = observe_asns(traces, asn_of)
        .into_iter()
        .filter(|(_, observation)| observation.occurrences >= min_occurrences)
        .map(|(asn, observation)| {
            let positions = &observation.hop_positions;
            let avg_hop = positions.iter().sum::<u32>() / positions.len().max(1) as u32;
            AsnSummary {
                asn,
                name: placeholder_name(asn),
                occurrences: observation.occurrences,
                percentage: observation.occurrences as f64 / total as f64 * 100.0,
                avg_hop_start: avg_hop,
                avg_hop_end: avg_hop + HOP_RANGE_SPAN,
            }
        })
        .collect();
    // stable, so equal percentages stay in ASN order
    summaries.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::trace::{Hop, Reply};

    // Addresses are written as "<asn>.<anything>" so the lookup is just a parse.
    fn asn_of(address: &str) -> Option<Asn> {
        address.split('.').next()?.parse().ok()
    }

    fn trace(hops: &[&[&str]]) -> PathTrace {
        let hops = hops
            .iter()
            .enumerate()
            .map(|(i, replies)| {
                let replies = replies
                    .iter()
                    .map(|r| match *r {
                        "*" => Reply::timeout(),
                        address => Reply::from_address(address),
                    })
                    .collect();
                Hop::new(i as u32 + 1, replies)
            })
            .collect();
        PathTrace::new(1, hops)
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(common_asns(&[], 0.5, asn_of), Err(Error::Validation(_))));
        let traces = [trace(&[&["1.1"]])];
        assert!(common_asns(&traces, 1.5, asn_of).is_err());
        assert!(common_asns(&traces, -0.1, asn_of).is_err());
        assert!(common_asns(&traces, f64::NAN, asn_of).is_err());
    }

    #[test]
    fn test_threshold_boundary() {
        // AS100 in 8 of 10 traces, AS200 in 7
        let traces: Vec<PathTrace> = (0..10)
            .map(|i| {
                let first = if i < 8 { "100.1" } else { "300.1" };
                let second = if i < 7 { "200.1" } else { "300.2" };
                trace(&[&[first], &[second]])
            })
            .collect();
        let summaries = common_asns(&traces, 0.8, asn_of).unwrap();
        let asns: Vec<Asn> = summaries.iter().map(|s| s.asn).collect();
        assert_eq!(asns, vec![100]);
        assert_eq!(summaries[0].occurrences, 8);
        assert_eq!(summaries[0].percentage, 80.0);
    }

    #[test]
    fn test_dedup_within_trace() {
        let traces = [trace(&[&["1.1"], &["2.1"], &["7.1", "7.2"], &["2.2"], &["7.3"]])];
        let observations = observe_asns(&traces, asn_of);
        assert_eq!(
            observations[&7],
            AsnObservation {
                occurrences: 1,
                hop_positions: vec![3, 5],
            }
        );
        assert_eq!(observations[&2].hop_positions, vec![2, 4]);
    }

    #[test]
    fn test_average_position_and_range() {
        let traces = [
            trace(&[&["1.1"], &["5.1"]]),
            trace(&[&["1.1"], &["1.2"], &["5.1"]]),
            trace(&[&["*"], &["1.1"], &["*"], &["5.1"]]),
        ];
        let summaries = common_asns(&traces, 1.0, asn_of).unwrap();
        let as1 = summaries.iter().find(|s| s.asn == 1).unwrap();
        // positions 1, 1, 2, 2 -> 6 / 4
        assert_eq!(as1.avg_hop_start, 1);
        assert_eq!(as1.avg_hop_end, 3);
        let as5 = summaries.iter().find(|s| s.asn == 5).unwrap();
        // positions 2, 3, 4
        assert_eq!(as5.avg_hop_start, 3);
        assert_eq!(as5.avg_hop_end, 5);
        assert_eq!(as5.name, "AS5");
    }

    #[test]
    fn test_ordering() {
        let traces = [
            trace(&[&["3.1"], &["2.1"], &["1.1"]]),
            trace(&[&["3.1"], &["2.1"]]),
            trace(&[&["3.1"], &["4.1"]]),
        ];
        let summaries = common_asns(&traces, 0.0, asn_of).unwrap();
        let asns: Vec<Asn> = summaries.iter().map(|s| s.asn).collect();
        assert_eq!(asns, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_unresolved_addresses_are_skipped() {
        let traces = [trace(&[&["private"], &["*"], &["9.1"]])];
        let summaries = common_asns(&traces, 1.0, asn_of).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].asn, 9);
        assert_eq!(summaries[0].avg_hop_start, 3);
    }

    #[test]
    fn test_deterministic() {
        let traces = [
            trace(&[&["1.1"], &["2.1", "3.1"]]),
            trace(&[&["1.1"], &["3.1"]]),
        ];
        let first = common_asns(&traces, 0.5, asn_of).unwrap();
        for _ in 0..10 {
            assert_eq!(common_asns(&traces, 0.5, asn_of).unwrap(), first);
        }
    }
}
