use std::collections::HashSet;

use crate::types::trace::PathTrace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathStats {
    pub unique_paths: usize,
    pub avg_hops: f64,
    pub max_hops: usize,
    pub incomplete_paths: usize,
}

/// Path diversity summary.
///
/// Paths are compared by the first responding address at each hop; hops where nothing
/// answered don't contribute to the signature or to the hop counts.
pub fn path_stats(traces: &[PathTrace]) -> PathStats {
    if traces.is_empty() {
        return PathStats::default();
    }

    let mut signatures: HashSet<Vec<&str>> = HashSet::new();
    let mut total_hops = 0;
    let mut max_hops = 0;
    let mut incomplete_paths = 0;

    for trace in traces {
        let signature: Vec<&str> = trace.hops.iter().filter_map(|hop| hop.first_address()).collect();
        total_hops += signature.len();
        max_hops = max_hops.max(signature.len());
        signatures.insert(signature);
        if trace.is_incomplete() {
            incomplete_paths += 1;
        }
    }

    PathStats {
        unique_paths: signatures.len(),
        avg_hops: total_hops as f64 / traces.len() as f64,
        max_hops,
        incomplete_paths,
    }
}
