use std::collections::HashMap;

use itertools::Itertools;
use rand::{seq::index, Rng};
use tracing::debug;

use crate::{
    error::{Error, Result},
    types::{probe::Probe, Asn, ProbeId},
};

/// The platform refuses measurements with more probes than this.
pub const MAX_PROBES_PER_MEASUREMENT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub asn: Asn,
    pub available: usize,
    pub allocated: usize,
    pub probe_ids: Vec<ProbeId>,
}

#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
    pub without_probes: Vec<Asn>,
}

impl AllocationPlan {
    pub fn total(&self) -> usize {
        self.allocations.iter().map(|a| a.allocated).sum()
    }

    pub fn with_probes(&self) -> Vec<Asn> {
        self.allocations.iter().map(|a| a.asn).collect()
    }

    /// All selected probes, in allocation order.
    pub fn probe_ids(&self) -> Vec<ProbeId> {
        self.allocations
            .iter()
            .flat_map(|a| a.probe_ids.iter().copied())
            .collect()
    }
}

/// Splits at most `ceiling` probes across the requested ASNs.
///
/// Every ASN with probes first gets an equal share (capped by what it has), then whatever
/// is left of the ceiling goes to ASNs with spare probes, in request order. Probes are
/// sampled uniformly without replacement, so the result only depends on `rng`.
pub fn allocate<R: Rng + ?Sized>(
    available: &HashMap<Asn, Vec<Probe>>,
    requested: &[Asn],
    ceiling: usize,
    rng: &mut R,
) -> Result<AllocationPlan> {
    if requested.is_empty() {
        return Err(Error::validation("no ASNs provided"));
    }
    if ceiling == 0 {
        return Err(Error::validation("probe limit must be positive"));
    }

    let (with_probes, without_probes): (Vec<_>, Vec<_>) = requested
        .iter()
        .copied()
        .unique()
        .map(|asn| (asn, available.get(&asn).map(Vec::as_slice).unwrap_or_default()))
        .partition(|(_, probes)| !probes.is_empty());
    let without_probes: Vec<Asn> = without_probes.into_iter().map(|(asn, _)| asn).collect();

    if with_probes.is_empty() {
        return Err(Error::NoProbes { without_probes });
    }

    let quota = ceiling / with_probes.len();
    let mut allocations: Vec<Allocation> = with_probes
        .iter()
        .map(|(asn, probes)| {
            let allocated = probes.len().min(quota);
            Allocation {
                asn: *asn,
                available: probes.len(),
                allocated,
                probe_ids: sample(probes, allocated, rng),
            }
        })
        .collect();

    let mut leftover = ceiling - allocations.iter().map(|a| a.allocated).sum::<usize>();
    while leftover > 0 {
        let mut distributed = false;
        for (allocation, (_, probes)) in allocations.iter_mut().zip(&with_probes) {
            if leftover == 0 {
                break;
            }
            let spare = allocation.available - allocation.allocated;
            if spare == 0 {
                continue;
            }
            let extra = spare.min(leftover);
            allocation.allocated += extra;
            allocation.probe_ids = sample(probes, allocation.allocated, rng);
            leftover -= extra;
            distributed = true;
        }
        if !distributed {
            break;
        }
    }

    debug!(
        "Allocated {} probes across {} ASNs (quota {quota}, {} ASNs without probes)",
        allocations.iter().map(|a| a.allocated).sum::<usize>(),
        allocations.len(),
        without_probes.len(),
    );

    Ok(AllocationPlan {
        allocations,
        without_probes,
    })
}

fn sample<R: Rng + ?Sized>(probes: &[Probe], amount: usize, rng: &mut R) -> Vec<ProbeId> {
    if amount >= probes.len() {
        return probes.iter().map(|p| p.id).collect();
    }
    index::sample(rng, probes.len(), amount)
        .into_iter()
        .map(|i| probes[i].id)
        .collect()
}
