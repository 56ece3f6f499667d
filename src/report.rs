use std::{fmt, time::Duration};

use chrono::{DateTime, Local};
use itertools::Itertools;

use crate::{
    allocation::AllocationPlan,
    analyzer::{AsnSummary, PathStats},
    atlas::measurement_url,
    types::{Asn, MeasurementId},
};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";
const BAR_WIDTH: usize = 20;

pub struct Report {
    pub measurement_id: MeasurementId,
    pub target: String,
    pub created_at: DateTime<Local>,
    pub duration: Duration,
    pub requested: Vec<Asn>,
    pub plan: AllocationPlan,
    pub common_asns: Vec<AsnSummary>,
    pub threshold: f64,
    pub traces: usize,
    pub stats: PathStats,
}

fn asn_list(asns: &[Asn]) -> String {
    asns.iter().map(|asn| format!("AS{asn}")).join(", ")
}

fn bar(percentage: f64) -> String {
    let filled = ((percentage / 100.0 * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.0} seconds")
    } else if secs < 3600.0 {
        format!("{:.1} minutes", secs / 60.0)
    } else {
        format!("{:.1} hours", secs / 3600.0)
    }
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_probes = self.plan.total();

        writeln!(f, "RIPE Atlas Traceroute Analysis Report")?;
        writeln!(f, "{SEPARATOR}")?;
        writeln!(f, "Measurement {}", self.measurement_id)?;
        writeln!(f, "  Target:   {}", self.target)?;
        writeln!(f, "  Created:  {}", self.created_at.format("%Y-%m-%d %H:%M:%S %Z"))?;
        writeln!(f, "  Duration: {}", human_duration(self.duration))?;
        writeln!(f, "  Online:   {}", measurement_url(self.measurement_id))?;
        writeln!(f, "{SEPARATOR}")?;

        writeln!(f, "Probe distribution ({} ASNs requested)", self.requested.len())?;
        writeln!(f, "  with probes:    {}", asn_list(&self.plan.with_probes()))?;
        if !self.plan.without_probes.is_empty() {
            writeln!(f, "  without probes: {}", asn_list(&self.plan.without_probes))?;
        }
        for allocation in &self.plan.allocations {
            let percentage = share(allocation.allocated, total_probes);
            writeln!(
                f,
                "  AS{:<8} {} {:>4} of {:>4} probes ({percentage:5.1}%)",
                allocation.asn,
                bar(percentage),
                allocation.allocated,
                allocation.available,
            )?;
        }
        writeln!(f, "  Total: {total_probes} probes, {} results", self.traces)?;
        writeln!(f, "{SEPARATOR}")?;

        writeln!(
            f,
            "Common ASNs (threshold {:.1}% = {}/{} traces)",
            self.threshold * 100.0,
            (self.threshold * self.traces as f64).floor() as usize,
            self.traces,
        )?;
        if self.common_asns.is_empty() {
            writeln!(f, "  No common ASNs found meeting the threshold.")?;
        }
        for (i, asn) in self.common_asns.iter().enumerate() {
            writeln!(f, "  {}. AS{} - {}", i + 1, asn.asn, asn.name)?;
            writeln!(
                f,
                "     seen in {:.1}% ({}/{}), around hop {}-{}",
                asn.percentage, asn.occurrences, self.traces, asn.avg_hop_start, asn.avg_hop_end
            )?;
        }
        writeln!(f, "{SEPARATOR}")?;

        writeln!(f, "Path diversity")?;
        writeln!(f, "  Unique paths:     {}", self.stats.unique_paths)?;
        writeln!(f, "  Average hops:     {:.1}", self.stats.avg_hops)?;
        writeln!(f, "  Max hops reached: {}", self.stats.max_hops)?;
        writeln!(
            f,
            "  Incomplete paths: {} ({:.1}%)",
            self.stats.incomplete_paths,
            share(self.stats.incomplete_paths, self.traces)
        )
    }
}
