use std::time::Duration;

use anyhow::{ensure, Result};
use camino::Utf8PathBuf as PathBuf;
use clap::Parser;

use ripeatlas::{
    allocation::MAX_PROBES_PER_MEASUREMENT, asn::DEFAULT_CONCURRENT_LOOKUPS, target::Target,
    types::Asn,
};

#[derive(Parser)]
#[command(version, about = "Analyze network paths using RIPE Atlas probes")]
pub struct Args {
    /// File with the API key as RIPE_ATLAS_API=<key>
    #[clap(long, env = "RIPE_ATLAS_CONFIG", value_name = "FILE", default_value = "env.key")]
    pub config: PathBuf,

    /// RIPE Atlas API key (takes priority over key files)
    #[clap(long, env = "RIPE_ATLAS_API", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,

    #[clap(long, env, hide(true))]
    pub log_span_durations: bool,

    #[clap(long, env, hide(true))]
    pub sentry_dsn: Option<String>,

    #[clap(long, env, hide(true), default_value_t = 0.001)]
    pub sentry_traces_sample_rate: f32,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Run a traceroute measurement and analyze common paths
    Traceroute(TracerouteArgs),
    /// List AWS regions usable as aws_<region> targets
    Regions,
}

#[derive(clap::Args)]
pub struct TracerouteArgs {
    /// Comma-separated list of origin ASNs
    #[clap(long, value_parser = parse_asns)]
    pub asns: ::std::vec::Vec<Asn>,

    /// Target IP, host name or AWS region (e.g. aws_us-west-2)
    #[clap(long)]
    pub target: Target,

    /// Fraction of paths an ASN must appear in to be reported as common
    #[clap(long, default_value_t = 0.8, value_parser = parse_threshold)]
    pub threshold: f64,

    /// Continue without asking when some ASNs have no probes
    #[clap(short, long)]
    pub yes: bool,

    /// Extend the deadline this many times without asking
    #[clap(long, value_name = "N")]
    pub extend: Option<u32>,

    #[clap(long, env, hide(true), value_parser = parse_seconds, default_value = "3")]
    pub poll_interval_sec: Duration,

    #[clap(long, env, hide(true), value_parser = parse_seconds, default_value = "300")]
    pub timeout_sec: Duration,

    #[clap(long, env, hide(true), default_value_t = DEFAULT_CONCURRENT_LOOKUPS)]
    pub concurrent_lookups: usize,

    #[clap(long, env, hide(true), default_value_t = MAX_PROBES_PER_MEASUREMENT)]
    pub max_probes: usize,

    /// Seed for probe selection, for reproducible runs
    #[clap(long, hide(true))]
    pub seed: Option<u64>,
}

fn parse_seconds(s: &str) -> Result<Duration> {
    let secs: u64 = s.parse()?;
    ensure!(secs > 0, "duration must be positive");
    Ok(Duration::from_secs(secs))
}

fn parse_asn(s: &str) -> Result<Asn> {
    let asn: Asn = s.strip_prefix("AS").unwrap_or(s).parse()?;
    ensure!(asn > 0, "ASN must be positive: {asn}");
    Ok(asn)
}

/// Empty items are skipped, so "5384,,7713," is two ASNs.
fn parse_asns(s: &str) -> Result<Vec<Asn>> {
    let asns = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_asn)
        .collect::<Result<Vec<_>>>()?;
    ensure!(!asns.is_empty(), "no ASNs given");
    Ok(asns)
}

fn parse_threshold(s: &str) -> Result<f64> {
    let threshold: f64 = s.parse()?;
    ensure!(
        (0.0..=1.0).contains(&threshold),
        "threshold must be between 0 and 1"
    );
    Ok(threshold)
}
