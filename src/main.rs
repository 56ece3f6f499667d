// ripeatlas, a RIPE Atlas traceroute analysis tool.
// Copyright (C) 2024 ripeatlas contributors

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ripeatlas::{
    allocation::allocate,
    analyzer::{analyze_common_asns, path_stats},
    asn::{AsnResolver, HttpAsnLookup},
    atlas::{measurement_url, AtlasClient, ProbeInventory},
    orchestrator::{Orchestrator, Outcome, PollConfig},
    report::Report,
    target::{self, AwsIpRanges, Target},
    types::measurement::MeasurementRequest,
};

use crate::cli::{Args, Command, TracerouteArgs};

mod cli;
mod config;

fn setup_tracing(args: &Args) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::builder().parse_lossy(
        std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).unwrap_or("info".to_string()),
    );
    let fmt = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_span_events(if args.log_span_durations {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_filter(env_filter);
    tracing_subscriber::registry()
        .with(fmt)
        .with(sentry::integrations::tracing::layer())
        .try_init()?;
    Ok(())
}

fn setup_sentry(args: &Args) -> Option<sentry::ClientInitGuard> {
    args.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: args.sentry_traces_sample_rate,
                ..Default::default()
            },
        ))
    })
}

async fn confirm(question: &str) -> Result<bool> {
    print!("{question} (y/n): ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn list_regions() -> Result<()> {
    let ranges = AwsIpRanges::new()?
        .fetch()
        .await
        .context("Couldn't fetch AWS IP ranges")?;
    for region in ranges.regions() {
        println!("aws_{region}");
    }
    Ok(())
}

async fn traceroute(api_key: String, args: TracerouteArgs) -> Result<()> {
    let started = Instant::now();
    let created_at = Local::now();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    println!("Initializing RIPE Atlas traceroute measurement...\n");

    if let Target::AwsRegion(region) = &args.target {
        println!("Resolving AWS region: {region}");
    }
    let destination = target::resolve(&args.target, &AwsIpRanges::new()?, &mut rng)
        .await
        .with_context(|| format!("Couldn't resolve target {}", args.target))?;
    if matches!(args.target, Target::AwsRegion(_)) {
        println!("  selected IP: {destination}\n");
    }

    let client = Arc::new(AtlasClient::new(api_key)?);

    let asn_list = args.asns.iter().join(",");
    println!("Fetching probes for ASNs: {asn_list}");
    let inventory = client
        .list_probes(&args.asns)
        .await
        .context("Couldn't fetch probes")?;
    let plan = allocate(&inventory, &args.asns, args.max_probes, &mut rng)
        .context("Probe allocation failed")?;

    println!("  ASNs with probes: {:?}", plan.with_probes());
    if !plan.without_probes.is_empty() {
        println!("  ASNs without probes: {:?}", plan.without_probes);
        if !args.yes && !confirm("Some ASNs have no available probes. Continue?").await? {
            bail!("Operation cancelled by user");
        }
    }
    println!();

    let probe_ids = plan.probe_ids();
    let request = MeasurementRequest::traceroute(
        destination.as_str(),
        format!("Traceroute to {} from ASNs {asn_list}", args.target),
        &probe_ids,
    );

    println!("Creating traceroute measurement...");
    println!("  target: {destination}");
    println!("  probes: {}", probe_ids.len());
    let orchestrator = Orchestrator::new(
        client.clone(),
        PollConfig {
            interval: args.poll_interval_sec,
            timeout: args.timeout_sec,
        },
    )?;
    let id = orchestrator
        .submit(&request)
        .await
        .context("Couldn't create measurement")?;
    let url = measurement_url(id);
    println!("  measurement created: ID {id}");
    println!("  {url}\n");

    println!("Waiting for measurement to complete...");
    let mut extensions = 0;
    loop {
        match orchestrator.await_completion(id, probe_ids.len()).await {
            Outcome::Completed => break,
            Outcome::Failed(reason) => bail!("Measurement {id} failed: {reason}"),
            Outcome::TimedOut => {
                let waited = args.timeout_sec.as_secs();
                println!("\nMeasurement has been running for another {waited} seconds.");
                println!("  {url}");
                let extend = match args.extend {
                    Some(limit) => extensions < limit,
                    None => confirm(&format!("Wait for another {waited} seconds?")).await?,
                };
                if !extend {
                    bail!("Measurement still running, check {url} manually");
                }
                extensions += 1;
            }
        }
    }
    println!("  measurement completed\n");

    println!("Fetching measurement results...");
    let traces = orchestrator
        .fetch_results(id)
        .await
        .context("Couldn't fetch results")?;
    println!("  retrieved {} traceroute results\n", traces.len());

    println!("Analyzing common ASN paths...\n");
    let resolver = AsnResolver::new(HttpAsnLookup::new()?, args.concurrent_lookups);
    let common_asns = analyze_common_asns(&traces, args.threshold, &resolver)
        .await
        .context("Couldn't analyze results")?;
    let stats = path_stats(&traces);

    let report = Report {
        measurement_id: id,
        target: args.target.to_string(),
        created_at,
        duration: started.elapsed(),
        requested: args.asns,
        plan,
        common_asns,
        threshold: args.threshold,
        traces: traces.len(),
        stats,
    };
    println!("{report}");
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    setup_tracing(&args)?;
    let _sentry_guard = setup_sentry(&args);

    match args.command {
        Command::Regions => list_regions().await,
        Command::Traceroute(traceroute_args) => {
            let api_key = config::api_key(args.api_key, &args.config)?;
            traceroute(api_key, traceroute_args).await
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))
}
