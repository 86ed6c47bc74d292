//! Aforo replay CLI
//!
//! Counts a recording bundle, optionally exports the results, and runs the
//! deterministic replay scenarios against it.

use aforo_core::{EngineConfig, ExportOptions, PlaybackFilter};
use aforo_replay::{RecordingBundle, ReplayError, ReplayExport, ReplayResult, ReplayRunner, ReplayScenario};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Aforo deterministic replay CLI
#[derive(Parser, Debug)]
#[command(name = "aforo-replay")]
#[command(about = "Count a recording and verify the counts under replay", long_about = None)]
struct Args {
    /// Recording bundle (zones, trajectories, corrections) as JSON
    #[arg(short, long)]
    input: PathBuf,

    /// Engine configuration JSON (defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to run (in_order, reversed, shuffled, duplicated, reset_replay, scrub, all, none)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Write the 15-minute count table as CSV
    #[arg(long)]
    export_csv: Option<PathBuf>,

    /// Keep hidden tracks in the CSV and snapshot
    #[arg(long)]
    include_hidden: bool,

    /// Write a JSON snapshot of counts and results
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Include the active set at this frame in the output
    #[arg(long)]
    cursor: Option<u64>,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_scenarios(value: &str) -> Result<Vec<ReplayScenario>, ReplayError> {
    match value {
        "all" => Ok(ReplayScenario::all()),
        "none" => Ok(Vec::new()),
        other => other
            .parse()
            .map(|scenario| vec![scenario])
            .map_err(|_| ReplayError::unknown_scenario(other)),
    }
}

fn base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

/// Runs the CLI; returns whether every scenario passed.
fn run(args: &Args) -> Result<bool, ReplayError> {
    let scenarios = parse_scenarios(&args.scenario)?;
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    let bundle = RecordingBundle::from_json_file(&args.input)?;
    let mut session = bundle.to_session(config)?;
    let summary = session.process();

    if !args.json {
        info!("Aforo replay v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "Scope {}: {} valid, {} invalid, {} discarded, {} counted",
            session.scope(),
            summary.valid,
            summary.invalid,
            summary.discarded,
            summary.record.counted
        );
        for (class, total) in session.state().totals_by_class() {
            info!("  {:<12} {}", class.name(), total);
        }
    }

    if let Some(path) = &args.export_csv {
        let options = ExportOptions {
            include_hidden: args.include_hidden,
            ..Default::default()
        };
        session.export_table(&options).write_csv_file(path)?;
        info!("Wrote count table to {}", path.display());
    }

    let mut export = ReplayExport::new(&session, summary, args.include_hidden);
    if let Some(frame) = args.cursor {
        let active = session.active_at(frame, &PlaybackFilter::default());
        info!("Frame {}: {} active tracks", frame, active.len());
        export = export.with_active(active);
    }

    let base_seed = base_seed(args.seed);
    let mut all_results: Vec<ReplayResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ReplayRunner::new(seed);

        for scenario in &scenarios {
            let result = runner.run(&session, *scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    for result in &all_results {
        export.add_result(result.clone());
    }

    if let Some(path) = &args.snapshot {
        export.write_to_file(path)?;
        info!("Wrote snapshot to {}", path.display());
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "grand_total": session.state().grand_total(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "submissions": r.metrics.submissions,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if total > 0 {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} replay runs passed!", total);
        } else {
            error!("❌ {}/{} replay runs failed!", failed_count, total);
        }
    }

    Ok(failed_count == 0)
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
