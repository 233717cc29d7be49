//! Group Recourse Core - Group Counterfactual Action Engine CLI
//!
//! Runs the full pipeline over a JSON job file:
//! - Cluster the affected population
//! - Propose and score candidate actions per cluster
//! - Reduce to the requested action count
//! - Cumulatively assign each individual its minimum-cost flipping action

use clap::{Args, Parser, Subcommand};
use gr_common::{apply_action, OutputFormat, Result, StructuredError};
use gr_config::SelectionPolicy;
use gr_core::distance::DistanceFn;
use gr_core::engine::{run, RunContext};
use gr_core::exit_codes::ExitCode;
use gr_core::job::{load_job, parse_action, render_rows};
use gr_core::logging::{init_logging, LogConfig};
use std::path::PathBuf;

/// Group recourse engine - global counterfactual actions for affected populations
#[derive(Parser)]
#[command(name = "gr-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine over a job file and print the report
    Run(RunArgs),

    /// Apply a sparse action file to a job's affected rows
    Apply(ApplyArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the JSON job file
    #[arg(long, env = "GR_JOB")]
    job: PathBuf,

    /// Override the job's final action count
    #[arg(long)]
    final_clusters: Option<usize>,

    /// Override the job's initial cluster count
    #[arg(long)]
    initial_clusters: Option<usize>,

    /// Override the job's selection policy
    #[arg(long)]
    policy: Option<SelectionPolicy>,

    /// Override the job's clustering seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct ApplyArgs {
    /// Path to the JSON job file
    #[arg(long, env = "GR_JOB")]
    job: PathBuf,

    /// Path to the sparse action JSON file
    #[arg(long)]
    action: PathBuf,
}

fn cmd_run(args: &RunArgs, format: OutputFormat) -> Result<()> {
    let mut job = load_job(&args.job)?;
    if let Some(final_clusters) = args.final_clusters {
        job.params.final_clusters = final_clusters;
    }
    if let Some(initial_clusters) = args.initial_clusters {
        job.params.initial_clusters = initial_clusters;
    }
    if let Some(policy) = args.policy {
        job.params.policy = policy;
    }
    if let Some(seed) = args.seed {
        job.params.seed = seed;
    }

    let distance = DistanceFn::fit(&job.schema, &job.reference)?;
    let ctx = RunContext {
        schema: &job.schema,
        affected: &job.affected,
        feat_to_vary: &job.feat_to_vary,
        predictor: &job.predictor,
        source: job.source.as_ref(),
        distance: &distance,
        params: &job.params,
    };
    let report = run(&ctx)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => print!("{}", report.render_human()),
    }
    Ok(())
}

fn cmd_apply(args: &ApplyArgs, format: OutputFormat) -> Result<()> {
    let job = load_job(&args.job)?;
    let action_text = std::fs::read_to_string(&args.action)?;
    let action = parse_action(&job.schema, &action_text)?;
    action.validate(&job.schema)?;

    let modified = apply_action(&action, &job.affected)?;
    match format {
        OutputFormat::Json => {
            let rows = render_rows(&job.schema, &modified)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Human => {
            println!("Applied: {}", action.describe(&job.schema)?);
            for row in render_rows(&job.schema, &modified)? {
                let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
                println!("  {}", cells.join(", "));
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.global.quiet {
        Some("error")
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    };
    init_logging(&LogConfig::from_env(level));

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(args, cli.global.format),
        Commands::Apply(args) => cmd_apply(args, cli.global.format),
    };

    let code = match result {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            eprintln!("{}", StructuredError::from(&err).to_json());
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code as i32);
}
