//! Kiln CLI - run compiled pipeline IR locally

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;

use kiln::binding::parse_cli_argument;
use kiln::error::{FixSuggestion, KilnError};
use kiln::event::{read_trace, TraceWriter, TRACE_DIR};
use kiln::{runner, ExecutionConfig, FlowGraph, Orchestrator, PipelineSpec, RunnerConfig};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Kiln - local execution engine for compiled pipeline IR")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a compiled pipeline
    Run {
        /// Path to the IR document (YAML or JSON)
        file: PathBuf,

        /// Pipeline argument as key=value (value parsed as JSON when possible)
        #[arg(short = 'a', long = "arg")]
        args: Vec<String>,

        /// JSON or YAML file with a mapping of pipeline arguments
        #[arg(long)]
        args_file: Option<PathBuf>,

        /// Config file (default: ~/.config/kiln/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured runner
        #[arg(short, long, value_enum)]
        runner: Option<RunnerKind>,

        /// Override the pipeline root directory
        #[arg(long)]
        pipeline_root: Option<Utf8PathBuf>,

        /// Max concurrently running leaf tasks
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,

        /// Keep running independent tasks after a failure
        #[arg(long)]
        continue_on_failure: bool,

        /// Write an NDJSON trace to .kiln/traces/
        #[arg(long)]
        trace: bool,
    },

    /// Validate a compiled pipeline (parse + static checks)
    Validate {
        /// Path to the IR document
        file: PathBuf,
    },

    /// Manage execution traces
    Trace {
        #[command(subcommand)]
        action: TraceAction,
    },
}

#[derive(Subcommand)]
enum TraceAction {
    /// List all traces
    List {
        /// Show only last N traces
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the events of a trace
    Show {
        /// Run ID or partial match
        id: String,
    },

    /// Delete old traces
    Clean {
        /// Keep only last N traces
        #[arg(short, long, default_value = "10")]
        keep: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RunnerKind {
    Subprocess,
    Container,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            args,
            args_file,
            config,
            runner,
            pipeline_root,
            parallelism,
            continue_on_failure,
            trace,
        } => {
            let overrides = Overrides {
                runner,
                pipeline_root,
                parallelism,
                continue_on_failure,
            };
            run_pipeline(&file, &args, args_file.as_deref(), config.as_deref(), overrides, trace).await
        }
        Commands::Validate { file } => validate_pipeline(&file),
        Commands::Trace { action } => handle_trace_command(action),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

struct Overrides {
    runner: Option<RunnerKind>,
    pipeline_root: Option<Utf8PathBuf>,
    parallelism: Option<usize>,
    continue_on_failure: bool,
}

fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<ExecutionConfig, KilnError> {
    let mut config = match path {
        Some(path) => ExecutionConfig::load_from(path)?,
        None => ExecutionConfig::load()?,
    }
    .with_env();

    match overrides.runner {
        Some(RunnerKind::Subprocess) => config.runner = RunnerConfig::default(),
        Some(RunnerKind::Container) => config.runner = RunnerConfig::container(),
        None => {}
    }
    if let Some(root) = overrides.pipeline_root {
        config.pipeline_root = root;
    }
    if let Some(n) = overrides.parallelism {
        config.parallelism = n;
    }
    if overrides.continue_on_failure {
        config.fail_fast = false;
    }

    config.validate()?;
    Ok(config)
}

fn load_arguments(
    raw: &[String],
    args_file: Option<&Path>,
) -> Result<BTreeMap<String, Value>, KilnError> {
    let mut args = match args_file {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str::<BTreeMap<String, Value>>(&content)?
        }
        None => BTreeMap::new(),
    };
    // Command-line arguments win over the file
    for item in raw {
        let (key, value) = parse_cli_argument(item)?;
        args.insert(key, value);
    }
    Ok(args)
}

async fn run_pipeline(
    file: &Path,
    raw_args: &[String],
    args_file: Option<&Path>,
    config_path: Option<&Path>,
    overrides: Overrides,
    trace: bool,
) -> Result<(), KilnError> {
    let spec = PipelineSpec::from_path(file)?;
    let args = load_arguments(raw_args, args_file)?;
    let config = load_config(config_path, overrides)?;
    let runner = runner::from_config(&config.runner)?;

    println!(
        "{} Using runner: {} | root: {}",
        "→".cyan(),
        runner.name().cyan().bold(),
        config.pipeline_root.as_str().cyan()
    );

    let orchestrator = Orchestrator::new(spec, config, runner).with_progress(true);
    let result = orchestrator.run(&args).await;

    if trace {
        let writer = TraceWriter::new(orchestrator.run_id())?;
        writer.write_all(orchestrator.event_log())?;
        writer.close()?;
        println!("{} Trace written to {}", "→".cyan(), writer.path().display());
    }

    let outputs = result?;
    if !outputs.is_empty() {
        println!("{}", "Outputs:".cyan().bold());
        for (name, value) in outputs {
            println!("  {} = {}", name.bold(), value.to_json());
        }
    }
    Ok(())
}

fn validate_pipeline(file: &Path) -> Result<(), KilnError> {
    let spec = PipelineSpec::from_path(file)?;
    spec.validate_schema()?;
    kiln::validate_pipeline(&spec)?;

    let root_tasks = spec.root.dag.as_ref().map(FlowGraph::from_dag).transpose()?;

    println!("{} Pipeline '{}' is valid", "✓".green(), spec.name());
    println!("  Schema: {}", spec.schema_version);
    println!("  Components: {}", spec.components.len());
    println!("  Executors: {}", spec.deployment_spec.executors.len());
    if let Some(graph) = root_tasks {
        let order = graph.topological_order()?;
        let names: Vec<&str> = order.iter().map(|t| &**t).collect();
        println!("  Root tasks: {}", names.join(" → "));
    }

    Ok(())
}

fn handle_trace_command(action: TraceAction) -> Result<(), KilnError> {
    match action {
        TraceAction::List { limit } => {
            let traces = kiln::list_traces()?;
            let traces = match limit {
                Some(n) => traces.into_iter().take(n).collect::<Vec<_>>(),
                None => traces,
            };

            println!("Found {} traces:\n", traces.len());
            println!("{:<30} {:>10} {:>20}", "RUN ID", "SIZE", "MODIFIED");
            println!("{}", "-".repeat(62));

            for trace in traces {
                let size = if trace.size_bytes > 1024 * 1024 {
                    format!("{:.1}MB", trace.size_bytes as f64 / 1024.0 / 1024.0)
                } else if trace.size_bytes > 1024 {
                    format!("{:.1}KB", trace.size_bytes as f64 / 1024.0)
                } else {
                    format!("{}B", trace.size_bytes)
                };

                let modified = trace
                    .modified
                    .map(|t| {
                        chrono::DateTime::<chrono::Local>::from(t)
                            .format("%Y-%m-%d %H:%M")
                            .to_string()
                    })
                    .unwrap_or_else(|| "unknown".to_string());

                println!("{:<30} {:>10} {:>20}", trace.run_id, size, modified);
            }
            Ok(())
        }

        TraceAction::Show { id } => {
            let traces = kiln::list_traces()?;
            let trace = traces
                .iter()
                .find(|t| t.run_id.contains(&id))
                .ok_or_else(|| KilnError::ValidationError {
                    reason: format!("No trace matching '{}'", id),
                })?;

            let events = read_trace(Path::new(TRACE_DIR), &trace.run_id)?;

            println!("Trace: {}", trace.run_id);
            println!("Events: {}", events.len());
            println!("Size: {} bytes\n", trace.size_bytes);

            for event in events {
                println!(
                    "[{:>6}ms] {}",
                    event.timestamp_ms,
                    serde_json::to_string(&event.kind)?
                );
            }
            Ok(())
        }

        TraceAction::Clean { keep } => {
            let traces = kiln::list_traces()?;
            let to_delete: Vec<_> = traces.into_iter().skip(keep).collect();
            let count = to_delete.len();

            for trace in to_delete {
                fs::remove_file(&trace.path)?;
            }

            println!("Deleted {} old traces, kept {}", count, keep);
            Ok(())
        }
    }
}
