use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use hazard_core::{
    inspect_catalog, job_from_pairs, load_job, load_manifest, validate_manifest, ContainerEngine,
    Diagnostic, DiagnosticLevel, DirectoryArtifact, ExecutionOutcome, ExecutionPlan, Executor,
    JobOrder, Manifest, ManifestSummary, RunnerConfig, StoredArtifact,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Runs the hazard options workflow")]
struct HazardCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the manifest, bind the job and print the command that would run
    Plan {
        #[command(flatten)]
        job: JobArgs,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Execute the workflow and collect its output directory
    Run {
        #[command(flatten)]
        job: JobArgs,
        /// Engine used to start the tool (overrides HAZARD_ENGINE)
        #[arg(long)]
        engine: Option<ContainerEngine>,
        /// Directory that receives one sub-directory per run (overrides HAZARD_RUNS_DIR)
        #[arg(long)]
        runs_dir: Option<PathBuf>,
        /// Refuse tools that require network access
        #[arg(long)]
        deny_network: bool,
        /// Extra argument for `docker run` / `podman run`. Repeat for multiple arguments.
        #[arg(
            long = "engine-arg",
            value_name = "ARG",
            allow_hyphen_values = true,
            action = ArgAction::Append
        )]
        engine_args: Vec<String>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Export the builtin manifest
    Manifest {
        /// Output format
        #[arg(long, default_value_t = ManifestFormat::Yaml)]
        format: ManifestFormat,
    },
    /// Summarize the catalog inside an output directory
    Inspect {
        /// Output directory, usually `<runs-dir>/<run-id>/work/asset_output`
        dir: PathBuf,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct JobArgs {
    /// Workflow manifest; defaults to the builtin hazard options manifest
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// YAML or JSON job order file
    #[arg(long)]
    job: Option<PathBuf>,
    /// Set a workflow input (format: key=value). Repeat for multiple inputs.
    #[arg(
        long = "input",
        value_parser = parse_key_val,
        value_name = "KEY=VALUE",
        action = ArgAction::Append
    )]
    inputs: Vec<(String, String)>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = HazardCli::parse();

    match cli.command {
        Command::Plan { job, json } => {
            let manifest = load(job.manifest.as_deref())?;
            let diagnostics = validate_manifest(&manifest);
            let has_errors = diagnostics.iter().any(Diagnostic::is_error);
            let plan = if has_errors {
                None
            } else {
                let order = build_job(&manifest, &job)?;
                let executor = Executor::new(RunnerConfig::from_env()?);
                Some((executor.plan(&manifest, &order)?, executor))
            };
            output_plan(manifest.summary(), &diagnostics, plan.as_ref(), json)?;
            if has_errors {
                anyhow::bail!("validation failed");
            }
        }
        Command::Run {
            job,
            engine,
            runs_dir,
            deny_network,
            engine_args,
            json,
        } => {
            let manifest = load(job.manifest.as_deref())?;
            let diagnostics = validate_manifest(&manifest);
            if diagnostics.iter().any(Diagnostic::is_error) {
                print_diagnostics(&diagnostics);
                anyhow::bail!("validation failed");
            }
            let order = build_job(&manifest, &job)?;

            let mut config = RunnerConfig::from_env()?;
            if let Some(engine) = engine {
                config.engine = engine;
            }
            if let Some(dir) = runs_dir {
                config.runs_dir = dir;
            }
            if deny_network {
                config.allow_network = false;
            }
            config.engine_args.extend(engine_args);
            debug!(?config, "runner configuration");

            let outcome = Executor::new(config).execute(&manifest, &order);
            let succeeded = outcome.succeeded();
            output_run(manifest.summary(), outcome, json)?;
            if !succeeded {
                anyhow::bail!("workflow run failed");
            }
        }
        Command::Manifest { format } => {
            output_manifest(format)?;
        }
        Command::Inspect { dir, json } => {
            output_inspect(&dir, json)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load(path: Option<&Path>) -> anyhow::Result<Manifest> {
    match path {
        Some(path) => Ok(load_manifest(path)?),
        None => Ok(Manifest::builtin().context("builtin manifest is invalid")?),
    }
}

/// Job file values first, then `--input` pairs on top.
fn build_job(manifest: &Manifest, args: &JobArgs) -> anyhow::Result<JobOrder> {
    let mut order = match &args.job {
        Some(path) => load_job(path)?,
        None => JobOrder::new(),
    };
    order.extend(job_from_pairs(manifest, args.inputs.clone())?);
    Ok(order)
}

#[derive(Debug, Serialize)]
struct PlanResponse<'a> {
    summary: ManifestSummary,
    diagnostics: &'a [Diagnostic],
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a ExecutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_argv: Option<Vec<String>>,
}

fn output_plan(
    summary: ManifestSummary,
    diagnostics: &[Diagnostic],
    plan: Option<&(ExecutionPlan, Executor)>,
    json: bool,
) -> anyhow::Result<()> {
    let placeholder = Path::new("<run-dir>/work");
    let engine_argv = plan.map(|(plan, executor)| executor.engine_argv(plan, placeholder));

    if json {
        let response = PlanResponse {
            summary,
            diagnostics,
            plan: plan.map(|(plan, _)| plan),
            engine_argv,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_diagnostics(diagnostics);
    println!("{summary}");
    if let Some((plan, _)) = plan {
        println!("\nBound inputs:");
        for (name, value) in &plan.job.tool_inputs {
            println!("  - {name} = {value}");
        }
        for warning in plan.job.warnings.iter().chain(&plan.warnings) {
            println!("  [warn] {warning}");
        }
        println!("\nCommand:\n  {}", plan.invocation.display());
    }
    if let Some(argv) = engine_argv {
        println!("\nEngine command:\n  {}", argv.join(" "));
    }
    Ok(())
}

fn output_run(
    summary: ManifestSummary,
    outcome: ExecutionOutcome,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let payload = json!({
            "summary": summary,
            "run_id": outcome.run_id,
            "state": outcome.state,
            "run_dir": outcome.run_dir,
            "execution": outcome.report,
            "artifacts": outcome.artifacts,
            "catalog": outcome.catalog,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{summary}\n");
    println!("Run {} ({:?})", outcome.run_id, outcome.state);
    if let Some(dir) = &outcome.run_dir {
        println!("  record: {dir}");
    }
    println!("\n{}", outcome.report);
    if outcome.report.has_failures() {
        println!("[warn] some steps failed");
    }
    if !outcome.artifacts.is_empty() {
        println!("\nArtifacts:");
        for StoredArtifact {
            name, kind, path, ..
        } in &outcome.artifacts
        {
            match path {
                Some(p) => println!("  - {} ({:?}) -> {}", name, kind, p),
                None => println!("  - {} ({:?})", name, kind),
            }
        }
    }
    if let Some(catalog) = &outcome.catalog {
        println!("\n{catalog}");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ManifestFormat {
    Json,
    Yaml,
}

impl std::fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            ManifestFormat::Json => "json",
            ManifestFormat::Yaml => "yaml",
        };
        write!(f, "{value}")
    }
}

fn output_manifest(format: ManifestFormat) -> anyhow::Result<()> {
    let source = Manifest::builtin_source();
    match format {
        ManifestFormat::Yaml => print!("{source}"),
        ManifestFormat::Json => {
            let document: serde_json::Value = serde_yaml::from_str(source)?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }
    Ok(())
}

fn output_inspect(dir: &Path, json: bool) -> anyhow::Result<()> {
    let listing = DirectoryArtifact::scan(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?;
    let catalog = inspect_catalog(dir)?;

    if json {
        let payload = json!({
            "directory": listing,
            "total_bytes": listing.total_size(),
            "catalog": catalog,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", listing.render_listing());
    println!("{} file(s), {} bytes", listing.listing.len(), listing.total_size());
    match catalog {
        Some(summary) => println!("\n{summary}"),
        None => println!("\nNo catalog.json in {}", dir.display()),
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }

    println!("Diagnostics:");
    for diagnostic in diagnostics {
        let level = match diagnostic.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warn",
        };
        match &diagnostic.location {
            Some(location) => println!("  - [{level}] {location}: {}", diagnostic.message),
            None => println!("  - [{level}] {}", diagnostic.message),
        }
    }
    println!();
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].trim().is_empty() {
        return Err(format!("expected KEY=VALUE, got '{s}'"));
    }
    Ok((parts[0].trim().to_string(), parts[1].to_string()))
}
