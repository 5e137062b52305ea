use crate::artifact::{ArtifactKind, ProcessArtifact, StoredArtifact};
use crate::binding::{resolve_job, BindingError, JobOrder, ResolvedJob};
use crate::catalog::{inspect_catalog, CatalogSummary};
use crate::command::{build_invocation, CommandError, ToolInvocation};
use crate::config::{ContainerEngine, RunnerConfig};
use crate::manifest::Manifest;
use crate::output::collect_output;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Mount point of the run's working directory inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";
const RUN_RECORD: &str = "run.json";

#[derive(Debug, Default)]
pub struct Executor {
    config: RunnerConfig,
}

/// Everything needed to start the process, computed before anything runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub engine: ContainerEngine,
    pub job: ResolvedJob,
    pub invocation: ToolInvocation,
    /// Runner-level notes, separate from the job's binding warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("tool '{0}' is not defined in the manifest")]
    UnknownTool(String),
    #[error("tool '{0}' requires network access, which this runner configuration denies")]
    NetworkDenied(String),
    #[error("tool '{tool}' has no container image; use the local engine instead of {engine}")]
    MissingImage {
        tool: String,
        engine: ContainerEngine,
    },
    #[error("tool '{0}' has no base command to run on the host")]
    MissingCommand(String),
}

impl Executor {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Binds the job and builds the invocation without starting anything.
    pub fn plan(&self, manifest: &Manifest, job: &JobOrder) -> Result<ExecutionPlan, PlanError> {
        let resolved = resolve_job(manifest, job)?;
        let tool = manifest
            .tools
            .get(&resolved.tool_key)
            .ok_or_else(|| PlanError::UnknownTool(resolved.tool_key.clone()))?;
        let invocation = build_invocation(tool, &resolved.tool_inputs)?;

        if invocation.network_access && !self.config.allow_network {
            return Err(PlanError::NetworkDenied(invocation.tool.clone()));
        }
        if self.config.engine.is_container() && invocation.image.is_none() {
            return Err(PlanError::MissingImage {
                tool: invocation.tool.clone(),
                engine: self.config.engine,
            });
        }
        if !self.config.engine.is_container() && invocation.base_command.is_empty() {
            return Err(PlanError::MissingCommand(invocation.tool.clone()));
        }

        let mut warnings = Vec::new();
        if !self.config.engine.is_container() && !self.config.engine_args.is_empty() {
            warn!(
                args = %shell_words::join(&self.config.engine_args),
                "engine arguments are ignored by the local engine"
            );
            warnings.push(format!(
                "engine arguments are ignored by the local engine: {}",
                shell_words::join(&self.config.engine_args)
            ));
        }

        Ok(ExecutionPlan {
            engine: self.config.engine,
            job: resolved,
            invocation,
            warnings,
        })
    }

    /// The full argument vector the engine will be started with for `workdir`.
    pub fn engine_argv(&self, plan: &ExecutionPlan, workdir: &Path) -> Vec<String> {
        let invocation = &plan.invocation;
        let image = match (plan.engine, &invocation.image) {
            (ContainerEngine::Local, _) | (_, None) => return invocation.argv(),
            (_, Some(image)) => image.clone(),
        };

        let mut argv = vec![
            plan.engine.as_str().to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "--workdir".to_string(),
            CONTAINER_WORKDIR.to_string(),
            "--mount".to_string(),
            bind_mount(workdir),
        ];
        if !invocation.network_access {
            argv.push("--network".to_string());
            argv.push("none".to_string());
        }
        argv.extend(self.config.engine_args.iter().cloned());
        argv.push(image);
        argv.extend(invocation.argv());
        argv
    }

    pub fn execute(&self, manifest: &Manifest, job: &JobOrder) -> ExecutionOutcome {
        let run_id = new_run_id();
        let mut report = Vec::new();
        let mut artifacts = Vec::new();
        let mut history = Vec::new();
        debug!(workflow = %manifest.workflow.id, "starting run");
        record_transition(&run_id, &mut history, RunState::Pending);

        let plan = match self.plan(manifest, job) {
            Ok(plan) => {
                let mut message = format!(
                    "bound {} input(s) to step '{}'",
                    plan.job.tool_inputs.len(),
                    plan.job.step_id
                );
                for warning in plan.job.warnings.iter().chain(&plan.warnings) {
                    message.push_str(&format!("\n[warn] {warning}"));
                }
                report.push(StepExecution::completed(
                    "resolve".to_string(),
                    StepKind::Resolve,
                    Some(message),
                ));
                plan
            }
            Err(err) => {
                warn!(run = %run_id, error = %err, "run rejected before start");
                report.push(StepExecution::failed(
                    "resolve".to_string(),
                    StepKind::Resolve,
                    Some(err.to_string()),
                ));
                return ExecutionOutcome::finish(run_id, None, history, report, artifacts, None);
            }
        };

        let run_dir = self.config.runs_dir.join(&run_id);
        let workdir = match prepare_workdir(&run_dir) {
            Ok(path) => path,
            Err(err) => {
                report.push(StepExecution::failed(
                    plan.job.step_id.clone(),
                    StepKind::Invoke,
                    Some(format!("failed to prepare working directory: {err}")),
                ));
                return ExecutionOutcome::finish(run_id, None, history, report, artifacts, None);
            }
        };

        let argv = self.engine_argv(&plan, &workdir);
        debug!(engine = %plan.engine, command = %shell_words::join(&argv), "engine command");
        record_transition(&run_id, &mut history, RunState::Running);
        let (execution, process) = self.invoke(&plan, &argv, &workdir);
        let succeeded = execution.status == ExecutionStatus::Completed;
        report.push(execution);

        let mut catalog = None;
        if succeeded {
            for (workflow_output, tool_output) in &plan.job.outputs {
                let Some(target) = plan.invocation.outputs.get(tool_output) else {
                    report.push(StepExecution::failed(
                        workflow_output.clone(),
                        StepKind::CollectOutput,
                        Some(format!("tool does not declare output '{tool_output}'")),
                    ));
                    continue;
                };
                match collect_output(&workdir, workflow_output, target) {
                    Ok(artifact) => {
                        report.push(StepExecution::completed(
                            workflow_output.clone(),
                            StepKind::CollectOutput,
                            Some(format!(
                                "{} -> {}",
                                target.glob,
                                artifact.path.as_deref().unwrap_or("<memory>")
                            )),
                        ));
                        if artifact.kind == ArtifactKind::Directory {
                            if let Some(path) = artifact.path.as_deref() {
                                catalog = catalog.or(self.inspect(path, &mut report));
                            }
                        }
                        artifacts.push(artifact);
                    }
                    Err(err) => report.push(StepExecution::failed(
                        workflow_output.clone(),
                        StepKind::CollectOutput,
                        Some(err.to_string()),
                    )),
                }
            }
        } else {
            for workflow_output in plan.job.outputs.keys() {
                report.push(StepExecution::skipped(
                    workflow_output.clone(),
                    StepKind::CollectOutput,
                    Some("not collected because the step failed".to_string()),
                ));
            }
        }

        if let Some(process) = process {
            let data = json!(process);
            artifacts.push(StoredArtifact {
                name: format!("process:{}", plan.job.step_id),
                kind: ArtifactKind::Process,
                path: None,
                data,
            });
        }

        let mut outcome =
            ExecutionOutcome::finish(run_id, Some(&run_dir), history, report, artifacts, catalog);
        let record = json!({
            "run_id": outcome.run_id,
            "workflow": manifest.workflow.id,
            "state": outcome.state,
            "history": outcome.history,
            "plan": plan,
            "engine_argv": argv,
            "report": outcome.report,
            "artifacts": outcome.artifacts,
        });
        if let Some(path) = write_record(&run_dir, &record) {
            let location = path.to_string_lossy().to_string();
            for artifact in &mut outcome.artifacts {
                if artifact.kind == ArtifactKind::Process {
                    artifact.path = Some(location.clone());
                }
            }
        }
        outcome
    }

    fn invoke(
        &self,
        plan: &ExecutionPlan,
        argv: &[String],
        workdir: &Path,
    ) -> (StepExecution, Option<ProcessArtifact>) {
        let step = plan.job.step_id.clone();
        let Some((program, args)) = argv.split_first() else {
            return (
                StepExecution::failed(
                    step,
                    StepKind::Invoke,
                    Some("command line is empty".to_string()),
                ),
                None,
            );
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        if plan.engine == ContainerEngine::Local {
            cmd.current_dir(workdir);
        }

        let started_at = OffsetDateTime::now_utc();
        let timer = Instant::now();

        match cmd.output() {
            Ok(output) => {
                let duration_ms = timer.elapsed().as_millis();
                let exit_code = output.status.code();
                let process = ProcessArtifact {
                    engine: plan.engine.to_string(),
                    command: argv.to_vec(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code,
                    started_at: started_at
                        .format(&Rfc3339)
                        .unwrap_or_else(|_| "unknown".to_string()),
                    duration_ms,
                };
                debug!(step = %step, ?exit_code, duration_ms, "process exited");

                let execution = if output.status.success() {
                    StepExecution::completed(
                        step,
                        StepKind::Invoke,
                        Some(format!(
                            "{} exited with code 0 in {duration_ms} ms",
                            plan.invocation.tool
                        )),
                    )
                } else {
                    StepExecution::failed(
                        step,
                        StepKind::Invoke,
                        Some(format!(
                            "{} exited with code {:?}\nstderr:\n{}",
                            plan.invocation.tool,
                            exit_code,
                            truncate_output(&process.stderr)
                        )),
                    )
                };
                (execution, Some(process))
            }
            Err(err) => (
                StepExecution::failed(
                    step,
                    StepKind::Invoke,
                    Some(format!("failed to spawn '{program}': {err}")),
                ),
                None,
            ),
        }
    }

    fn inspect(&self, directory: &str, report: &mut Vec<StepExecution>) -> Option<CatalogSummary> {
        match inspect_catalog(Path::new(directory)) {
            Ok(Some(summary)) => {
                let counts: Vec<String> = summary
                    .option_counts
                    .iter()
                    .map(|(group, count)| format!("{group}={count}"))
                    .collect();
                report.push(StepExecution::completed(
                    format!("catalog:{}", summary.id),
                    StepKind::Inspect,
                    Some(counts.join(", ")),
                ));
                Some(summary)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "output catalog could not be inspected");
                report.push(StepExecution::skipped(
                    "catalog".to_string(),
                    StepKind::Inspect,
                    Some(err.to_string()),
                ));
                None
            }
        }
    }
}

/// `--mount` value binding `workdir` read-write at [`CONTAINER_WORKDIR`].
///
/// The value is comma separated, so a source containing `,` or `"` is CSV-quoted.
fn bind_mount(workdir: &Path) -> String {
    let mut source = format!("source={}", workdir.display());
    if source.contains([',', '"']) {
        source = format!("\"{}\"", source.replace('"', "\"\""));
    }
    format!("type=bind,{source},target={CONTAINER_WORKDIR}")
}

fn new_run_id() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z-{:09}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.nanosecond()
    )
}

/// Creates `<run_dir>/work` and returns its absolute path.
fn prepare_workdir(run_dir: &Path) -> std::io::Result<PathBuf> {
    let workdir = run_dir.join("work");
    fs::create_dir_all(&workdir)?;
    fs::canonicalize(&workdir)
}

fn write_record(run_dir: &Path, data: &Value) -> Option<PathBuf> {
    let path = run_dir.join(RUN_RECORD);
    match serde_json::to_vec_pretty(data) {
        Ok(bytes) => match fs::File::create(&path) {
            Ok(mut file) => {
                if let Err(err) = file.write_all(&bytes) {
                    warn!(path = %path.display(), error = %err, "failed to write run record");
                    None
                } else {
                    Some(path)
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to create run record");
                None
            }
        },
        Err(err) => {
            warn!(error = %err, "failed to serialize run record");
            None
        }
    }
}

fn truncate_output(text: &str) -> String {
    const MAX: usize = 512;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Lifecycle of a single run; the manifest adds no states of its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// A state the run entered and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChange {
    pub state: RunState,
    pub at: String,
}

fn record_transition(run_id: &str, history: &mut Vec<StateChange>, state: RunState) {
    info!(run = %run_id, ?state, "run state changed");
    let at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    history.push(StateChange { state, at });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub run_id: String,
    pub state: RunState,
    /// Every state entered, from `Pending` to the final one.
    pub history: Vec<StateChange>,
    pub run_dir: Option<String>,
    pub report: ExecutionReport,
    pub artifacts: Vec<StoredArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogSummary>,
}

impl ExecutionOutcome {
    fn finish(
        run_id: String,
        run_dir: Option<&Path>,
        mut history: Vec<StateChange>,
        steps: Vec<StepExecution>,
        artifacts: Vec<StoredArtifact>,
        catalog: Option<CatalogSummary>,
    ) -> Self {
        let report = ExecutionReport { steps };
        let state = if report.has_failures() {
            RunState::Failed
        } else {
            RunState::Succeeded
        };
        record_transition(&run_id, &mut history, state);
        Self {
            run_id,
            state,
            history,
            run_dir: run_dir.map(|dir| dir.to_string_lossy().to_string()),
            report,
            artifacts,
            catalog,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    pub fn output(&self, name: &str) -> Option<&StoredArtifact> {
        self.artifacts
            .iter()
            .find(|artifact| artifact.name == name && artifact.kind != ArtifactKind::Process)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub steps: Vec<StepExecution>,
}

impl ExecutionReport {
    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.status == ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            writeln!(f, "No steps to execute.")?;
            return Ok(());
        }

        writeln!(f, "Execution results:")?;
        for step in &self.steps {
            let status = match step.status {
                ExecutionStatus::Completed => "completed",
                ExecutionStatus::Skipped => "skipped",
                ExecutionStatus::Failed => "failed",
            };
            writeln!(f, "  - [{}] {} ({:?})", status, step.name, step.kind)?;
            if let Some(message) = &step.message {
                for line in message.lines() {
                    writeln!(f, "      {}", line)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub name: String,
    pub kind: StepKind,
    pub status: ExecutionStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepKind {
    Resolve,
    Invoke,
    CollectOutput,
    Inspect,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    Skipped,
    Failed,
}

impl StepExecution {
    pub fn completed(name: String, kind: StepKind, message: Option<String>) -> Self {
        Self {
            name,
            kind,
            status: ExecutionStatus::Completed,
            message,
        }
    }

    pub fn failed(name: String, kind: StepKind, message: Option<String>) -> Self {
        Self {
            name,
            kind,
            status: ExecutionStatus::Failed,
            message,
        }
    }

    pub fn skipped(name: String, kind: StepKind, message: Option<String>) -> Self {
        Self {
            name,
            kind,
            status: ExecutionStatus::Skipped,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::DirectoryArtifact;
    use crate::manifest::parse_manifest;

    const CATALOG_URL: &str = "https://example.org/catalog.json";

    /// Same wiring as the builtin manifest, but the tool is a host shell script.
    fn local_manifest(script: &str) -> Manifest {
        let script = serde_json::to_string(script).expect("script encodes");
        let source = format!(
            r##"
$graph:
  - class: Workflow
    id: hazard-options
    inputs:
      catalog_url: string
    outputs:
      hazard-options:
        type: Directory
        outputSource: hazard-options-step/hazard-options
    steps:
      hazard-options-step:
        run: "#tool"
        in:
          catalog_url: catalog_url
        out: [hazard-options]
  - class: CommandLineTool
    id: tool
    baseCommand:
      - sh
      - -c
      - {script}
    inputs:
      catalog_url:
        type: string
        inputBinding:
          position: 4
          prefix: --catalog_url=
          separate: false
    outputs:
      hazard-options:
        type: Directory
        outputBinding:
          glob: ./asset_output
"##
        );
        parse_manifest(&source).expect("local manifest parses")
    }

    fn local_executor(runs_dir: &Path) -> Executor {
        Executor::new(RunnerConfig {
            engine: ContainerEngine::Local,
            runs_dir: runs_dir.to_path_buf(),
            ..RunnerConfig::default()
        })
    }

    fn job(url: &str) -> JobOrder {
        JobOrder::from([("catalog_url".to_string(), Value::String(url.to_string()))])
    }

    fn step<'a>(outcome: &'a ExecutionOutcome, kind: StepKind) -> &'a StepExecution {
        outcome
            .report
            .steps
            .iter()
            .find(|step| step.kind == kind)
            .expect("step present")
    }

    #[test]
    fn docker_argv_mounts_workdir_and_keeps_network() {
        let manifest = Manifest::builtin().expect("builtin manifest parses");
        let executor = Executor::default();
        let plan = executor.plan(&manifest, &job(CATALOG_URL)).expect("plan builds");

        let argv = executor.engine_argv(&plan, Path::new("/tmp/run/work"));
        assert_eq!(
            argv,
            vec![
                "docker",
                "run",
                "--rm",
                "--workdir",
                "/workspace",
                "--mount",
                "type=bind,source=/tmp/run/work,target=/workspace",
                "public.ecr.aws/z0u8g6n1/eodh_hazard_options:latest",
                "main.py",
                "--catalog_url=https://example.org/catalog.json",
            ]
        );
    }

    #[test]
    fn bind_mount_survives_separators_in_the_path() {
        assert_eq!(
            bind_mount(Path::new("/data/runs:2024/work")),
            "type=bind,source=/data/runs:2024/work,target=/workspace"
        );
        assert_eq!(
            bind_mount(Path::new("/data/a,b/work")),
            r#"type=bind,"source=/data/a,b/work",target=/workspace"#
        );
    }

    #[test]
    fn local_engine_reports_ignored_engine_args() {
        let manifest = local_manifest("true");
        let executor = Executor::new(RunnerConfig {
            engine: ContainerEngine::Local,
            engine_args: vec!["--pull".to_string(), "never".to_string()],
            ..RunnerConfig::default()
        });
        let plan = executor.plan(&manifest, &job(CATALOG_URL)).expect("plan builds");

        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("--pull never"));
        let argv = executor.engine_argv(&plan, Path::new("/w"));
        assert!(!argv.iter().any(|arg| arg == "--pull"));
    }

    #[test]
    fn tools_without_network_run_isolated() {
        let mut manifest = Manifest::builtin().expect("builtin manifest parses");
        let tool = manifest
            .tools
            .get_mut("hazard-options-tool")
            .expect("tool present");
        tool.requirements.network_access = Some(false);

        let executor = Executor::new(RunnerConfig {
            engine: ContainerEngine::Podman,
            engine_args: vec!["--pull".to_string(), "never".to_string()],
            ..RunnerConfig::default()
        });
        let plan = executor.plan(&manifest, &job(CATALOG_URL)).expect("plan builds");
        let argv = executor.engine_argv(&plan, Path::new("/w"));

        assert_eq!(argv[0], "podman");
        let network = argv.iter().position(|arg| arg == "--network").expect("network flag");
        assert_eq!(argv[network + 1], "none");
        assert!(argv.windows(2).any(|pair| pair == ["--pull", "never"]));
    }

    #[test]
    fn denied_network_rejects_the_run_up_front() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = Manifest::builtin().expect("builtin manifest parses");
        let executor = Executor::new(RunnerConfig {
            allow_network: false,
            runs_dir: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        });

        assert!(matches!(
            executor.plan(&manifest, &job(CATALOG_URL)),
            Err(PlanError::NetworkDenied(_))
        ));

        let outcome = executor.execute(&manifest, &job(CATALOG_URL));
        assert_eq!(outcome.state, RunState::Failed);
        let states: Vec<RunState> = outcome.history.iter().map(|change| change.state).collect();
        assert_eq!(states, vec![RunState::Pending, RunState::Failed]);
        assert_eq!(outcome.report.steps.len(), 1);
        assert!(outcome.artifacts.is_empty());
        assert!(fs::read_dir(dir.path()).expect("runs dir").next().is_none());
    }

    #[test]
    fn container_engine_needs_an_image() {
        let manifest = local_manifest("true");
        let err = Executor::default()
            .plan(&manifest, &job(CATALOG_URL))
            .expect_err("no image declared");
        assert!(matches!(err, PlanError::MissingImage { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn end_to_end_surfaces_asset_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = local_manifest(
            r#"mkdir -p asset_output && printf '%s' "$0" > asset_output/argv.txt"#,
        );

        let outcome = local_executor(dir.path()).execute(&manifest, &job(CATALOG_URL));
        assert!(outcome.succeeded(), "{}", outcome.report);
        let states: Vec<RunState> = outcome.history.iter().map(|change| change.state).collect();
        assert_eq!(
            states,
            vec![RunState::Pending, RunState::Running, RunState::Succeeded]
        );

        let output = outcome.output("hazard-options").expect("output collected");
        assert_eq!(output.kind, ArtifactKind::Directory);
        let location = PathBuf::from(output.path.as_deref().expect("output path"));
        assert!(location.ends_with("work/asset_output"));

        let written = fs::read_to_string(location.join("argv.txt")).expect("argv recorded");
        assert_eq!(written, "--catalog_url=https://example.org/catalog.json");

        let listing: DirectoryArtifact =
            serde_json::from_value(output.data.clone()).expect("directory data");
        assert_eq!(listing.listing.len(), 1);

        let run_dir = PathBuf::from(outcome.run_dir.as_deref().expect("run dir"));
        let record: Value = serde_json::from_str(
            &fs::read_to_string(run_dir.join(RUN_RECORD)).expect("run record written"),
        )
        .expect("run record decodes");
        assert_eq!(record["state"], "succeeded");
        assert_eq!(record["history"][1]["state"], "running");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_fails_without_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = local_manifest("mkdir -p asset_output; echo boom >&2; exit 3");

        let outcome = local_executor(dir.path()).execute(&manifest, &job(CATALOG_URL));
        assert_eq!(outcome.state, RunState::Failed);
        assert!(outcome.output("hazard-options").is_none());

        let invoke = step(&outcome, StepKind::Invoke);
        assert_eq!(invoke.status, ExecutionStatus::Failed);
        let message = invoke.message.as_deref().unwrap_or_default();
        assert!(message.contains("Some(3)"));
        assert!(message.contains("boom"));
        assert_eq!(
            step(&outcome, StepKind::CollectOutput).status,
            ExecutionStatus::Skipped
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_output_directory_fails_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = local_manifest("true");

        let outcome = local_executor(dir.path()).execute(&manifest, &job(CATALOG_URL));
        assert_eq!(outcome.state, RunState::Failed);
        let collect = step(&outcome, StepKind::CollectOutput);
        assert_eq!(collect.status, ExecutionStatus::Failed);
        assert!(collect
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("matched nothing"));
    }

    #[cfg(unix)]
    #[test]
    fn inspects_catalog_written_by_the_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = json!({
            "stac_version": "1.0.0",
            "id": "asset-vulnerability-catalog",
            "type": "Catalog",
            "links": [
                {"rel": "self", "href": "./catalog.json"},
                {"rel": "root", "href": "./catalog.json"}
            ],
            "data": {
                "climateModelOptions": [],
                "scenarioOptions": [],
                "indicatorOptions": [],
                "hazardTypes": [{"value": "Wind", "label": "Wind"}]
            }
        });
        let manifest = local_manifest(&format!(
            "mkdir -p asset_output && printf '%s' '{catalog}' > asset_output/catalog.json"
        ));

        let outcome = local_executor(dir.path()).execute(&manifest, &job(CATALOG_URL));
        assert!(outcome.succeeded(), "{}", outcome.report);
        let catalog = outcome.catalog.as_ref().expect("catalog inspected");
        assert_eq!(catalog.hazard_types, vec!["Wind".to_string()]);
        assert_eq!(step(&outcome, StepKind::Inspect).status, ExecutionStatus::Completed);
    }

    #[test]
    fn truncates_long_output_on_char_boundaries() {
        let long = "é".repeat(600);
        let truncated = truncate_output(&long);
        assert_eq!(truncated.chars().count(), 513);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_output("short"), "short");
    }
}
