pub mod artifact;
pub mod binding;
pub mod catalog;
pub mod command;
pub mod config;
pub mod manifest;
pub mod output;
pub mod runtime;
pub mod validation;

pub use artifact::{ArtifactKind, DirectoryArtifact, FileEntry, ProcessArtifact, StoredArtifact};
pub use binding::{
    job_from_pairs, load_job, resolve_job, BindingError, JobFileError, JobOrder, ResolvedJob,
};
pub use catalog::{inspect_catalog, CatalogError, CatalogSummary, CATALOG_FILE};
pub use command::{build_invocation, BoundArgument, CommandError, OutputTarget, ToolInvocation};
pub use config::{ConfigError, ContainerEngine, RunnerConfig};
pub use manifest::{
    load_manifest, parse_manifest, parse_tool, LoadError, Manifest, ManifestSummary, ParamType,
    ParseError, ToolDescriptor, TypeKind, WorkflowDescriptor, WorkflowInput, WorkflowOutput,
    WorkflowStep,
};
pub use output::{collect_output, resolve_glob, OutputError};
pub use runtime::{
    ExecutionOutcome, ExecutionPlan, ExecutionReport, ExecutionStatus, Executor, PlanError,
    RunState, StateChange, StepExecution, StepKind,
};
pub use validation::{image_is_pinned, validate_manifest, Diagnostic, DiagnosticLevel};
