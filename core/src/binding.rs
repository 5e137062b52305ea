//! Binds a caller's job order onto the manifest's single step.
//!
//! Values pass through untouched: the resolver only decides which workflow input
//! feeds which tool input and which tool output becomes which workflow output.

use crate::manifest::{split_source, Manifest, ParamType, TypeKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Caller-supplied values keyed by workflow input name.
pub type JobOrder = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedJob {
    pub step_id: String,
    pub tool_key: String,
    /// Values keyed by tool input name.
    pub tool_inputs: BTreeMap<String, Value>,
    /// Workflow output name mapped to the tool output that produces it.
    pub outputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("workflow must declare exactly one step (found {0})")]
    StepCount(usize),
    #[error("step '{step}' runs undefined tool '{run}'")]
    UnknownTool { step: String, run: String },
    #[error("missing required input '{0}'")]
    MissingInput(String),
    #[error("input '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ParamType,
        found: &'static str,
    },
    #[error("invalid value for input '{name}': {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("step input '{input}' is wired to unknown workflow input '{origin}'")]
    UnknownSource { input: String, origin: String },
    #[error("output '{output}' must be sourced from exactly one step output (found {count})")]
    OutputSources { output: String, count: usize },
    #[error("output '{output}' is sourced from '{origin}', which the step does not produce")]
    UnknownStepOutput { output: String, origin: String },
}

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("failed to read job file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode job file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Reads a YAML or JSON job order file.
pub fn load_job(path: &Path) -> Result<JobOrder, JobFileError> {
    let content = fs::read_to_string(path).map_err(|source| JobFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(JobOrder::new());
    }
    serde_yaml::from_str(&content).map_err(|source| JobFileError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Converts `key=value` pairs from the command line into typed job values.
///
/// Text-like inputs keep the raw text exactly; numeric and boolean inputs are parsed.
/// Names the workflow does not declare are kept as text so the resolver can warn about them.
pub fn job_from_pairs(
    manifest: &Manifest,
    pairs: Vec<(String, String)>,
) -> Result<JobOrder, BindingError> {
    let mut job = JobOrder::new();
    for (name, raw) in pairs {
        let kind = manifest
            .workflow
            .inputs
            .get(&name)
            .map(|input| input.param_type.kind);
        let value = match kind {
            Some(TypeKind::Int) => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|err| BindingError::InvalidValue {
                    name: name.clone(),
                    reason: err.to_string(),
                })?,
            Some(TypeKind::Float) => raw
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|err| BindingError::InvalidValue {
                    name: name.clone(),
                    reason: err.to_string(),
                })?,
            Some(TypeKind::Boolean) => raw
                .trim()
                .parse::<bool>()
                .map(Value::from)
                .map_err(|err| BindingError::InvalidValue {
                    name: name.clone(),
                    reason: err.to_string(),
                })?,
            _ => Value::String(raw),
        };
        job.insert(name, value);
    }
    Ok(job)
}

pub fn resolve_job(manifest: &Manifest, job: &JobOrder) -> Result<ResolvedJob, BindingError> {
    let (step_id, step) = manifest
        .single_step()
        .ok_or(BindingError::StepCount(manifest.workflow.steps.len()))?;
    let tool = manifest
        .tool_for(step)
        .ok_or_else(|| BindingError::UnknownTool {
            step: step_id.to_string(),
            run: step.run.clone(),
        })?;

    let mut warnings = Vec::new();
    for name in job.keys() {
        if !manifest.workflow.inputs.contains_key(name) {
            warn!(input = %name, "ignoring value for undeclared input");
            warnings.push(format!("ignoring value for undeclared input '{name}'"));
        }
    }

    let mut workflow_values = BTreeMap::new();
    for (name, input) in &manifest.workflow.inputs {
        let supplied = job
            .get(name)
            .filter(|value| !value.is_null())
            .or(input.default.as_ref());
        match supplied {
            Some(value) => {
                check_type(name, input.param_type, value)?;
                workflow_values.insert(name.clone(), value.clone());
            }
            None if input.is_required() => return Err(BindingError::MissingInput(name.clone())),
            None => {}
        }
    }

    let mut tool_inputs = BTreeMap::new();
    for (tool_input, origin) in &step.inputs {
        if !manifest.workflow.inputs.contains_key(origin) {
            return Err(BindingError::UnknownSource {
                input: tool_input.clone(),
                origin: origin.clone(),
            });
        }
        if let Some(value) = workflow_values.get(origin) {
            tool_inputs.insert(tool_input.clone(), value.clone());
        }
    }
    for (name, input) in &tool.inputs {
        if tool_inputs.contains_key(name) {
            continue;
        }
        if let Some(default) = &input.default {
            tool_inputs.insert(name.clone(), default.clone());
        }
    }

    let mut outputs = BTreeMap::new();
    for (name, output) in &manifest.workflow.outputs {
        let [origin] = output.output_source.as_slice() else {
            return Err(BindingError::OutputSources {
                output: name.clone(),
                count: output.output_source.len(),
            });
        };
        let produced = split_source(origin).filter(|(source_step, source_output)| {
            *source_step == step_id && step.outputs.iter().any(|out| out == source_output)
        });
        let Some((_, step_output)) = produced else {
            return Err(BindingError::UnknownStepOutput {
                output: name.clone(),
                origin: origin.clone(),
            });
        };
        outputs.insert(name.clone(), step_output.to_string());
    }

    Ok(ResolvedJob {
        step_id: step_id.to_string(),
        tool_key: step.run_key().to_string(),
        tool_inputs,
        outputs,
        warnings,
    })
}

fn check_type(name: &str, expected: ParamType, value: &Value) -> Result<(), BindingError> {
    let matches = match expected.kind {
        TypeKind::String | TypeKind::File | TypeKind::Directory => value.is_string(),
        TypeKind::Int => value.is_i64() || value.is_u64(),
        TypeKind::Float => value.is_number(),
        TypeKind::Boolean => value.is_boolean(),
    };
    if matches {
        Ok(())
    } else {
        Err(BindingError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: json_kind(value),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
