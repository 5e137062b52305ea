use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const BUILTIN_MANIFEST: &str = include_str!("../manifests/hazard-options.cwl");
const DEFAULT_CWL_VERSION: &str = "v1.0";

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub cwl_version: String,
    pub workflow: WorkflowDescriptor,
    /// Tools keyed by graph id, or by the `run` path for tools loaded from their own file.
    pub tools: BTreeMap<String, ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    #[serde(default = "default_process_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, deserialize_with = "requirements")]
    pub requirements: Requirements,
    #[serde(default, deserialize_with = "requirements")]
    pub hints: Requirements,
    #[serde(deserialize_with = "params")]
    pub inputs: BTreeMap<String, WorkflowInput>,
    #[serde(deserialize_with = "params")]
    pub outputs: BTreeMap<String, WorkflowOutput>,
    #[serde(deserialize_with = "keyed")]
    pub steps: BTreeMap<String, WorkflowStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl WorkflowInput {
    pub fn is_required(&self) -> bool {
        !self.param_type.optional && self.default.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutput {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(
        rename = "outputSource",
        default,
        deserialize_with = "source_list"
    )]
    pub output_source: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub run: String,
    /// Tool input name mapped to the workflow input that feeds it.
    #[serde(rename = "in", default, deserialize_with = "step_inputs")]
    pub inputs: BTreeMap<String, String>,
    #[serde(rename = "out", default, deserialize_with = "step_outputs")]
    pub outputs: Vec<String>,
}

impl WorkflowStep {
    /// Graph-local id of the tool this step runs, or the relative path for external tools.
    pub fn run_key(&self) -> &str {
        self.run.strip_prefix('#').unwrap_or(&self.run)
    }

    pub fn is_external(&self) -> bool {
        !self.run.starts_with('#')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(default = "default_process_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "requirements")]
    pub requirements: Requirements,
    #[serde(default, deserialize_with = "requirements")]
    pub hints: Requirements,
    #[serde(rename = "baseCommand", default, deserialize_with = "string_or_list")]
    pub base_command: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<ToolArgument>,
    #[serde(deserialize_with = "params")]
    pub inputs: BTreeMap<String, ToolInput>,
    #[serde(deserialize_with = "params")]
    pub outputs: BTreeMap<String, ToolOutput>,
}

impl ToolDescriptor {
    /// Container image from `DockerRequirement`, falling back to hints.
    pub fn image(&self) -> Option<&str> {
        self.requirements
            .docker_pull
            .as_deref()
            .or(self.hints.docker_pull.as_deref())
    }

    pub fn requires_network(&self) -> bool {
        self.requirements
            .network_access
            .or(self.hints.network_access)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArgument {
    Literal(String),
    Bound(ArgumentBinding),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentBinding {
    #[serde(rename = "valueFrom")]
    pub value_from: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default = "default_separate")]
    pub separate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(
        rename = "inputBinding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_binding: Option<InputBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    #[serde(default)]
    pub position: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default = "default_separate")]
    pub separate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(
        rename = "outputBinding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_binding: Option<OutputBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub glob: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_pull: Option<String>,
    /// Requirement classes this runner does not interpret.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParamType {
    pub kind: TypeKind,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    String,
    Int,
    Float,
    Boolean,
    File,
    Directory,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::String => "string",
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Boolean => "boolean",
            TypeKind::File => "File",
            TypeKind::Directory => "Directory",
        }
    }
}

impl ParamType {
    pub const fn required(kind: TypeKind) -> Self {
        Self {
            kind,
            optional: false,
        }
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (name, optional) = match trimmed.strip_suffix('?') {
            Some(name) => (name, true),
            None => (trimmed, false),
        };
        let kind = match name {
            "string" => TypeKind::String,
            "int" | "long" => TypeKind::Int,
            "float" | "double" => TypeKind::Float,
            "boolean" => TypeKind::Boolean,
            "File" => TypeKind::File,
            "Directory" => TypeKind::Directory,
            other => return Err(format!("unsupported parameter type '{other}'")),
        };
        Ok(Self { kind, optional })
    }
}

impl TryFrom<String> for ParamType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ParamType> for String {
    fn from(value: ParamType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = if self.optional { "?" } else { "" };
        write!(f, "{}{}", self.kind.as_str(), suffix)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
enum Process {
    Workflow(WorkflowDescriptor),
    CommandLineTool(ToolDescriptor),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid manifest document: {0}")]
    InvalidDocument(String),
    #[error("failed to decode manifest: {0}")]
    Decode(#[from] serde_yaml::Error),
    #[error("manifest does not declare a Workflow")]
    MissingWorkflow,
    #[error("manifest declares {0} workflows; exactly one is supported")]
    MultipleWorkflows(usize),
    #[error("duplicate tool id '{0}'")]
    DuplicateId(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

impl Manifest {
    /// The hazard options manifest shipped with the runner.
    pub fn builtin() -> Result<Self, ParseError> {
        parse_manifest(BUILTIN_MANIFEST)
    }

    pub fn builtin_source() -> &'static str {
        BUILTIN_MANIFEST
    }

    /// The workflow's step when it declares exactly one.
    pub fn single_step(&self) -> Option<(&str, &WorkflowStep)> {
        let mut steps = self.workflow.steps.iter();
        match (steps.next(), steps.next()) {
            (Some((id, step)), None) => Some((id.as_str(), step)),
            _ => None,
        }
    }

    pub fn tool_for(&self, step: &WorkflowStep) -> Option<&ToolDescriptor> {
        self.tools.get(step.run_key())
    }

    pub fn requires_network(&self) -> bool {
        self.workflow
            .requirements
            .network_access
            .or(self.workflow.hints.network_access)
            .unwrap_or(false)
            || self.tools.values().any(ToolDescriptor::requires_network)
    }
}

/// Splits an `outputSource` entry into `(step, output)`.
pub fn split_source(source: &str) -> Option<(&str, &str)> {
    let trimmed = source.strip_prefix('#').unwrap_or(source);
    let (step, output) = trimmed.split_once('/')?;
    if step.is_empty() || output.is_empty() || output.contains('/') {
        return None;
    }
    Some((step, output))
}

pub fn parse_manifest(source: &str) -> Result<Manifest, ParseError> {
    let document: Value = serde_yaml::from_str(source)?;
    let Value::Mapping(root) = document else {
        return Err(ParseError::InvalidDocument(
            "expected a mapping at the document root".to_string(),
        ));
    };

    let cwl_version = root
        .get("cwlVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CWL_VERSION)
        .to_string();

    let entries = match root.get("$graph") {
        Some(Value::Sequence(items)) => items.clone(),
        Some(_) => {
            return Err(ParseError::InvalidDocument(
                "'$graph' must be a list of processes".to_string(),
            ))
        }
        None => vec![Value::Mapping(root.clone())],
    };

    let mut workflows = Vec::new();
    let mut tools = BTreeMap::new();

    for entry in entries {
        match serde_yaml::from_value::<Process>(entry)? {
            Process::Workflow(mut workflow) => {
                workflow.id = local_id(&workflow.id);
                workflows.push(workflow);
            }
            Process::CommandLineTool(mut tool) => {
                tool.id = local_id(&tool.id);
                let id = tool.id.clone();
                if tools.insert(id.clone(), tool).is_some() {
                    return Err(ParseError::DuplicateId(id));
                }
            }
        }
    }

    let workflow = match workflows.len() {
        0 => return Err(ParseError::MissingWorkflow),
        1 => workflows.remove(0),
        count => return Err(ParseError::MultipleWorkflows(count)),
    };

    Ok(Manifest {
        cwl_version,
        workflow,
        tools,
    })
}

/// Parses a standalone tool descriptor, as referenced by a step's `run` path.
pub fn parse_tool(source: &str) -> Result<ToolDescriptor, ParseError> {
    match serde_yaml::from_str::<Process>(source)? {
        Process::CommandLineTool(mut tool) => {
            tool.id = local_id(&tool.id);
            Ok(tool)
        }
        Process::Workflow(_) => Err(ParseError::InvalidDocument(
            "expected a CommandLineTool, found a Workflow".to_string(),
        )),
    }
}

/// Loads a manifest file and any tool files its steps reference by relative path.
pub fn load_manifest(path: &Path) -> Result<Manifest, LoadError> {
    let canonical = fs::canonicalize(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = read_file(&canonical)?;
    let mut manifest = parse_manifest(&content).map_err(|source| LoadError::Parse {
        path: canonical.clone(),
        source,
    })?;
    let base_dir = canonical.parent().unwrap_or_else(|| Path::new(""));

    let external: Vec<String> = manifest
        .workflow
        .steps
        .values()
        .filter(|step| step.is_external())
        .map(|step| step.run.clone())
        .collect();

    for run in external {
        if manifest.tools.contains_key(&run) {
            continue;
        }
        let tool_path = base_dir.join(&run);
        let content = read_file(&tool_path)?;
        let tool = parse_tool(&content).map_err(|source| LoadError::Parse {
            path: tool_path.clone(),
            source,
        })?;
        tracing::debug!(path = %tool_path.display(), tool = %tool.id, "loaded external tool");
        manifest.tools.insert(run, tool);
    }

    Ok(manifest)
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn default_process_id() -> String {
    "main".to_string()
}

fn default_separate() -> bool {
    true
}

fn local_id(raw: &str) -> String {
    raw.strip_prefix('#').unwrap_or(raw).to_string()
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Normalizes CWL's two spellings of a keyed collection: a mapping keyed by
/// name, or a list of mappings carrying the name under `key_field`.
fn keyed_entries<E: de::Error>(value: Value, key_field: &str) -> Result<Vec<(String, Value)>, E> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(map) => map
            .into_iter()
            .map(|(key, value)| {
                let key = key
                    .as_str()
                    .ok_or_else(|| E::custom("expected string keys"))?;
                Ok((local_id(key), value))
            })
            .collect(),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| {
                let Value::Mapping(mut map) = item else {
                    return Err(E::custom(format!(
                        "expected list entries to be mappings with '{key_field}'"
                    )));
                };
                let key = map
                    .remove(key_field)
                    .and_then(|value| value.as_str().map(local_id))
                    .ok_or_else(|| E::custom(format!("list entry is missing '{key_field}'")))?;
                Ok((key, Value::Mapping(map)))
            })
            .collect(),
        other => Err(E::custom(format!(
            "expected a mapping or a list, found {}",
            describe(&other)
        ))),
    }
}

fn decode_entries<E, T>(
    entries: Vec<(String, Value)>,
    type_shorthand: bool,
) -> Result<BTreeMap<String, T>, E>
where
    E: de::Error,
    T: DeserializeOwned,
{
    let mut decoded = BTreeMap::new();
    for (id, raw) in entries {
        let raw = match raw {
            // `name: string` is shorthand for `name: { type: string }`.
            Value::String(type_name) if type_shorthand => {
                let mut map = Mapping::new();
                map.insert(Value::String("type".to_string()), Value::String(type_name));
                Value::Mapping(map)
            }
            other => other,
        };
        let value = serde_yaml::from_value(raw).map_err(|err| E::custom(format!("{id}: {err}")))?;
        decoded.insert(id, value);
    }
    Ok(decoded)
}

fn params<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let entries = keyed_entries::<D::Error>(value, "id")?;
    decode_entries(entries, true)
}

fn keyed<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let entries = keyed_entries::<D::Error>(value, "id")?;
    decode_entries(entries, false)
}

fn requirements<'de, D>(deserializer: D) -> Result<Requirements, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut requirements = Requirements::default();

    for (class, body) in keyed_entries::<D::Error>(value, "class")? {
        match class.as_str() {
            "NetworkAccess" => {
                let flag = body
                    .get("networkAccess")
                    .ok_or_else(|| de::Error::custom("NetworkAccess requires 'networkAccess'"))?;
                let flag = flag.as_bool().ok_or_else(|| {
                    de::Error::custom("'networkAccess' must be a boolean literal")
                })?;
                requirements.network_access = Some(flag);
            }
            "DockerRequirement" => {
                let image = body
                    .get("dockerPull")
                    .and_then(Value::as_str)
                    .ok_or_else(|| de::Error::custom("DockerRequirement requires 'dockerPull'"))?;
                requirements.docker_pull = Some(image.to_string());
            }
            other => requirements.other.push(other.to_string()),
        }
    }

    Ok(requirements)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(OneOrMany::deserialize(deserializer)?.into_vec())
}

fn source_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(OneOrMany::deserialize(deserializer)?
        .into_vec()
        .iter()
        .map(|source| local_id(source))
        .collect())
}

fn step_inputs<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut inputs = BTreeMap::new();
    for (name, raw) in keyed_entries::<D::Error>(value, "id")? {
        let source = match &raw {
            Value::String(source) => source.clone(),
            Value::Mapping(map) => match map.get("source") {
                Some(Value::String(source)) => source.clone(),
                Some(Value::Sequence(items)) if items.len() == 1 => items[0]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| de::Error::custom(format!("{name}: source must be a string")))?,
                Some(_) => {
                    return Err(de::Error::custom(format!(
                        "{name}: exactly one source is supported"
                    )))
                }
                None => return Err(de::Error::custom(format!("{name}: missing 'source'"))),
            },
            other => {
                return Err(de::Error::custom(format!(
                    "{name}: expected a source name, found {}",
                    describe(other)
                )))
            }
        };
        inputs.insert(name, local_id(&source));
    }
    Ok(inputs)
}

fn step_outputs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OutEntry {
        Id(String),
        Named { id: String },
    }

    let entries = Vec::<OutEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            OutEntry::Id(id) | OutEntry::Named { id } => local_id(&id),
        })
        .collect())
}

impl Manifest {
    pub fn summary(&self) -> ManifestSummary {
        let workflow = &self.workflow;
        ManifestSummary {
            workflow: workflow.id.clone(),
            label: workflow.label.clone(),
            cwl_version: self.cwl_version.clone(),
            network_access: self.requires_network(),
            inputs: workflow
                .inputs
                .iter()
                .map(|(name, input)| InputSummary {
                    name: name.clone(),
                    param_type: input.param_type.to_string(),
                    required: input.is_required(),
                })
                .collect(),
            outputs: workflow
                .outputs
                .iter()
                .map(|(name, output)| OutputSummary {
                    name: name.clone(),
                    param_type: output.param_type.to_string(),
                    sources: output.output_source.clone(),
                })
                .collect(),
            steps: workflow
                .steps
                .iter()
                .map(|(id, step)| StepSummary {
                    id: id.clone(),
                    run: step.run.clone(),
                    image: self.tool_for(step).and_then(|tool| tool.image().map(str::to_string)),
                    base_command: self
                        .tool_for(step)
                        .map(|tool| tool.base_command.clone())
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub workflow: String,
    pub label: Option<String>,
    pub cwl_version: String,
    pub network_access: bool,
    pub inputs: Vec<InputSummary>,
    pub outputs: Vec<OutputSummary>,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSummary {
    pub name: String,
    pub param_type: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSummary {
    pub name: String,
    pub param_type: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: String,
    pub run: String,
    pub image: Option<String>,
    pub base_command: Vec<String>,
}

impl fmt::Display for ManifestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => writeln!(f, "Workflow: {} ({})", self.workflow, label)?,
            None => writeln!(f, "Workflow: {}", self.workflow)?,
        }
        writeln!(f, "CWL version: {}", self.cwl_version)?;
        writeln!(
            f,
            "Network access: {}",
            if self.network_access { "required" } else { "not requested" }
        )?;
        if !self.inputs.is_empty() {
            writeln!(f, "Inputs:")?;
            for input in &self.inputs {
                let requirement = if input.required { "required" } else { "optional" };
                writeln!(f, "  - {}: {} ({})", input.name, input.param_type, requirement)?;
            }
        }
        if !self.outputs.is_empty() {
            writeln!(f, "Outputs:")?;
            for output in &self.outputs {
                writeln!(
                    f,
                    "  - {}: {} <- {}",
                    output.name,
                    output.param_type,
                    output.sources.join(", ")
                )?;
            }
        }
        if !self.steps.is_empty() {
            writeln!(f, "Steps:")?;
            for step in &self.steps {
                let image = step.image.as_deref().unwrap_or("<no image>");
                writeln!(f, "  - {} runs {} in {}", step.id, step.run, image)?;
                if !step.base_command.is_empty() {
                    writeln!(f, "      base command: {}", step.base_command.join(" "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_manifest_wires_single_step() {
        let manifest = Manifest::builtin().expect("builtin manifest parses");
        assert_eq!(manifest.workflow.id, "hazard-options");

        let (step_id, step) = manifest.single_step().expect("single step");
        assert_eq!(step_id, "hazard-options-step");
        assert_eq!(step.inputs.get("catalog_url").map(String::as_str), Some("catalog_url"));
        assert_eq!(step.outputs, vec!["hazard-options".to_string()]);

        let output = &manifest.workflow.outputs["hazard-options"];
        assert_eq!(output.param_type, ParamType::required(TypeKind::Directory));
        assert_eq!(output.output_source, vec!["hazard-options-step/hazard-options".to_string()]);

        let tool = manifest.tool_for(step).expect("tool resolved from graph");
        assert_eq!(tool.image(), Some("public.ecr.aws/z0u8g6n1/eodh_hazard_options:latest"));
        assert!(tool.requires_network());
        assert_eq!(tool.base_command, vec!["main.py".to_string()]);

        let binding = tool.inputs["catalog_url"].input_binding.clone().expect("binding");
        assert_eq!(binding.position, 4);
        assert_eq!(binding.prefix.as_deref(), Some("--catalog_url="));
        assert!(!binding.separate);

        let glob = tool.outputs["hazard-options"]
            .output_binding
            .as_ref()
            .map(|binding| binding.glob.as_str());
        assert_eq!(glob, Some("./asset_output"));
    }

    #[test]
    fn accepts_list_forms_and_shorthand_types() {
        let source = r##"
cwlVersion: v1.2
$graph:
  - class: Workflow
    id: "#wf"
    requirements:
      - class: NetworkAccess
        networkAccess: true
    inputs:
      - id: catalog_url
        type: string
      - id: verbose
        type: boolean?
    outputs:
      result:
        type: Directory
        outputSource: "#run/out_dir"
    steps:
      - id: run
        run: "#tool"
        in:
          - id: catalog_url
            source: catalog_url
        out:
          - id: out_dir
  - class: CommandLineTool
    id: "#tool"
    hints:
      - class: DockerRequirement
        dockerPull: example/tool:1.0
      - class: ResourceRequirement
    baseCommand: [python, main.py]
    inputs:
      catalog_url:
        type: string
        inputBinding:
          prefix: --catalog_url
    outputs:
      out_dir:
        type: Directory
        outputBinding:
          glob: out
"##;

        let manifest = parse_manifest(source).expect("manifest parses");
        assert_eq!(manifest.cwl_version, "v1.2");
        assert_eq!(manifest.workflow.id, "wf");
        assert!(manifest.workflow.inputs["catalog_url"].is_required());
        assert!(!manifest.workflow.inputs["verbose"].is_required());
        assert_eq!(manifest.workflow.outputs["result"].output_source, vec!["run/out_dir"]);

        let (_, step) = manifest.single_step().expect("one step");
        assert_eq!(step.outputs, vec!["out_dir".to_string()]);
        let tool = manifest.tool_for(step).expect("tool present");
        assert_eq!(tool.image(), Some("example/tool:1.0"));
        assert_eq!(tool.hints.other, vec!["ResourceRequirement".to_string()]);
        assert!(!tool.requires_network());
        assert!(tool.inputs["catalog_url"].input_binding.as_ref().is_some_and(|b| b.separate));
    }

    #[test]
    fn rejects_documents_without_exactly_one_workflow() {
        let tool_only = r#"
class: CommandLineTool
baseCommand: echo
inputs: {}
outputs: {}
"#;
        assert!(matches!(parse_manifest(tool_only), Err(ParseError::MissingWorkflow)));

        let two = r#"
$graph:
  - class: Workflow
    id: a
    inputs: {}
    outputs: {}
    steps: {}
  - class: Workflow
    id: b
    inputs: {}
    outputs: {}
    steps: {}
"#;
        assert!(matches!(parse_manifest(two), Err(ParseError::MultipleWorkflows(2))));
    }

    #[test]
    fn rejects_unsupported_types() {
        let source = r#"
class: Workflow
inputs:
  catalog_url: record
outputs: {}
steps: {}
"#;
        let err = parse_manifest(source).expect_err("record type is unsupported");
        assert!(err.to_string().contains("unsupported parameter type 'record'"));
    }

    #[test]
    fn loads_external_tool_relative_to_workflow() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("workflow.cwl"),
            r#"
class: Workflow
inputs:
  catalog_url: string
outputs:
  hazard-options:
    type: Directory
    outputSource: fetch/hazard-options
steps:
  fetch:
    run: tools/fetch.cwl
    in:
      catalog_url: catalog_url
    out: [hazard-options]
"#,
        )
        .expect("write workflow");
        fs::create_dir_all(dir.path().join("tools")).expect("tools dir");
        fs::write(
            dir.path().join("tools/fetch.cwl"),
            r#"
class: CommandLineTool
baseCommand: main.py
inputs:
  catalog_url:
    type: string
    inputBinding:
      prefix: --catalog_url=
      separate: false
outputs:
  hazard-options:
    type: Directory
    outputBinding:
      glob: ./asset_output
"#,
        )
        .expect("write tool");

        let manifest = load_manifest(&dir.path().join("workflow.cwl")).expect("manifest loads");
        let (_, step) = manifest.single_step().expect("one step");
        assert!(step.is_external());
        let tool = manifest.tool_for(step).expect("external tool loaded");
        assert_eq!(tool.base_command, vec!["main.py".to_string()]);
    }

    #[test]
    fn missing_external_tool_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("workflow.cwl");
        fs::write(
            &path,
            r#"
class: Workflow
inputs: {}
outputs: {}
steps:
  fetch:
    run: missing.cwl
    out: []
"#,
        )
        .expect("write workflow");

        let err = load_manifest(&path).expect_err("missing tool file");
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("missing.cwl"));
    }

    #[test]
    fn split_source_requires_step_and_output() {
        assert_eq!(split_source("step/out"), Some(("step", "out")));
        assert_eq!(split_source("#step/out"), Some(("step", "out")));
        assert_eq!(split_source("catalog_url"), None);
        assert_eq!(split_source("a/b/c"), None);
    }

    #[test]
    fn summary_lists_inputs_outputs_and_steps() {
        let manifest = Manifest::builtin().expect("builtin manifest parses");
        let rendered = manifest.summary().to_string();
        assert!(rendered.contains("Workflow: hazard-options (Hazard options)"));
        assert!(rendered.contains("catalog_url: string (required)"));
        assert!(
            rendered.contains("hazard-options: Directory <- hazard-options-step/hazard-options")
        );
        assert!(rendered.contains("public.ecr.aws/z0u8g6n1/eodh_hazard_options:latest"));
    }
}
