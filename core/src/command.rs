use crate::manifest::{ParamType, ToolArgument, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A fully bound command line plus the execution environment it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub image: Option<String>,
    pub network_access: bool,
    pub base_command: Vec<String>,
    pub arguments: Vec<BoundArgument>,
    pub outputs: BTreeMap<String, OutputTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundArgument {
    pub position: i32,
    /// Tool input that produced the argument, `None` for static arguments.
    pub input: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub glob: String,
    pub param_type: ParamType,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("tool '{0}' declares neither a base command nor a container image")]
    NothingToRun(String),
    #[error("input '{name}' cannot be rendered on the command line: {reason}")]
    Unrenderable { name: String, reason: String },
    #[error("output '{0}' has no glob")]
    MissingGlob(String),
}

impl ToolInvocation {
    /// The process argument vector: base command followed by the sorted arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.base_command.clone();
        for argument in &self.arguments {
            argv.extend(argument.values.iter().cloned());
        }
        argv
    }

    /// Shell-quoted rendering of [`argv`](Self::argv) for display.
    pub fn display(&self) -> String {
        shell_words::join(self.argv())
    }

    pub fn argument_for(&self, input: &str) -> Option<&BoundArgument> {
        self.arguments
            .iter()
            .find(|argument| argument.input.as_deref() == Some(input))
    }
}

/// Builds the invocation for `tool` from values keyed by tool input name.
///
/// Arguments are ordered by binding position; ties keep static arguments first
/// (in declaration order) and then inputs by name.
pub fn build_invocation(
    tool: &ToolDescriptor,
    inputs: &BTreeMap<String, Value>,
) -> Result<ToolInvocation, CommandError> {
    if tool.base_command.is_empty() && tool.image().is_none() {
        return Err(CommandError::NothingToRun(tool.id.clone()));
    }

    let mut ranked: Vec<((i32, u8, usize, &str), BoundArgument)> = Vec::new();

    for (index, argument) in tool.arguments.iter().enumerate() {
        let bound = match argument {
            ToolArgument::Literal(value) => BoundArgument {
                position: 0,
                input: None,
                values: vec![value.clone()],
            },
            ToolArgument::Bound(binding) => BoundArgument {
                position: binding.position,
                input: None,
                values: apply_prefix(
                    binding.prefix.as_deref(),
                    binding.separate,
                    binding.value_from.clone(),
                ),
            },
        };
        ranked.push(((bound.position, 0, index, ""), bound));
    }

    for (name, input) in &tool.inputs {
        let Some(binding) = &input.input_binding else {
            continue;
        };
        let Some(value) = inputs.get(name) else {
            continue;
        };
        let values = render_input(name, binding.prefix.as_deref(), binding.separate, value)?;
        if values.is_empty() {
            continue;
        }
        let bound = BoundArgument {
            position: binding.position,
            input: Some(name.clone()),
            values,
        };
        ranked.push(((binding.position, 1, 0, name.as_str()), bound));
    }

    ranked.sort_by(|(left, _), (right, _)| left.cmp(right));
    let arguments = ranked.into_iter().map(|(_, bound)| bound).collect();

    let mut outputs = BTreeMap::new();
    for (name, output) in &tool.outputs {
        let glob = output
            .output_binding
            .as_ref()
            .map(|binding| binding.glob.trim())
            .filter(|glob| !glob.is_empty())
            .ok_or_else(|| CommandError::MissingGlob(name.clone()))?;
        outputs.insert(
            name.clone(),
            OutputTarget {
                glob: glob.to_string(),
                param_type: output.param_type,
            },
        );
    }

    Ok(ToolInvocation {
        tool: tool.id.clone(),
        image: tool.image().map(str::to_string),
        network_access: tool.requires_network(),
        base_command: tool.base_command.clone(),
        arguments,
        outputs,
    })
}

fn render_input(
    name: &str,
    prefix: Option<&str>,
    separate: bool,
    value: &Value,
) -> Result<Vec<String>, CommandError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Bool(true) => Ok(prefix.map(|p| vec![p.to_string()]).unwrap_or_default()),
        Value::Bool(false) => Ok(Vec::new()),
        Value::String(text) => Ok(apply_prefix(prefix, separate, text.clone())),
        Value::Number(number) => Ok(apply_prefix(prefix, separate, number.to_string())),
        Value::Array(_) | Value::Object(_) => Err(CommandError::Unrenderable {
            name: name.to_string(),
            reason: "lists and records are not supported".to_string(),
        }),
    }
}

fn apply_prefix(prefix: Option<&str>, separate: bool, value: String) -> Vec<String> {
    match prefix {
        None => vec![value],
        Some(prefix) if separate => vec![prefix.to_string(), value],
        Some(prefix) => vec![format!("{prefix}{value}")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{parse_manifest, Manifest};
    use serde_json::json;

    fn hazard_tool() -> ToolDescriptor {
        let manifest = Manifest::builtin().expect("builtin manifest parses");
        manifest.tools["hazard-options-tool"].clone()
    }

    fn catalog(value: &str) -> BTreeMap<String, Value> {
        BTreeMap::from([("catalog_url".to_string(), json!(value))])
    }

    #[test]
    fn catalog_url_is_rendered_without_separator() {
        let tool = hazard_tool();
        let values = [
            "https://example.org/catalog.json",
            "s3://bucket/key with spaces/catalog.json",
            "a=b&c=d",
            "",
            "ünïcödé",
        ];

        for value in values {
            let invocation = build_invocation(&tool, &catalog(value)).expect("invocation builds");
            let argument = invocation.argument_for("catalog_url").expect("argument bound");
            assert_eq!(argument.position, 4);
            assert_eq!(argument.values, vec![format!("--catalog_url={value}")]);

            let argv = invocation.argv();
            assert_eq!(argv.first().map(String::as_str), Some("main.py"));
            assert_eq!(argv.last(), Some(&format!("--catalog_url={value}")));
            assert_eq!(argv.len(), 2);
        }
    }

    #[test]
    fn carries_image_network_and_output_glob() {
        let invocation =
            build_invocation(&hazard_tool(), &catalog("https://example.org/catalog.json"))
                .expect("invocation builds");

        assert_eq!(
            invocation.image.as_deref(),
            Some("public.ecr.aws/z0u8g6n1/eodh_hazard_options:latest")
        );
        assert!(invocation.network_access);
        assert_eq!(invocation.outputs["hazard-options"].glob, "./asset_output");
        assert_eq!(
            invocation.argv().last().map(String::as_str),
            Some("--catalog_url=https://example.org/catalog.json")
        );
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let invocation = build_invocation(&hazard_tool(), &catalog("a b")).expect("builds");
        assert_eq!(invocation.display(), "main.py '--catalog_url=a b'");
    }

    #[test]
    fn orders_by_position_then_name() {
        let source = r#"
$graph:
  - class: Workflow
    inputs: {}
    outputs: {}
    steps: {}
  - class: CommandLineTool
    id: tool
    baseCommand: [python, run.py]
    arguments:
      - --quiet
      - valueFrom: out
        position: 9
        prefix: --dest
    inputs:
      zeta:
        type: string
        inputBinding: { position: 2 }
      alpha:
        type: string
        inputBinding: { position: 2, prefix: -a }
      verbose:
        type: boolean
        inputBinding: { position: 1, prefix: --verbose }
      limit:
        type: int
        inputBinding: { position: 3, prefix: "--limit=", separate: false }
      unbound: string
    outputs: {}
"#;
        let manifest = parse_manifest(source).expect("manifest parses");
        let tool = &manifest.tools["tool"];
        let inputs = BTreeMap::from([
            ("zeta".to_string(), json!("z")),
            ("alpha".to_string(), json!("a")),
            ("verbose".to_string(), json!(true)),
            ("limit".to_string(), json!(5)),
            ("unbound".to_string(), json!("ignored")),
        ]);

        let invocation = build_invocation(tool, &inputs).expect("invocation builds");
        assert_eq!(
            invocation.argv(),
            vec![
                "python", "run.py", "--quiet", "--verbose", "-a", "a", "z", "--limit=5",
                "--dest", "out"
            ]
        );
    }

    #[test]
    fn false_flags_and_missing_values_are_omitted() {
        let source = r#"
class: CommandLineTool
id: tool
baseCommand: run
inputs:
  verbose:
    type: boolean
    inputBinding: { prefix: --verbose }
  name:
    type: string?
    inputBinding: { prefix: --name }
outputs: {}
"#;
        let tool = crate::manifest::parse_tool(source).expect("tool parses");
        let inputs = BTreeMap::from([("verbose".to_string(), json!(false))]);
        let invocation = build_invocation(&tool, &inputs).expect("invocation builds");
        assert_eq!(invocation.argv(), vec!["run"]);
    }

    #[test]
    fn rejects_lists_and_empty_tools() {
        let tool = hazard_tool();
        let inputs = BTreeMap::from([("catalog_url".to_string(), json!(["a", "b"]))]);
        assert!(matches!(
            build_invocation(&tool, &inputs),
            Err(CommandError::Unrenderable { .. })
        ));

        let mut empty = tool.clone();
        empty.base_command.clear();
        empty.requirements.docker_pull = None;
        assert!(matches!(
            build_invocation(&empty, &BTreeMap::new()),
            Err(CommandError::NothingToRun(_))
        ));
    }
}
