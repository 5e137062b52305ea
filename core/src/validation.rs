use crate::manifest::{split_source, Manifest, ToolDescriptor, WorkflowStep};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub location: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn error(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            location,
            message: message.into(),
        }
    }

    fn warning(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error)
    }
}

pub fn validate_manifest(manifest: &Manifest) -> Vec<Diagnostic> {
    let mut ctx = ValidationContext::new();
    validate_steps(manifest, &mut ctx);
    validate_outputs(manifest, &mut ctx);
    validate_unused_inputs(manifest, &mut ctx);
    ctx.finish()
}

struct ValidationContext {
    stack: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ValidationContext {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, label: String) {
        self.stack.push(label);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn location(&self) -> Option<String> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.join(" > "))
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::error(self.location(), message);
        self.diagnostics.push(diag);
    }

    fn warning(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::warning(self.location(), message);
        self.diagnostics.push(diag);
    }

    fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

fn validate_steps(manifest: &Manifest, ctx: &mut ValidationContext) {
    let workflow = &manifest.workflow;
    match workflow.steps.len() {
        0 => ctx.error("workflow declares no steps"),
        1 => {}
        count => ctx.error(format!(
            "workflow declares {count} steps; only a single step is supported"
        )),
    }

    for (id, step) in &workflow.steps {
        ctx.push(format!("step {id}"));
        match manifest.tool_for(step) {
            Some(tool) => {
                validate_step_wiring(manifest, step, tool, ctx);
                ctx.push(format!("tool {}", tool.id));
                validate_tool(tool, ctx);
                if manifest.workflow.requirements.network_access.unwrap_or(false)
                    != tool.requires_network()
                {
                    ctx.warning(
                        "workflow and tool disagree on NetworkAccess; the tool's setting is used",
                    );
                }
                ctx.pop();
            }
            None => ctx.error(format!("run target '{}' is not defined", step.run)),
        }
        ctx.pop();
    }
}

fn validate_step_wiring(
    manifest: &Manifest,
    step: &WorkflowStep,
    tool: &ToolDescriptor,
    ctx: &mut ValidationContext,
) {
    for (tool_input, source) in &step.inputs {
        ctx.push(format!("in {tool_input}"));
        let target = tool.inputs.get(tool_input);
        let origin = manifest.workflow.inputs.get(source);
        if target.is_none() {
            ctx.error(format!("tool '{}' has no input '{}'", tool.id, tool_input));
        }
        if origin.is_none() {
            ctx.error(format!("source '{source}' is not a workflow input"));
        }
        if let (Some(target), Some(origin)) = (target, origin) {
            if target.param_type.kind != origin.param_type.kind {
                ctx.error(format!(
                    "type mismatch: workflow input is {}, tool input is {}",
                    origin.param_type, target.param_type
                ));
            }
        }
        ctx.pop();
    }

    for (name, input) in &tool.inputs {
        let wired = step.inputs.contains_key(name);
        if !wired && !input.param_type.optional && input.default.is_none() {
            ctx.error(format!("required tool input '{name}' is not wired"));
        }
    }

    for output in &step.outputs {
        if !tool.outputs.contains_key(output) {
            ctx.error(format!(
                "step output '{}' is not declared by tool '{}'",
                output, tool.id
            ));
        }
    }
}

fn validate_tool(tool: &ToolDescriptor, ctx: &mut ValidationContext) {
    match tool.image() {
        Some(image) => {
            if !image_is_pinned(image) {
                ctx.warning(format!(
                    "image '{image}' is not pinned to a version; runs may not be reproducible"
                ));
            }
        }
        None if tool.base_command.is_empty() => {
            ctx.error("tool declares neither a base command nor a container image");
        }
        None => ctx.warning("tool has no DockerRequirement; only the local engine can run it"),
    }

    for (name, input) in &tool.inputs {
        if input.input_binding.is_none() {
            ctx.warning(format!(
                "input '{name}' has no inputBinding and will not appear on the command line"
            ));
        }
    }

    for (name, output) in &tool.outputs {
        match &output.output_binding {
            Some(binding) if binding.glob.trim().is_empty() => {
                ctx.error(format!("output '{name}' has an empty glob"));
            }
            Some(_) => {}
            None => ctx.error(format!("output '{name}' has no outputBinding glob")),
        }
    }
}

fn validate_outputs(manifest: &Manifest, ctx: &mut ValidationContext) {
    for (name, output) in &manifest.workflow.outputs {
        ctx.push(format!("output {name}"));
        if output.output_source.len() != 1 {
            ctx.error(format!(
                "output must be sourced from exactly one step output (found {})",
                output.output_source.len()
            ));
        }

        for source in &output.output_source {
            let Some((step_id, step_output)) = split_source(source) else {
                ctx.error(format!("outputSource '{source}' is not of the form step/output"));
                continue;
            };
            let Some(step) = manifest.workflow.steps.get(step_id) else {
                ctx.error(format!("outputSource '{source}' names unknown step '{step_id}'"));
                continue;
            };
            if !step.outputs.iter().any(|out| out == step_output) {
                ctx.error(format!(
                    "step '{step_id}' does not expose output '{step_output}'"
                ));
                continue;
            }
            if let Some(tool_output) = manifest
                .tool_for(step)
                .and_then(|tool| tool.outputs.get(step_output))
            {
                if tool_output.param_type.kind != output.param_type.kind {
                    ctx.error(format!(
                        "type mismatch: workflow output is {}, tool output is {}",
                        output.param_type, tool_output.param_type
                    ));
                }
            }
        }
        ctx.pop();
    }
}

fn validate_unused_inputs(manifest: &Manifest, ctx: &mut ValidationContext) {
    let referenced: HashSet<&str> = manifest
        .workflow
        .steps
        .values()
        .flat_map(|step| step.inputs.values().map(String::as_str))
        .collect();

    for name in manifest.workflow.inputs.keys() {
        if !referenced.contains(name.as_str()) {
            ctx.push(format!("input {name}"));
            ctx.warning("input is declared but not wired to any step");
            ctx.pop();
        }
    }
}

/// True when the image reference carries a digest or an explicit non-`latest` tag.
pub fn image_is_pinned(image: &str) -> bool {
    if image.contains('@') {
        return true;
    }
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.split_once(':') {
        Some((_, tag)) => !tag.is_empty() && tag != "latest",
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest;

    fn errors(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics
            .iter()
            .filter(|diag| diag.is_error())
            .map(|diag| diag.message.clone())
            .collect()
    }

    #[test]
    fn builtin_manifest_only_warns_about_latest_tag() {
        let manifest = Manifest::builtin().expect("builtin manifest parses");
        let diagnostics = validate_manifest(&manifest);

        assert!(errors(&diagnostics).is_empty(), "{diagnostics:?}");
        assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
        assert_eq!(diagnostics[0].level, DiagnosticLevel::Warning);
        assert!(diagnostics[0].message.contains("not pinned"));
        assert_eq!(
            diagnostics[0].location.as_deref(),
            Some("step hazard-options-step > tool hazard-options-tool")
        );
    }

    #[test]
    fn flags_broken_wiring() {
        let source = r##"
$graph:
  - class: Workflow
    id: wf
    inputs:
      catalog_url: string
      unused: string?
    outputs:
      hazard-options:
        type: Directory
        outputSource: [step/hazard-options, step/other]
    steps:
      step:
        run: "#tool"
        in:
          catalog: catalog_url
        out: [hazard-options]
  - class: CommandLineTool
    id: tool
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
"##;
        let manifest = parse_manifest(source).expect("manifest parses");
        let diagnostics = validate_manifest(&manifest);
        let messages = errors(&diagnostics);

        assert!(messages.iter().any(|m| m.contains("tool 'tool' has no input 'catalog'")));
        assert!(messages
            .iter()
            .any(|m| m.contains("required tool input 'catalog_url' is not wired")));
        assert!(messages.iter().any(|m| m.contains("has no outputBinding glob")));
        assert!(messages.iter().any(|m| m.contains("exactly one step output (found 2)")));
        assert!(messages.iter().any(|m| m.contains("does not expose output 'other'")));
        assert!(diagnostics
            .iter()
            .any(|diag| !diag.is_error() && diag.location.as_deref() == Some("input unused")));
    }

    #[test]
    fn flags_missing_run_target_and_step_count() {
        let source = r##"
class: Workflow
inputs: {}
outputs: {}
steps:
  first:
    run: "#nowhere"
    out: []
  second:
    run: "#nowhere"
    out: []
"##;
        let manifest = parse_manifest(source).expect("manifest parses");
        let messages = errors(&validate_manifest(&manifest));

        assert!(messages.iter().any(|m| m.contains("2 steps")));
        assert!(messages.iter().any(|m| m.contains("run target '#nowhere' is not defined")));
    }

    #[test]
    fn image_pinning_rules() {
        assert!(image_is_pinned("example/tool:1.2.3"));
        assert!(image_is_pinned("registry:5000/tool@sha256:abc"));
        assert!(!image_is_pinned("registry:5000/tool"));
        assert!(!image_is_pinned("public.ecr.aws/z0u8g6n1/eodh_hazard_options:latest"));
        assert!(!image_is_pinned("alpine"));
    }
}
