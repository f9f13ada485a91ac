//! The default renderer: a handlebars template set producing a Markdown
//! report, wired through the five required partials (`proposal`,
//! `batchOperation`, `call`, `parameter`, `annotations`).

use std::io::Write;

use handlebars::Handlebars;
use serde_json::json;

use super::{RenderRequest, Renderer, require_templates};
use crate::annotation::Annotation;
use crate::error::{RenderError, Result};
use crate::tree::{AnalyzedCall, AnalyzedParameter, AnalyzedProposal};

const PROPOSAL_TEMPLATE: &str = "\
# Proposal Analysis — {{domain}} / {{environmentName}}

{{> annotations annotations=annotations}}
{{#each batches}}
{{> batchOperation this}}
{{/each}}
";

const BATCH_OPERATION_TEMPLATE: &str = "\
## Batch operation (chain {{chainSelector}})

{{> annotations annotations=annotations}}
{{#each calls}}
{{> call this}}
{{/each}}
";

const CALL_TEMPLATE: &str = "\
### {{name}} — {{contractType}} {{contractVersion}} ({{to}})

{{> annotations annotations=annotations}}
{{#if inputs}}
**Inputs**
{{#each inputs}}
{{> parameter this}}
{{/each}}
{{/if}}
{{#if outputs}}
**Outputs**
{{#each outputs}}
{{> parameter this}}
{{/each}}
{{/if}}
";

const PARAMETER_TEMPLATE: &str = "\
- `{{name}}` ({{parameterType}}) = {{value}}
{{> annotations annotations=annotations}}
";

const ANNOTATIONS_TEMPLATE: &str = "\
{{#each annotations}}
  - [{{this.analyzerId}}] {{this.name}} ({{this.annotationType}}): {{this.value}}
{{/each}}
";

/// Template-driven Markdown renderer. Construction fails if any required
/// template is missing, per the render contract.
#[derive(Debug)]
pub struct MarkdownRenderer {
    handlebars: Handlebars<'static>,
}

impl MarkdownRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("proposal", PROPOSAL_TEMPLATE)
            .map_err(RenderError::Template)?;
        handlebars
            .register_template_string("batchOperation", BATCH_OPERATION_TEMPLATE)
            .map_err(RenderError::Template)?;
        handlebars
            .register_template_string("call", CALL_TEMPLATE)
            .map_err(RenderError::Template)?;
        handlebars
            .register_template_string("parameter", PARAMETER_TEMPLATE)
            .map_err(RenderError::Template)?;
        handlebars
            .register_template_string("annotations", ANNOTATIONS_TEMPLATE)
            .map_err(RenderError::Template)?;

        let registered: Vec<&str> = handlebars.get_templates().keys().map(String::as_str).collect();
        require_templates("markdown", &registered)?;

        Ok(Self { handlebars })
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new().expect("built-in markdown templates are always valid")
    }
}

impl Renderer for MarkdownRenderer {
    fn id(&self) -> &str {
        "markdown"
    }

    fn render_to(
        &self,
        writer: &mut dyn Write,
        request: &RenderRequest,
        analyzed: &AnalyzedProposal,
    ) -> Result<()> {
        let data = json!({
            "domain": request.domain,
            "environmentName": request.environment_name,
            "annotations": annotations_json(&analyzed.annotations.snapshot()),
            "batches": analyzed.batch_operations.iter().map(batch_json).collect::<Vec<_>>(),
        });

        let rendered = self
            .handlebars
            .render("proposal", &data)
            .map_err(RenderError::Render)?;
        writer.write_all(rendered.as_bytes()).map_err(RenderError::Io)?;
        Ok(())
    }
}

fn annotations_json(annotations: &[Annotation]) -> serde_json::Value {
    json!(
        annotations
            .iter()
            .map(|a| json!({
                "analyzerId": a.analyzer_id,
                "name": a.name,
                "annotationType": a.annotation_type,
                "value": a.value,
            }))
            .collect::<Vec<_>>()
    )
}

fn batch_json(batch: &crate::tree::AnalyzedBatchOperation) -> serde_json::Value {
    json!({
        "chainSelector": batch.chain_selector,
        "annotations": annotations_json(&batch.annotations.snapshot()),
        "calls": batch.calls.iter().map(call_json).collect::<Vec<_>>(),
    })
}

fn call_json(call: &AnalyzedCall) -> serde_json::Value {
    json!({
        "name": call.name,
        "to": call.to,
        "contractType": call.contract_type,
        "contractVersion": call.contract_version,
        "annotations": annotations_json(&call.annotations.snapshot()),
        "inputs": call.inputs.iter().map(parameter_json).collect::<Vec<_>>(),
        "outputs": call.outputs.iter().map(parameter_json).collect::<Vec<_>>(),
    })
}

fn parameter_json(parameter: &AnalyzedParameter) -> serde_json::Value {
    json!({
        "name": parameter.name,
        "parameterType": parameter.parameter_type,
        "value": parameter.value,
        "annotations": annotations_json(&parameter.annotations.snapshot()),
    })
}
