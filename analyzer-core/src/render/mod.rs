//! Render contract (component E's output side): named renderers dispatch
//! template-driven output over an [`AnalyzedProposal`].

pub mod markdown;

use std::io::Write;

use crate::error::{RenderError, Result};
use crate::tree::AnalyzedProposal;

/// Every renderer must provide templates under these names; a renderer
/// missing one is rejected at construction, not at first render.
pub const REQUIRED_TEMPLATES: [&str; 5] =
    ["proposal", "batchOperation", "call", "parameter", "annotations"];

/// Domain + environment + renderer-specific options (opaque to the core).
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub domain: String,
    pub environment_name: String,
    pub options: serde_json::Value,
}

/// A named component that serializes an analyzed proposal to a writer.
pub trait Renderer: Send + Sync {
    fn id(&self) -> &str;

    fn render_to(
        &self,
        writer: &mut dyn Write,
        request: &RenderRequest,
        analyzed: &AnalyzedProposal,
    ) -> Result<()>;
}

/// Fail fast if `template_names` does not contain every entry of
/// [`REQUIRED_TEMPLATES`]. Shared by every renderer constructor so the
/// check happens once, the same way, everywhere.
pub fn require_templates(renderer_id: &str, template_names: &[&str]) -> Result<()> {
    for required in REQUIRED_TEMPLATES {
        if !template_names.contains(&required) {
            return Err(RenderError::MissingTemplate {
                renderer: renderer_id.to_string(),
                template: required.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_template() {
        let err = require_templates("test", &["proposal", "call"]).unwrap_err();
        assert!(err.to_string().contains("batchOperation"));
    }

    #[test]
    fn accepts_superset() {
        let mut names = REQUIRED_TEMPLATES.to_vec();
        names.push("extra");
        require_templates("test", &names).unwrap();
    }
}
