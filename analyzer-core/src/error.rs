//! Top-level error hierarchy for the proposal analysis engine.
//!
//! Each component gets its own enum; [`EngineError`] composes them via
//! `#[from]` so callers can match on `EngineError` without caring which
//! component produced the failure.

/// Top-level engine error.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("graph error: {0}")]
    Graph(#[from] analyzer_graph::GraphError),

    #[error("building timelock report: {0}")]
    Decode(String),

    #[error("analysis run errors: {0}")]
    Run(#[from] RunErrors),

    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("analyzer ID cannot be empty")]
    EmptyId,

    #[error("duplicate analyzer ID \"{0}\"")]
    DuplicateId(String),
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("duplicate renderer ID \"{0}\"")]
    DuplicateId(String),

    #[error("unknown renderer \"{0}\"")]
    Unknown(String),

    #[error("renderer \"{renderer}\" is missing required template \"{template}\"")]
    MissingTemplate { renderer: String, template: String },

    #[error("template error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("template registration error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Union of every error recorded across all four analysis levels in one
/// [`crate::engine::Engine::run`] call, in the order each level's errors
/// were produced.
#[derive(Debug)]
pub struct RunErrors(pub Vec<String>);

impl std::fmt::Display for RunErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

impl std::error::Error for RunErrors {}

pub type Result<T> = std::result::Result<T, EngineError>;
