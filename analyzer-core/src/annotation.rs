//! Annotation model (component A): the immutable record every analyzer
//! attaches to an entity, plus the four-level scope the rest of the engine
//! traverses in.

use serde::{Deserialize, Serialize};

/// The four entity levels a decoded proposal tree is traversed at, in
/// canonical order. This order is load-bearing: the scoped store and the
/// engine's level traversal both rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationLevel {
    Proposal,
    BatchOperation,
    Call,
    Parameter,
}

impl AnnotationLevel {
    /// All four levels, in canonical traversal order.
    pub const CANONICAL_ORDER: [AnnotationLevel; 4] = [
        AnnotationLevel::Proposal,
        AnnotationLevel::BatchOperation,
        AnnotationLevel::Call,
        AnnotationLevel::Parameter,
    ];
}

/// Well-known annotation names and their typed value shapes.
pub mod well_known {
    pub const SEVERITY: &str = "cld.severity";
    pub const RISK: &str = "cld.risk";
    pub const DIFF: &str = "cld.diff";
}

/// `cld.severity` value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

/// `cld.risk` value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    High,
    Medium,
    Low,
}

/// `cld.diff` value shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub value_type: String,
}

/// An immutable annotation attached to one entity.
///
/// `analyzer_id` is empty for framework-emitted annotations and otherwise
/// the ID of the analyzer that produced it. `value` is opaque to the core —
/// well-known names (see [`well_known`]) define a typed shape by convention
/// only, never by a bespoke enum per analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub annotation_type: String,
    pub value: serde_json::Value,
    pub analyzer_id: String,
}

impl Annotation {
    /// Construct a framework-emitted annotation (empty `analyzer_id`).
    pub fn new(name: impl Into<String>, annotation_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            annotation_type: annotation_type.into(),
            value,
            analyzer_id: String::new(),
        }
    }

    /// Construct an annotation attributed to a specific analyzer.
    pub fn new_with(
        name: impl Into<String>,
        annotation_type: impl Into<String>,
        value: serde_json::Value,
        analyzer_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            annotation_type: annotation_type.into(),
            value,
            analyzer_id: analyzer_id.into(),
        }
    }

    pub fn with_analyzer(mut self, analyzer_id: impl Into<String>) -> Self {
        self.analyzer_id = analyzer_id.into();
        self
    }
}

/// A predicate over an [`Annotation`], used with [`filter`].
pub type Predicate<'a> = Box<dyn Fn(&Annotation) -> bool + 'a>;

pub fn by_name<'a>(name: &'a str) -> Predicate<'a> {
    Box::new(move |a: &Annotation| a.name == name)
}

pub fn by_type<'a>(annotation_type: &'a str) -> Predicate<'a> {
    Box::new(move |a: &Annotation| a.annotation_type == annotation_type)
}

pub fn by_analyzer<'a>(analyzer_id: &'a str) -> Predicate<'a> {
    Box::new(move |a: &Annotation| a.analyzer_id == analyzer_id)
}

/// Apply every predicate as a conjunction (AND). An empty predicate list
/// matches everything.
pub fn filter<'a>(annotations: &'a [Annotation], predicates: &[Predicate<'_>]) -> Vec<&'a Annotation> {
    annotations
        .iter()
        .filter(|a| predicates.iter().all(|p| p(a)))
        .collect()
}
