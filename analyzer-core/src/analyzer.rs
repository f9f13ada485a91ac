//! Analyzer traits and per-kind contexts (component C's typed vocabulary).
//!
//! The source this engine is modeled on dispatches through one polymorphic
//! `Analyzer` interface with a runtime kind tag. Rust has no safe runtime
//! downcast from a trait object back to a concrete per-kind trait, so this
//! is a tagged variant instead: one trait per [`AnalyzerKind`], each with
//! its own `CanAnalyze`/`Analyze` signature over the entity type that kind
//! actually sees. [`crate::registry::AnalyzerRegistry`] keeps one typed
//! collection per kind plus an ID-keyed [`RegisteredAnalyzer`] enum for
//! kind-agnostic lookup.
//!
//! Contexts hold an `Arc<DecodedTimelockProposal>` plus indices rather than
//! borrowed references, so an `AnalyzeRequest` is `'static` and can be
//! handed to a spawned task — required for the timeout contract in
//! [`crate::engine`] to actually abandon a misbehaving analyzer instead of
//! just racing a future that never yields back to the same task.

use std::sync::Arc;

use crate::annotation::Annotation;
use crate::error::Result;
use crate::store::ScopedAnnotationStore;
use crate::tree::{DecodedBatchOperation, DecodedCall, DecodedParameter, DecodedTimelockProposal, ParameterSlot};

/// The four analyzer kinds, one per entity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerKind {
    Proposal,
    BatchOperation,
    Call,
    Parameter,
}

/// Opaque, chain-agnostic run context forwarded to every analyzer
/// invocation. `chains` and `data_store` are deliberately type-erased: the
/// core never interprets them, it only threads them through to analyzers
/// that were built against a specific chain integration.
pub struct ExecutionContext {
    pub domain: String,
    pub environment_name: String,
    pub chains: Arc<dyn std::any::Any + Send + Sync>,
    pub data_store: Arc<dyn std::any::Any + Send + Sync>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("domain", &self.domain)
            .field("environment_name", &self.environment_name)
            .finish_non_exhaustive()
    }
}

/// A proposal-level analyzer sees only the proposal.
#[derive(Debug, Clone)]
pub struct ProposalContext {
    pub proposal: Arc<DecodedTimelockProposal>,
}

impl ProposalContext {
    pub fn proposal(&self) -> &DecodedTimelockProposal {
        &self.proposal
    }
}

/// A batch-operation analyzer sees the owning proposal.
#[derive(Debug, Clone)]
pub struct BatchOperationContext {
    pub proposal: Arc<DecodedTimelockProposal>,
    pub batch_idx: usize,
}

impl BatchOperationContext {
    pub fn proposal(&self) -> &DecodedTimelockProposal {
        &self.proposal
    }

    pub fn batch(&self) -> &DecodedBatchOperation {
        &self.proposal.batch_operations[self.batch_idx]
    }
}

/// A call analyzer sees the owning proposal and batch.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub proposal: Arc<DecodedTimelockProposal>,
    pub batch_idx: usize,
    pub call_idx: usize,
}

impl CallContext {
    pub fn proposal(&self) -> &DecodedTimelockProposal {
        &self.proposal
    }

    pub fn batch(&self) -> &DecodedBatchOperation {
        &self.proposal.batch_operations[self.batch_idx]
    }

    pub fn call(&self) -> &DecodedCall {
        &self.batch().calls[self.call_idx]
    }
}

/// A parameter analyzer sees the owning proposal, batch and call.
#[derive(Debug, Clone)]
pub struct ParameterContext {
    pub proposal: Arc<DecodedTimelockProposal>,
    pub batch_idx: usize,
    pub call_idx: usize,
    pub slot: ParameterSlot,
    pub parameter_idx: usize,
}

impl ParameterContext {
    pub fn proposal(&self) -> &DecodedTimelockProposal {
        &self.proposal
    }

    pub fn batch(&self) -> &DecodedBatchOperation {
        &self.proposal.batch_operations[self.batch_idx]
    }

    pub fn call(&self) -> &DecodedCall {
        &self.batch().calls[self.call_idx]
    }

    pub fn parameter(&self) -> &DecodedParameter {
        match self.slot {
            ParameterSlot::Input => &self.call().inputs[self.parameter_idx],
            ParameterSlot::Output => &self.call().outputs[self.parameter_idx],
        }
    }
}

/// `(analyzer_context, execution_context, dependency_annotation_store)`,
/// generic over which kind of entity is being analyzed. Fully owned so it
/// can be moved into a spawned task.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest<T> {
    pub analyzer_context: T,
    pub execution_context: Arc<ExecutionContext>,
    pub dependency_store: Arc<ScopedAnnotationStore>,
}

#[async_trait::async_trait]
pub trait ProposalAnalyzer: BaseAnalyzer {
    async fn can_analyze(&self, request: &AnalyzeRequest<ProposalContext>) -> bool;
    async fn analyze(&self, request: &AnalyzeRequest<ProposalContext>) -> Result<Vec<Annotation>>;
}

#[async_trait::async_trait]
pub trait BatchOperationAnalyzer: BaseAnalyzer {
    async fn can_analyze(&self, request: &AnalyzeRequest<BatchOperationContext>) -> bool;
    async fn analyze(&self, request: &AnalyzeRequest<BatchOperationContext>) -> Result<Vec<Annotation>>;
}

#[async_trait::async_trait]
pub trait CallAnalyzer: BaseAnalyzer {
    async fn can_analyze(&self, request: &AnalyzeRequest<CallContext>) -> bool;
    async fn analyze(&self, request: &AnalyzeRequest<CallContext>) -> Result<Vec<Annotation>>;
}

#[async_trait::async_trait]
pub trait ParameterAnalyzer: BaseAnalyzer {
    async fn can_analyze(&self, request: &AnalyzeRequest<ParameterContext>) -> bool;
    async fn analyze(&self, request: &AnalyzeRequest<ParameterContext>) -> Result<Vec<Annotation>>;
}

/// Common accessors every analyzer kind exposes.
pub trait BaseAnalyzer: Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// A kind-erased handle to any registered analyzer, for ID-keyed lookup
/// where the caller doesn't (yet) know or care which kind it is.
#[derive(Clone)]
pub enum RegisteredAnalyzer {
    Proposal(Arc<dyn ProposalAnalyzer>),
    BatchOperation(Arc<dyn BatchOperationAnalyzer>),
    Call(Arc<dyn CallAnalyzer>),
    Parameter(Arc<dyn ParameterAnalyzer>),
}

impl RegisteredAnalyzer {
    pub fn id(&self) -> &str {
        match self {
            Self::Proposal(a) => a.id(),
            Self::BatchOperation(a) => a.id(),
            Self::Call(a) => a.id(),
            Self::Parameter(a) => a.id(),
        }
    }

    pub fn kind(&self) -> AnalyzerKind {
        match self {
            Self::Proposal(_) => AnalyzerKind::Proposal,
            Self::BatchOperation(_) => AnalyzerKind::BatchOperation,
            Self::Call(_) => AnalyzerKind::Call,
            Self::Parameter(_) => AnalyzerKind::Parameter,
        }
    }

    pub fn dependencies(&self) -> &[String] {
        match self {
            Self::Proposal(a) => a.dependencies(),
            Self::BatchOperation(a) => a.dependencies(),
            Self::Call(a) => a.dependencies(),
            Self::Parameter(a) => a.dependencies(),
        }
    }
}

impl std::fmt::Debug for RegisteredAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAnalyzer")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}
