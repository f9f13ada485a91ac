//! The proposal decoder boundary (spec §6's `ProposalDecoder`): the one
//! point where the engine hands off to a chain-specific collaborator. No
//! chain decoding logic lives in this workspace — only the trait, the raw
//! input shape, and the run-scoped environment snapshot threaded through to
//! it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::tree::DecodedTimelockProposal;

/// A single raw batch operation as submitted by the caller, before chain
/// decoding. `transactions` is opaque — its shape is entirely chain-family
/// specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatchOperation {
    pub chain_selector: u64,
    pub transactions: serde_json::Value,
}

/// The raw, chain-agnostic governance proposal a caller submits to
/// [`crate::engine::Engine::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelockProposal {
    pub operations: Vec<RawBatchOperation>,
}

/// Snapshot of the chains, data store and environment name a run executes
/// against. `chains` and `data_store` are opaque to the core.
pub struct Environment {
    pub environment_name: String,
    pub chains: Arc<dyn std::any::Any + Send + Sync>,
    pub data_store: Arc<dyn std::any::Any + Send + Sync>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("environment_name", &self.environment_name)
            .finish_non_exhaustive()
    }
}

/// Everything [`crate::engine::Engine::run`] needs besides the raw
/// proposal: which domain is being analyzed, which environment to run
/// against, and chain-family-specific decoder configuration.
#[derive(Debug)]
pub struct RunRequest {
    pub domain: String,
    pub environment: Environment,
    pub decoder_config: serde_json::Value,
}

pub type DecodeError = Box<dyn std::error::Error + Send + Sync>;

/// Decodes a raw, chain-agnostic proposal into the tree the engine
/// traverses. Implementations are chain-family specific and registered by
/// the consumer; none are part of this crate.
#[async_trait]
pub trait ProposalDecoder: Send + Sync {
    async fn decode(
        &self,
        cancel: &CancellationToken,
        environment: &Environment,
        proposal: &TimelockProposal,
    ) -> Result<DecodedTimelockProposal, DecodeError>;
}

/// Builds a [`ProposalDecoder`] from a run's decoder configuration. The
/// engine calls this once per run instead of holding a single decoder,
/// since decoder choice may depend on per-run configuration (e.g. which
/// chain family the proposal targets).
pub type DecoderFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn ProposalDecoder>, DecodeError> + Send + Sync>;
