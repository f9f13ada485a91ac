//! Analyzer registry (component C): one typed collection per analyzer
//! kind, plus an ID-keyed map for kind-agnostic lookup.
//!
//! `register_*` takes `&mut self`, so Rust's borrow checker — not a runtime
//! mutex — is what serializes registration; once a registry is built it's
//! read through `&self` only and every accessor is lock-free.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzer::{
    BatchOperationAnalyzer, CallAnalyzer, ParameterAnalyzer, ProposalAnalyzer, RegisteredAnalyzer,
};
use crate::error::RegistrationError;

#[derive(Default)]
pub struct AnalyzerRegistry {
    proposal: Vec<Arc<dyn ProposalAnalyzer>>,
    batch_operation: Vec<Arc<dyn BatchOperationAnalyzer>>,
    call: Vec<Arc<dyn CallAnalyzer>>,
    parameter: Vec<Arc<dyn ParameterAnalyzer>>,
    by_id: HashMap<String, RegisteredAnalyzer>,
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("ids", &{
                let mut ids: Vec<&str> = self.by_id.keys().map(String::as_str).collect();
                ids.sort_unstable();
                ids
            })
            .finish()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve_id(&mut self, id: &str) -> Result<(), RegistrationError> {
        if id.is_empty() {
            return Err(RegistrationError::EmptyId);
        }
        if self.by_id.contains_key(id) {
            return Err(RegistrationError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    pub fn register_proposal(
        &mut self,
        analyzer: Arc<dyn ProposalAnalyzer>,
    ) -> Result<(), RegistrationError> {
        self.reserve_id(analyzer.id())?;
        self.by_id
            .insert(analyzer.id().to_string(), RegisteredAnalyzer::Proposal(analyzer.clone()));
        self.proposal.push(analyzer);
        Ok(())
    }

    pub fn register_batch_operation(
        &mut self,
        analyzer: Arc<dyn BatchOperationAnalyzer>,
    ) -> Result<(), RegistrationError> {
        self.reserve_id(analyzer.id())?;
        self.by_id.insert(
            analyzer.id().to_string(),
            RegisteredAnalyzer::BatchOperation(analyzer.clone()),
        );
        self.batch_operation.push(analyzer);
        Ok(())
    }

    pub fn register_call(&mut self, analyzer: Arc<dyn CallAnalyzer>) -> Result<(), RegistrationError> {
        self.reserve_id(analyzer.id())?;
        self.by_id
            .insert(analyzer.id().to_string(), RegisteredAnalyzer::Call(analyzer.clone()));
        self.call.push(analyzer);
        Ok(())
    }

    pub fn register_parameter(
        &mut self,
        analyzer: Arc<dyn ParameterAnalyzer>,
    ) -> Result<(), RegistrationError> {
        self.reserve_id(analyzer.id())?;
        self.by_id.insert(
            analyzer.id().to_string(),
            RegisteredAnalyzer::Parameter(analyzer.clone()),
        );
        self.parameter.push(analyzer);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredAnalyzer> {
        self.by_id.get(id)
    }

    pub fn proposal_analyzers(&self) -> &[Arc<dyn ProposalAnalyzer>] {
        &self.proposal
    }

    pub fn batch_operation_analyzers(&self) -> &[Arc<dyn BatchOperationAnalyzer>] {
        &self.batch_operation
    }

    pub fn call_analyzers(&self) -> &[Arc<dyn CallAnalyzer>] {
        &self.call
    }

    pub fn parameter_analyzers(&self) -> &[Arc<dyn ParameterAnalyzer>] {
        &self.parameter
    }

    /// Every registered analyzer, sorted by ID — deterministic regardless of
    /// registration order.
    pub fn all(&self) -> Vec<&RegisteredAnalyzer> {
        let mut all: Vec<&RegisteredAnalyzer> = self.by_id.values().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }
}
