//! Decoded and analyzed proposal trees, and the compact handles used to
//! address an entity anywhere in that tree without a pointer graph.
//!
//! The decoded tree is produced once by a [`crate::decoder::ProposalDecoder`]
//! and never mutated. The analyzed tree mirrors its shape exactly and adds
//! an append-only, independently-guarded annotation list to every node.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, AnnotationLevel};

// ── Decoded tree (immutable, produced by the decoder) ──────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedTimelockProposal {
    pub batch_operations: Vec<DecodedBatchOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedBatchOperation {
    pub chain_selector: u64,
    pub calls: Vec<DecodedCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedCall {
    pub to: String,
    pub name: String,
    pub contract_type: String,
    pub contract_version: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub additional_fields: serde_json::Value,
    pub inputs: Vec<DecodedParameter>,
    pub outputs: Vec<DecodedParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedParameter {
    pub name: String,
    pub parameter_type: String,
    pub value: serde_json::Value,
    pub raw_value: serde_json::Value,
}

// ── Compact entity handles ──────────────────────────────────────────────

/// Which list a parameter handle addresses within a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterSlot {
    Input,
    Output,
}

/// A compact address for any entity in the tree, used instead of a pointer
/// graph so the per-level annotation accumulator and the analyzed tree can
/// both be indexed cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub level: AnnotationLevel,
    pub batch_idx: usize,
    pub call_idx: Option<usize>,
    pub parameter: Option<(ParameterSlot, usize)>,
}

impl EntityHandle {
    pub fn proposal() -> Self {
        Self {
            level: AnnotationLevel::Proposal,
            batch_idx: 0,
            call_idx: None,
            parameter: None,
        }
    }

    pub fn batch(batch_idx: usize) -> Self {
        Self {
            level: AnnotationLevel::BatchOperation,
            batch_idx,
            call_idx: None,
            parameter: None,
        }
    }

    pub fn call(batch_idx: usize, call_idx: usize) -> Self {
        Self {
            level: AnnotationLevel::Call,
            batch_idx,
            call_idx: Some(call_idx),
            parameter: None,
        }
    }

    pub fn parameter(batch_idx: usize, call_idx: usize, slot: ParameterSlot, param_idx: usize) -> Self {
        Self {
            level: AnnotationLevel::Parameter,
            batch_idx,
            call_idx: Some(call_idx),
            parameter: Some((slot, param_idx)),
        }
    }
}

// ── Analyzed tree (mirrors the decoded tree, adds annotations) ─────────

#[derive(Debug, Default)]
pub struct AnnotationList(Mutex<Vec<Annotation>>);

impl AnnotationList {
    pub fn append(&self, annotations: impl IntoIterator<Item = Annotation>) {
        let mut guard = self.0.lock().expect("annotation list poisoned");
        guard.extend(annotations);
    }

    pub fn snapshot(&self) -> Vec<Annotation> {
        self.0.lock().expect("annotation list poisoned").clone()
    }
}

#[derive(Debug)]
pub struct AnalyzedProposal {
    pub annotations: AnnotationList,
    pub batch_operations: Vec<AnalyzedBatchOperation>,
}

#[derive(Debug)]
pub struct AnalyzedBatchOperation {
    pub chain_selector: u64,
    pub annotations: AnnotationList,
    pub calls: Vec<AnalyzedCall>,
}

#[derive(Debug)]
pub struct AnalyzedCall {
    pub to: String,
    pub name: String,
    pub contract_type: String,
    pub contract_version: String,
    pub data: Vec<u8>,
    pub additional_fields: serde_json::Value,
    pub annotations: AnnotationList,
    pub inputs: Vec<AnalyzedParameter>,
    pub outputs: Vec<AnalyzedParameter>,
}

#[derive(Debug)]
pub struct AnalyzedParameter {
    pub name: String,
    pub parameter_type: String,
    pub value: serde_json::Value,
    pub raw_value: serde_json::Value,
    pub annotations: AnnotationList,
}

impl AnalyzedProposal {
    /// Mirror a decoded tree: same shape, every node starts with an empty
    /// annotation list.
    pub fn mirror(decoded: &DecodedTimelockProposal) -> Self {
        Self {
            annotations: AnnotationList::default(),
            batch_operations: decoded
                .batch_operations
                .iter()
                .map(AnalyzedBatchOperation::mirror)
                .collect(),
        }
    }

    /// Resolve the annotation list addressed by `handle`.
    pub fn annotations_at(&self, handle: EntityHandle) -> Option<&AnnotationList> {
        match handle.level {
            AnnotationLevel::Proposal => Some(&self.annotations),
            AnnotationLevel::BatchOperation => {
                self.batch_operations.get(handle.batch_idx).map(|b| &b.annotations)
            }
            AnnotationLevel::Call => {
                let batch = self.batch_operations.get(handle.batch_idx)?;
                let call = batch.calls.get(handle.call_idx?)?;
                Some(&call.annotations)
            }
            AnnotationLevel::Parameter => {
                let batch = self.batch_operations.get(handle.batch_idx)?;
                let call = batch.calls.get(handle.call_idx?)?;
                let (slot, idx) = handle.parameter?;
                let list = match slot {
                    ParameterSlot::Input => call.inputs.get(idx)?,
                    ParameterSlot::Output => call.outputs.get(idx)?,
                };
                Some(&list.annotations)
            }
        }
    }

    /// Enumerate every entity handle at `level`, by in-order tree traversal.
    pub fn handles_at(&self, level: AnnotationLevel) -> Vec<EntityHandle> {
        match level {
            AnnotationLevel::Proposal => vec![EntityHandle::proposal()],
            AnnotationLevel::BatchOperation => {
                (0..self.batch_operations.len()).map(EntityHandle::batch).collect()
            }
            AnnotationLevel::Call => self
                .batch_operations
                .iter()
                .enumerate()
                .flat_map(|(bi, b)| (0..b.calls.len()).map(move |ci| EntityHandle::call(bi, ci)))
                .collect(),
            AnnotationLevel::Parameter => self
                .batch_operations
                .iter()
                .enumerate()
                .flat_map(|(bi, b)| {
                    b.calls.iter().enumerate().flat_map(move |(ci, c)| {
                        let inputs = (0..c.inputs.len())
                            .map(move |pi| EntityHandle::parameter(bi, ci, ParameterSlot::Input, pi));
                        let outputs = (0..c.outputs.len())
                            .map(move |pi| EntityHandle::parameter(bi, ci, ParameterSlot::Output, pi));
                        inputs.chain(outputs)
                    })
                })
                .collect(),
        }
    }
}

impl AnalyzedBatchOperation {
    fn mirror(decoded: &DecodedBatchOperation) -> Self {
        Self {
            chain_selector: decoded.chain_selector,
            annotations: AnnotationList::default(),
            calls: decoded.calls.iter().map(AnalyzedCall::mirror).collect(),
        }
    }
}

impl AnalyzedCall {
    fn mirror(decoded: &DecodedCall) -> Self {
        Self {
            to: decoded.to.clone(),
            name: decoded.name.clone(),
            contract_type: decoded.contract_type.clone(),
            contract_version: decoded.contract_version.clone(),
            data: decoded.data.clone(),
            additional_fields: decoded.additional_fields.clone(),
            annotations: AnnotationList::default(),
            inputs: decoded.inputs.iter().map(AnalyzedParameter::mirror).collect(),
            outputs: decoded.outputs.iter().map(AnalyzedParameter::mirror).collect(),
        }
    }
}

impl AnalyzedParameter {
    fn mirror(decoded: &DecodedParameter) -> Self {
        Self {
            name: decoded.name.clone(),
            parameter_type: decoded.parameter_type.clone(),
            value: decoded.value.clone(),
            raw_value: decoded.raw_value.clone(),
            annotations: AnnotationList::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DecodedTimelockProposal {
        DecodedTimelockProposal {
            batch_operations: vec![DecodedBatchOperation {
                chain_selector: 1,
                calls: vec![DecodedCall {
                    to: "0xabc".into(),
                    name: "transfer".into(),
                    contract_type: "ERC20".into(),
                    contract_version: "1.0".into(),
                    data: vec![1, 2, 3],
                    additional_fields: serde_json::json!({}),
                    inputs: vec![DecodedParameter {
                        name: "amount".into(),
                        parameter_type: "uint256".into(),
                        value: serde_json::json!("100"),
                        raw_value: serde_json::json!("0x64"),
                    }],
                    outputs: vec![],
                }],
            }],
        }
    }

    #[test]
    fn mirror_is_isomorphic_with_empty_annotations() {
        let decoded = sample();
        let analyzed = AnalyzedProposal::mirror(&decoded);
        assert_eq!(analyzed.batch_operations.len(), 1);
        assert_eq!(analyzed.batch_operations[0].calls.len(), 1);
        assert_eq!(analyzed.batch_operations[0].calls[0].inputs.len(), 1);
        assert!(analyzed.annotations.snapshot().is_empty());
        assert!(
            analyzed.batch_operations[0].calls[0]
                .annotations
                .snapshot()
                .is_empty()
        );
    }

    #[test]
    fn handles_enumerate_every_entity_at_each_level() {
        let analyzed = AnalyzedProposal::mirror(&sample());
        assert_eq!(analyzed.handles_at(AnnotationLevel::Proposal).len(), 1);
        assert_eq!(analyzed.handles_at(AnnotationLevel::BatchOperation).len(), 1);
        assert_eq!(analyzed.handles_at(AnnotationLevel::Call).len(), 1);
        assert_eq!(analyzed.handles_at(AnnotationLevel::Parameter).len(), 1);
    }

    #[test]
    fn annotations_append_in_order() {
        let analyzed = AnalyzedProposal::mirror(&sample());
        let list = analyzed.annotations_at(EntityHandle::proposal()).unwrap();
        list.append([Annotation::new("a", "t", serde_json::json!(1))]);
        list.append([Annotation::new("b", "t", serde_json::json!(2))]);
        let snapshot = list.snapshot();
        assert_eq!(snapshot[0].name, "a");
        assert_eq!(snapshot[1].name, "b");
    }
}
