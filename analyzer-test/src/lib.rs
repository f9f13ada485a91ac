//! Fixtures, a deterministic decoder and a handful of reusable analyzers for
//! integration-testing the proposal analysis engine end to end.

use std::sync::Arc;

use analyzer_core::analyzer::{
    AnalyzeRequest, BaseAnalyzer, CallAnalyzer, CallContext, ParameterAnalyzer, ParameterContext,
};
use analyzer_core::annotation::{Annotation, well_known};
use analyzer_core::decoder::{
    DecodeError, DecoderFactory, Environment, ProposalDecoder, RawBatchOperation, RunRequest,
    TimelockProposal,
};
use analyzer_core::error::Result as EngineResult;
use analyzer_core::tree::{DecodedBatchOperation, DecodedCall, DecodedParameter, DecodedTimelockProposal};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// ── Fixture proposals ───────────────────────────────────────────────────

/// A raw call description as fixtures hand it to [`FixtureDecoder`] through
/// `RawBatchOperation::transactions`.
fn call_json(name: &str, raised: bool) -> serde_json::Value {
    serde_json::json!({
        "to": "0x000000000000000000000000000000000000ab",
        "name": name,
        "contractType": "ERC20",
        "contractVersion": "1.0",
        "inputs": [{
            "name": "amount",
            "type": "uint256",
            "value": if raised { "1000000" } else { "100" },
            "rawValue": if raised { "0xf4240" } else { "0x64" },
        }],
        "outputs": [],
    })
}

/// A single batch on one chain with a single, unremarkable transfer call.
pub fn single_transfer() -> TimelockProposal {
    TimelockProposal {
        operations: vec![RawBatchOperation {
            chain_selector: 1,
            transactions: serde_json::json!([call_json("transfer", false)]),
        }],
    }
}

/// Two batches on two different chains, each with one call — exercises
/// cross-batch independence at every level.
pub fn cross_chain_batch() -> TimelockProposal {
    TimelockProposal {
        operations: vec![
            RawBatchOperation {
                chain_selector: 1,
                transactions: serde_json::json!([call_json("transfer", false)]),
            },
            RawBatchOperation {
                chain_selector: 2,
                transactions: serde_json::json!([call_json("transfer", false)]),
            },
        ],
    }
}

/// One batch with two calls: an ordinary transfer and a privileged
/// `upgradeTo` whose amount parameter was raised well above its raw value —
/// drives severity, risk and diff analyzers at once.
pub fn mixed_risk_batch() -> TimelockProposal {
    TimelockProposal {
        operations: vec![RawBatchOperation {
            chain_selector: 1,
            transactions: serde_json::json!([call_json("transfer", false), call_json("upgradeTo", true)]),
        }],
    }
}

// ── Decoder ─────────────────────────────────────────────────────────────

/// Decodes the `transactions` array fixtures above produce into the tree the
/// engine traverses. Never used outside tests — a real deployment registers
/// a chain-family-specific decoder instead.
#[derive(Debug)]
pub struct FixtureDecoder;

#[async_trait]
impl ProposalDecoder for FixtureDecoder {
    async fn decode(
        &self,
        _cancel: &CancellationToken,
        _environment: &Environment,
        proposal: &TimelockProposal,
    ) -> std::result::Result<DecodedTimelockProposal, DecodeError> {
        let batch_operations = proposal
            .operations
            .iter()
            .map(|op| {
                let calls = op
                    .transactions
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(decode_call)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(DecodedBatchOperation {
                    chain_selector: op.chain_selector,
                    calls,
                })
            })
            .collect::<std::result::Result<Vec<_>, DecodeError>>()?;
        Ok(DecodedTimelockProposal { batch_operations })
    }
}

fn decode_call(raw: serde_json::Value) -> std::result::Result<DecodedCall, DecodeError> {
    let field = |key: &str| -> std::result::Result<String, DecodeError> {
        raw.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| format!("call missing field {key}").into())
    };
    let params = |key: &str| -> std::result::Result<Vec<DecodedParameter>, DecodeError> {
        raw.get(key)
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .map(|p| {
                Ok(DecodedParameter {
                    name: p
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    parameter_type: p
                        .get("type")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    value: p.get("value").cloned().unwrap_or(serde_json::Value::Null),
                    raw_value: p.get("rawValue").cloned().unwrap_or(serde_json::Value::Null),
                })
            })
            .collect()
    };

    Ok(DecodedCall {
        to: field("to")?,
        name: field("name")?,
        contract_type: field("contractType")?,
        contract_version: field("contractVersion")?,
        data: Vec::new(),
        additional_fields: serde_json::json!({}),
        inputs: params("inputs")?,
        outputs: params("outputs")?,
    })
}

/// Builds a [`DecoderFactory`] that always hands back a [`FixtureDecoder`].
pub fn decoder_factory() -> DecoderFactory {
    Arc::new(|_config| Ok(Arc::new(FixtureDecoder) as Arc<dyn ProposalDecoder>))
}

/// A minimal, valid [`RunRequest`] for `domain`.
pub fn fixture_request(domain: &str) -> RunRequest {
    RunRequest {
        domain: domain.to_string(),
        environment: Environment {
            environment_name: "staging".to_string(),
            chains: Arc::new(()),
            data_store: Arc::new(()),
        },
        decoder_config: serde_json::json!({}),
    }
}

// ── Reusable analyzers ───────────────────────────────────────────────────

/// Flags `upgradeTo` calls as `error` severity, everything else as `info`.
#[derive(Debug)]
pub struct SeverityCallAnalyzer;

impl BaseAnalyzer for SeverityCallAnalyzer {
    fn id(&self) -> &str {
        "severity"
    }
    fn dependencies(&self) -> &[String] {
        &[]
    }
}

#[async_trait]
impl CallAnalyzer for SeverityCallAnalyzer {
    async fn can_analyze(&self, _request: &AnalyzeRequest<CallContext>) -> bool {
        true
    }

    async fn analyze(&self, request: &AnalyzeRequest<CallContext>) -> EngineResult<Vec<Annotation>> {
        let severity = if request.analyzer_context.call().name == "upgradeTo" {
            "error"
        } else {
            "info"
        };
        Ok(vec![Annotation::new(
            well_known::SEVERITY,
            "enum",
            serde_json::json!(severity),
        )])
    }
}

/// Call-level analyzer depending on [`SeverityCallAnalyzer`]: escalates to
/// `high` risk once any call has surfaced `error` severity. Declared at the
/// same level as its dependency (rather than a level that runs earlier in
/// canonical order) so the scheduler's same-kind Kahn ordering — not level
/// ordering — is what guarantees severity has already run.
#[derive(Debug)]
pub struct RiskCallAnalyzer;

impl BaseAnalyzer for RiskCallAnalyzer {
    fn id(&self) -> &str {
        "risk"
    }
    fn dependencies(&self) -> &[String] {
        static DEPS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        DEPS.get_or_init(|| vec!["severity".to_string()])
    }
}

#[async_trait]
impl CallAnalyzer for RiskCallAnalyzer {
    async fn can_analyze(&self, _request: &AnalyzeRequest<CallContext>) -> bool {
        true
    }

    async fn analyze(&self, request: &AnalyzeRequest<CallContext>) -> EngineResult<Vec<Annotation>> {
        let has_error = request
            .dependency_store
            .filter(&[analyzer_core::store::by_name(well_known::SEVERITY)])
            .iter()
            .any(|a| a.value == serde_json::json!("error"));
        let risk = if has_error { "high" } else { "low" };
        Ok(vec![Annotation::new(well_known::RISK, "enum", serde_json::json!(risk))])
    }
}

/// Parameter-level analyzer: emits a `cld.diff` whenever `value` and
/// `rawValue` disagree, modelling a decoded/raw mismatch worth flagging.
#[derive(Debug)]
pub struct DiffParameterAnalyzer;

impl BaseAnalyzer for DiffParameterAnalyzer {
    fn id(&self) -> &str {
        "diff"
    }
    fn dependencies(&self) -> &[String] {
        &[]
    }
}

#[async_trait]
impl ParameterAnalyzer for DiffParameterAnalyzer {
    async fn can_analyze(&self, request: &AnalyzeRequest<ParameterContext>) -> bool {
        let p = request.analyzer_context.parameter();
        p.value != p.raw_value
    }

    async fn analyze(&self, request: &AnalyzeRequest<ParameterContext>) -> EngineResult<Vec<Annotation>> {
        let p = request.analyzer_context.parameter();
        let diff = analyzer_core::annotation::Diff {
            field: p.name.clone(),
            old_value: p.raw_value.clone(),
            new_value: p.value.clone(),
            value_type: p.parameter_type.clone(),
        };
        Ok(vec![Annotation::new(
            well_known::DIFF,
            "diff",
            serde_json::to_value(diff).expect("Diff serializes"),
        )])
    }
}

/// Always errors — used to exercise the skip-on-dependency-failure path.
#[derive(Debug)]
pub struct AlwaysFailsCallAnalyzer;

impl BaseAnalyzer for AlwaysFailsCallAnalyzer {
    fn id(&self) -> &str {
        "always-fails"
    }
    fn dependencies(&self) -> &[String] {
        &[]
    }
}

#[async_trait]
impl CallAnalyzer for AlwaysFailsCallAnalyzer {
    async fn can_analyze(&self, _request: &AnalyzeRequest<CallContext>) -> bool {
        true
    }

    async fn analyze(&self, _request: &AnalyzeRequest<CallContext>) -> EngineResult<Vec<Annotation>> {
        Err(analyzer_core::error::EngineError::Validation("boom".to_string()))
    }
}

/// Depends on [`AlwaysFailsCallAnalyzer`]; should never actually run.
#[derive(Debug)]
pub struct DependsOnFailingAnalyzer;

impl BaseAnalyzer for DependsOnFailingAnalyzer {
    fn id(&self) -> &str {
        "depends-on-failing"
    }
    fn dependencies(&self) -> &[String] {
        static DEPS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
        DEPS.get_or_init(|| vec!["always-fails".to_string()])
    }
}

#[async_trait]
impl CallAnalyzer for DependsOnFailingAnalyzer {
    async fn can_analyze(&self, _request: &AnalyzeRequest<CallContext>) -> bool {
        true
    }

    async fn analyze(&self, _request: &AnalyzeRequest<CallContext>) -> EngineResult<Vec<Annotation>> {
        Ok(vec![Annotation::new("cld.should-not-run", "marker", serde_json::json!(true))])
    }
}

/// An independent call analyzer with no relation to the failing pair, used
/// to confirm that one analyzer's failure never aborts its unrelated peers.
#[derive(Debug)]
pub struct IndependentCallAnalyzer;

impl BaseAnalyzer for IndependentCallAnalyzer {
    fn id(&self) -> &str {
        "independent"
    }
    fn dependencies(&self) -> &[String] {
        &[]
    }
}

#[async_trait]
impl CallAnalyzer for IndependentCallAnalyzer {
    async fn can_analyze(&self, _request: &AnalyzeRequest<CallContext>) -> bool {
        true
    }

    async fn analyze(&self, _request: &AnalyzeRequest<CallContext>) -> EngineResult<Vec<Annotation>> {
        Ok(vec![Annotation::new("cld.ran", "marker", serde_json::json!(true))])
    }
}
