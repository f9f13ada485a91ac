//! Analysis engine (component E): decode → mirror → four-level analyzer
//! traversal → render dispatch.
//!
//! One [`analyzer_graph::DependencyGraph`] is built per level per run (an
//! analyzer's dependencies are checked only against analyzers of the *same*
//! kind for scheduling purposes; the annotations it reads may come from any
//! level, since [`crate::store::ScopedAnnotationStore`] is keyed by analyzer
//! ID, not level). Every analyzer invocation races a `tokio::time::timeout`
//! against a task spawned specifically for that invocation, so a misbehaving
//! `CanAnalyze`/`Analyze` that never yields is aborted rather than blocking
//! the run.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use analyzer_graph::{DependencyGraph, DependencyNode};

use crate::analyzer::{
    AnalyzeRequest, BatchOperationAnalyzer, BatchOperationContext, CallAnalyzer, CallContext,
    ExecutionContext, ParameterAnalyzer, ParameterContext, ProposalAnalyzer, ProposalContext,
    RegisteredAnalyzer,
};
use crate::annotation::{Annotation, AnnotationLevel};
use crate::decoder::{DecoderFactory, RunRequest, TimelockProposal};
use crate::error::{EngineError, RenderError, Result, RunErrors};
use crate::registry::AnalyzerRegistry;
use crate::render::{RenderRequest, Renderer};
use crate::store::ScopedAnnotationStore;
use crate::tree::{AnalyzedProposal, DecodedTimelockProposal, EntityHandle};

/// Run-wide tunables. `analyzer_timeout` bounds a single `CanAnalyze` or
/// `Analyze` call; it is not a budget for the whole run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub analyzer_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            analyzer_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&crate::config::EngineConfig> for EngineOptions {
    fn from(config: &crate::config::EngineConfig) -> Self {
        Self {
            analyzer_timeout: config.engine.analyzer_timeout,
        }
    }
}

/// The outcome of a run: the analyzed tree plus, if anything failed, the
/// union of every recorded error. A non-empty `errors` does not mean
/// `analyzed` is unusable — partial results from levels and analyzers that
/// succeeded remain valid and may be rendered.
#[derive(Debug)]
pub struct RunOutcome {
    pub analyzed: Arc<AnalyzedProposal>,
    pub errors: Option<RunErrors>,
}

/// Ties together the registry, decoder factory and renderers into the
/// runnable engine.
pub struct Engine {
    registry: AnalyzerRegistry,
    renderers: HashMap<String, Arc<dyn Renderer>>,
    decoder_factory: DecoderFactory,
    options: EngineOptions,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("renderer_ids", &{
                let mut ids: Vec<&str> = self.renderers.keys().map(String::as_str).collect();
                ids.sort_unstable();
                ids
            })
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(decoder_factory: DecoderFactory) -> Self {
        Self::with_options(decoder_factory, EngineOptions::default())
    }

    pub fn with_options(decoder_factory: DecoderFactory, options: EngineOptions) -> Self {
        Self {
            registry: AnalyzerRegistry::new(),
            renderers: HashMap::new(),
            decoder_factory,
            options,
        }
    }

    pub fn registry_mut(&mut self) -> &mut AnalyzerRegistry {
        &mut self.registry
    }

    pub fn register_renderer(&mut self, renderer: Arc<dyn Renderer>) -> Result<()> {
        let id = renderer.id().to_string();
        if self.renderers.contains_key(&id) {
            return Err(RenderError::DuplicateId(id).into());
        }
        self.renderers.insert(id, renderer);
        Ok(())
    }

    pub fn render_to(
        &self,
        writer: &mut dyn std::io::Write,
        renderer_id: &str,
        request: &RenderRequest,
        analyzed: &AnalyzedProposal,
    ) -> Result<()> {
        let renderer = self
            .renderers
            .get(renderer_id)
            .ok_or_else(|| RenderError::Unknown(renderer_id.to_string()))?;
        renderer.render_to(writer, request, analyzed)?;
        Ok(())
    }

    /// Step 1-5 of the run algorithm: validate, decode, mirror, traverse
    /// every level, return the analyzed tree and any accumulated errors.
    #[instrument(skip_all, fields(domain = %request.domain))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        request: &RunRequest,
        proposal: &TimelockProposal,
    ) -> Result<RunOutcome> {
        if request.domain.is_empty() {
            return Err(EngineError::Validation("domain must not be empty".to_string()));
        }
        self.validate_dependencies()?;

        let decoder = (self.decoder_factory)(&request.decoder_config)
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        let decoded = decoder
            .decode(cancel, &request.environment, proposal)
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        let analyzed = Arc::new(AnalyzedProposal::mirror(&decoded));
        let decoded = Arc::new(decoded);
        let execution_context = Arc::new(ExecutionContext {
            domain: request.domain.clone(),
            environment_name: request.environment.environment_name.clone(),
            chains: request.environment.chains.clone(),
            data_store: request.environment.data_store.clone(),
        });
        let accumulator: Arc<RwLock<HashMap<AnnotationLevel, Vec<Annotation>>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let mut run_errors: Vec<String> = Vec::new();

        for level in AnnotationLevel::CANONICAL_ORDER {
            if cancel.is_cancelled() {
                run_errors.push("context cancelled".to_string());
                break;
            }

            let registered = self.analyzers_at(level);
            // An analyzer's declared dependencies may name analyzers of any
            // kind (the scoped store resolves those across the whole
            // accumulator), but the scheduler for this level only orders
            // analyzers *of this level's kind* against each other — a
            // dependency on an earlier-level analyzer is already guaranteed
            // satisfied by canonical level ordering, so it is dropped here
            // rather than rejected as unknown.
            let level_ids: std::collections::HashSet<&str> =
                registered.iter().map(RegisteredAnalyzer::id).collect();
            let nodes: Vec<DependencyNode> = registered
                .iter()
                .map(|a| {
                    let same_level_deps: Vec<String> = a
                        .dependencies()
                        .iter()
                        .filter(|d| level_ids.contains(d.as_str()))
                        .cloned()
                        .collect();
                    DependencyNode::new(a.id().to_string(), same_level_deps)
                })
                .collect();
            let graph = DependencyGraph::build(&nodes)?;

            let by_id: Arc<HashMap<String, RegisteredAnalyzer>> = Arc::new(
                registered
                    .into_iter()
                    .map(|a| (a.id().to_string(), a))
                    .collect(),
            );
            let handles: Arc<Vec<EntityHandle>> = Arc::new(analyzed.handles_at(level));

            let analyzed_level = analyzed.clone();
            let decoded_level = decoded.clone();
            let accumulator_level = accumulator.clone();
            let execution_context_level = execution_context.clone();
            let timeout = self.options.analyzer_timeout;

            let outcome = graph
                .run(cancel, move |id| {
                    let by_id = by_id.clone();
                    let handles = handles.clone();
                    let analyzed = analyzed_level.clone();
                    let decoded = decoded_level.clone();
                    let accumulator = accumulator_level.clone();
                    let execution_context = execution_context_level.clone();
                    async move {
                        run_analyzer_over_entities(
                            &id,
                            level,
                            &by_id,
                            &handles,
                            &analyzed,
                            &decoded,
                            &accumulator,
                            &execution_context,
                            timeout,
                        )
                        .await
                    }
                })
                .await;

            if let Err(level_errors) = outcome {
                run_errors.extend(level_errors.messages().iter().cloned());
            }
        }

        Ok(RunOutcome {
            analyzed,
            errors: if run_errors.is_empty() {
                None
            } else {
                Some(RunErrors(run_errors))
            },
        })
    }

    /// Invariant 2 (spec.md §3): every declared dependency ID must name a
    /// registered analyzer, no analyzer may depend on itself. Checked across
    /// the *whole* registry, since a dependency may legitimately point at an
    /// analyzer of an earlier level.
    fn validate_dependencies(&self) -> Result<()> {
        for analyzer in self.registry.all() {
            for dep in analyzer.dependencies() {
                if dep.is_empty() {
                    return Err(analyzer_graph::GraphError::EmptyId.into());
                }
                if dep == analyzer.id() {
                    return Err(analyzer_graph::GraphError::SelfDependency(analyzer.id().to_string()).into());
                }
                if self.registry.get(dep).is_none() {
                    return Err(analyzer_graph::GraphError::UnknownDependency {
                        analyzer: analyzer.id().to_string(),
                        dependency: dep.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn analyzers_at(&self, level: AnnotationLevel) -> Vec<RegisteredAnalyzer> {
        match level {
            AnnotationLevel::Proposal => self
                .registry
                .proposal_analyzers()
                .iter()
                .map(|a| RegisteredAnalyzer::Proposal(a.clone()))
                .collect(),
            AnnotationLevel::BatchOperation => self
                .registry
                .batch_operation_analyzers()
                .iter()
                .map(|a| RegisteredAnalyzer::BatchOperation(a.clone()))
                .collect(),
            AnnotationLevel::Call => self
                .registry
                .call_analyzers()
                .iter()
                .map(|a| RegisteredAnalyzer::Call(a.clone()))
                .collect(),
            AnnotationLevel::Parameter => self
                .registry
                .parameter_analyzers()
                .iter()
                .map(|a| RegisteredAnalyzer::Parameter(a.clone()))
                .collect(),
        }
    }
}

/// `run_fn` body handed to the scheduler: invoke one analyzer, by ID, over
/// every entity at `level`. A failure on any single entity fails the whole
/// analyzer for scheduling purposes (its dependents are skipped), but
/// entities processed before the failure keep their annotations.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(analyzer = %id, ?level))]
async fn run_analyzer_over_entities(
    id: &str,
    level: AnnotationLevel,
    by_id: &HashMap<String, RegisteredAnalyzer>,
    handles: &[EntityHandle],
    analyzed: &Arc<AnalyzedProposal>,
    decoded: &Arc<DecodedTimelockProposal>,
    accumulator: &Arc<RwLock<HashMap<AnnotationLevel, Vec<Annotation>>>>,
    execution_context: &Arc<ExecutionContext>,
    timeout: Duration,
) -> std::result::Result<(), String> {
    let registered = by_id
        .get(id)
        .expect("id was produced from this level's own registry snapshot");
    let dependencies = registered.dependencies().to_vec();

    let mut entity_errors = Vec::new();

    let store = {
        let guard = accumulator.read().expect("accumulator lock poisoned");
        Arc::new(ScopedAnnotationStore::new(&dependencies, &guard))
    };

    for handle in handles.iter().copied() {
        let outcome = invoke_for_handle(
            registered,
            decoded.clone(),
            handle,
            execution_context.clone(),
            store.clone(),
            timeout,
        )
        .await;

        match outcome {
            Ok(None) => {}
            Ok(Some(annotations)) => {
                let stamped: Vec<Annotation> = annotations
                    .into_iter()
                    .map(|a| a.with_analyzer(id.to_string()))
                    .collect();
                if let Some(list) = analyzed.annotations_at(handle) {
                    list.append(stamped.iter().cloned());
                }
                accumulator
                    .write()
                    .expect("accumulator lock poisoned")
                    .entry(level)
                    .or_default()
                    .extend(stamped);
            }
            Err(cause) => entity_errors.push(format!("{handle:?}: {cause}")),
        }
    }

    if entity_errors.is_empty() {
        Ok(())
    } else {
        Err(entity_errors.join("; "))
    }
}

async fn invoke_for_handle(
    registered: &RegisteredAnalyzer,
    proposal: Arc<DecodedTimelockProposal>,
    handle: EntityHandle,
    execution_context: Arc<ExecutionContext>,
    store: Arc<ScopedAnnotationStore>,
    timeout: Duration,
) -> std::result::Result<Option<Vec<Annotation>>, String> {
    match registered {
        RegisteredAnalyzer::Proposal(a) => {
            invoke(a.clone(), ProposalContext { proposal }, execution_context, store, timeout).await
        }
        RegisteredAnalyzer::BatchOperation(a) => {
            let context = BatchOperationContext {
                proposal,
                batch_idx: handle.batch_idx,
            };
            invoke(a.clone(), context, execution_context, store, timeout).await
        }
        RegisteredAnalyzer::Call(a) => {
            let context = CallContext {
                proposal,
                batch_idx: handle.batch_idx,
                call_idx: handle.call_idx.expect("call handle carries call_idx"),
            };
            invoke(a.clone(), context, execution_context, store, timeout).await
        }
        RegisteredAnalyzer::Parameter(a) => {
            let (slot, parameter_idx) = handle.parameter.expect("parameter handle carries slot+idx");
            let context = ParameterContext {
                proposal,
                batch_idx: handle.batch_idx,
                call_idx: handle.call_idx.expect("parameter handle carries call_idx"),
                slot,
                parameter_idx,
            };
            invoke(a.clone(), context, execution_context, store, timeout).await
        }
    }
}

/// Unifies the four analyzer traits for dispatch: each `Arc<dyn *Analyzer>`
/// implements this for its one context type below.
#[async_trait]
trait Invocable<C>: Send + Sync {
    async fn can_analyze(&self, request: &AnalyzeRequest<C>) -> bool;
    async fn analyze(&self, request: &AnalyzeRequest<C>) -> crate::error::Result<Vec<Annotation>>;
}

#[async_trait]
impl Invocable<ProposalContext> for Arc<dyn ProposalAnalyzer> {
    async fn can_analyze(&self, request: &AnalyzeRequest<ProposalContext>) -> bool {
        ProposalAnalyzer::can_analyze(self.as_ref(), request).await
    }
    async fn analyze(&self, request: &AnalyzeRequest<ProposalContext>) -> crate::error::Result<Vec<Annotation>> {
        ProposalAnalyzer::analyze(self.as_ref(), request).await
    }
}

#[async_trait]
impl Invocable<BatchOperationContext> for Arc<dyn BatchOperationAnalyzer> {
    async fn can_analyze(&self, request: &AnalyzeRequest<BatchOperationContext>) -> bool {
        BatchOperationAnalyzer::can_analyze(self.as_ref(), request).await
    }
    async fn analyze(
        &self,
        request: &AnalyzeRequest<BatchOperationContext>,
    ) -> crate::error::Result<Vec<Annotation>> {
        BatchOperationAnalyzer::analyze(self.as_ref(), request).await
    }
}

#[async_trait]
impl Invocable<CallContext> for Arc<dyn CallAnalyzer> {
    async fn can_analyze(&self, request: &AnalyzeRequest<CallContext>) -> bool {
        CallAnalyzer::can_analyze(self.as_ref(), request).await
    }
    async fn analyze(&self, request: &AnalyzeRequest<CallContext>) -> crate::error::Result<Vec<Annotation>> {
        CallAnalyzer::analyze(self.as_ref(), request).await
    }
}

#[async_trait]
impl Invocable<ParameterContext> for Arc<dyn ParameterAnalyzer> {
    async fn can_analyze(&self, request: &AnalyzeRequest<ParameterContext>) -> bool {
        ParameterAnalyzer::can_analyze(self.as_ref(), request).await
    }
    async fn analyze(&self, request: &AnalyzeRequest<ParameterContext>) -> crate::error::Result<Vec<Annotation>> {
        ParameterAnalyzer::analyze(self.as_ref(), request).await
    }
}

async fn invoke<C, A>(
    analyzer: A,
    context: C,
    execution_context: Arc<ExecutionContext>,
    store: Arc<ScopedAnnotationStore>,
    timeout: Duration,
) -> std::result::Result<Option<Vec<Annotation>>, String>
where
    C: Clone + Send + 'static,
    A: Invocable<C> + Clone + Send + Sync + 'static,
{
    let request = AnalyzeRequest {
        analyzer_context: context,
        execution_context,
        dependency_store: store,
    };

    let can_analyze = {
        let analyzer = analyzer.clone();
        let request = request.clone();
        spawn_with_timeout(timeout, async move { analyzer.can_analyze(&request).await }).await?
    };
    if !can_analyze {
        return Ok(None);
    }

    let annotations = spawn_with_timeout(timeout, async move { analyzer.analyze(&request).await })
        .await?
        .map_err(|e| e.to_string())?;
    Ok(Some(annotations))
}

/// Races `fut` against `timeout` on its own spawned task so a future that
/// never yields is aborted rather than stalling the caller.
async fn spawn_with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = T> + Send + 'static,
) -> std::result::Result<T, String>
where
    T: Send + 'static,
{
    let mut handle = tokio::spawn(fut);
    tokio::select! {
        joined = &mut handle => joined.map_err(|e| format!("analyzer task panicked: {e}")),
        () = tokio::time::sleep(timeout) => {
            handle.abort();
            Err(format!("analyzer invocation exceeded {timeout:?} deadline"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::well_known;
    use crate::decoder::{DecodeError, Environment, ProposalDecoder, RawBatchOperation};
    use crate::tree::{DecodedBatchOperation, DecodedCall, DecodedParameter};
    use async_trait::async_trait as async_trait_attr;

    struct FixtureDecoder;

    #[async_trait_attr]
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
                .map(|op| DecodedBatchOperation {
                    chain_selector: op.chain_selector,
                    calls: vec![DecodedCall {
                        to: "0xabc".into(),
                        name: "transfer".into(),
                        contract_type: "ERC20".into(),
                        contract_version: "1.0".into(),
                        data: vec![],
                        additional_fields: serde_json::json!({}),
                        inputs: vec![DecodedParameter {
                            name: "amount".into(),
                            parameter_type: "uint256".into(),
                            value: serde_json::json!("100"),
                            raw_value: serde_json::json!("0x64"),
                        }],
                        outputs: vec![],
                    }],
                })
                .collect();
            Ok(DecodedTimelockProposal { batch_operations })
        }
    }

    struct SeverityCallAnalyzer;

    impl crate::analyzer::BaseAnalyzer for SeverityCallAnalyzer {
        fn id(&self) -> &str {
            "severity"
        }
        fn dependencies(&self) -> &[String] {
            &[]
        }
    }

    #[async_trait_attr]
    impl CallAnalyzer for SeverityCallAnalyzer {
        async fn can_analyze(&self, _request: &AnalyzeRequest<CallContext>) -> bool {
            true
        }
        async fn analyze(&self, _request: &AnalyzeRequest<CallContext>) -> crate::error::Result<Vec<Annotation>> {
            Ok(vec![Annotation::new(
                well_known::SEVERITY,
                "enum",
                serde_json::json!("warning"),
            )])
        }
    }

    struct SeverityReadingParameterAnalyzer;

    impl crate::analyzer::BaseAnalyzer for SeverityReadingParameterAnalyzer {
        fn id(&self) -> &str {
            "severity-reader"
        }
        fn dependencies(&self) -> &[String] {
            static DEPS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
            DEPS.get_or_init(|| vec!["severity".to_string()])
        }
    }

    #[async_trait_attr]
    impl ParameterAnalyzer for SeverityReadingParameterAnalyzer {
        async fn can_analyze(&self, _request: &AnalyzeRequest<ParameterContext>) -> bool {
            true
        }
        async fn analyze(
            &self,
            request: &AnalyzeRequest<ParameterContext>,
        ) -> crate::error::Result<Vec<Annotation>> {
            let count = request
                .dependency_store
                .filter(&[crate::store::by_analyzer("severity")])
                .len();
            Ok(vec![Annotation::new(
                "cld.observed-severity-count",
                "number",
                serde_json::json!(count),
            )])
        }
    }

    fn decoder_factory() -> DecoderFactory {
        Arc::new(|_config| Ok(Arc::new(FixtureDecoder) as Arc<dyn ProposalDecoder>))
    }

    fn fixture_request() -> RunRequest {
        RunRequest {
            domain: "cre".to_string(),
            environment: Environment {
                environment_name: "staging".to_string(),
                chains: Arc::new(()),
                data_store: Arc::new(()),
            },
            decoder_config: serde_json::json!({}),
        }
    }

    fn fixture_proposal() -> TimelockProposal {
        TimelockProposal {
            operations: vec![
                RawBatchOperation {
                    chain_selector: 1,
                    transactions: serde_json::json!([]),
                },
                RawBatchOperation {
                    chain_selector: 2,
                    transactions: serde_json::json!([]),
                },
            ],
        }
    }

    #[tokio::test]
    async fn empty_registry_yields_isomorphic_tree_with_no_annotations() {
        let engine = Engine::new(decoder_factory());
        let cancel = CancellationToken::new();
        let outcome = engine
            .run(&cancel, &fixture_request(), &fixture_proposal())
            .await
            .unwrap();

        assert!(outcome.errors.is_none());
        assert_eq!(outcome.analyzed.batch_operations.len(), 2);
        assert!(outcome.analyzed.annotations.snapshot().is_empty());
        assert!(
            outcome.analyzed.batch_operations[0].calls[0]
                .annotations
                .snapshot()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn parameter_analyzer_observes_only_its_declared_dependency() {
        let mut engine = Engine::new(decoder_factory());
        engine
            .registry_mut()
            .register_call(Arc::new(SeverityCallAnalyzer))
            .unwrap();
        engine
            .registry_mut()
            .register_parameter(Arc::new(SeverityReadingParameterAnalyzer))
            .unwrap();

        let cancel = CancellationToken::new();
        let outcome = engine
            .run(&cancel, &fixture_request(), &fixture_proposal())
            .await
            .unwrap();

        assert!(outcome.errors.is_none());
        for batch in &outcome.analyzed.batch_operations {
            let call = &batch.calls[0];
            let call_annotations = call.annotations.snapshot();
            assert_eq!(call_annotations.len(), 1);
            assert_eq!(call_annotations[0].name, well_known::SEVERITY);

            // The scoped store is level-wide, not entity-scoped: both
            // batches' calls have already produced a severity annotation by
            // the time the parameter level runs, so every parameter sees
            // both, not just the one on its own call.
            let param_annotations = call.inputs[0].annotations.snapshot();
            assert_eq!(param_annotations.len(), 1);
            assert_eq!(param_annotations[0].value, serde_json::json!(2));
        }
    }

    #[tokio::test]
    async fn rejects_empty_domain() {
        let engine = Engine::new(decoder_factory());
        let cancel = CancellationToken::new();
        let mut request = fixture_request();
        request.domain = String::new();
        let err = engine.run(&cancel, &request, &fixture_proposal()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
