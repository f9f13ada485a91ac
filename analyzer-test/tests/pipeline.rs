use std::sync::Arc;

use analyzer_core::annotation::well_known;
use analyzer_core::engine::Engine;
use analyzer_core::render::RenderRequest;
use analyzer_core::render::markdown::MarkdownRenderer;
use analyzer_test::{
    AlwaysFailsCallAnalyzer, DependsOnFailingAnalyzer, DiffParameterAnalyzer,
    IndependentCallAnalyzer, RiskCallAnalyzer, SeverityCallAnalyzer, cross_chain_batch,
    decoder_factory, fixture_request, mixed_risk_batch, single_transfer,
};
use tokio_util::sync::CancellationToken;

// ── Identity run ──────────────────────────────────────────────────────

#[tokio::test]
async fn empty_registry_yields_isomorphic_tree_with_no_annotations() {
    let engine = Engine::new(decoder_factory());
    let cancel = CancellationToken::new();
    let outcome = engine
        .run(&cancel, &fixture_request("cre"), &cross_chain_batch())
        .await
        .unwrap();

    assert!(outcome.errors.is_none());
    assert_eq!(outcome.analyzed.batch_operations.len(), 2);
    for batch in &outcome.analyzed.batch_operations {
        assert!(batch.annotations.snapshot().is_empty());
        for call in &batch.calls {
            assert!(call.annotations.snapshot().is_empty());
            for param in call.inputs.iter().chain(&call.outputs) {
                assert!(param.annotations.snapshot().is_empty());
            }
        }
    }
}

// ── Cross-level dependency and diff annotations ─────────────────────────

#[tokio::test]
async fn severity_risk_and_diff_analyzers_compose_across_levels() {
    let mut engine = Engine::new(decoder_factory());
    engine.registry_mut().register_call(Arc::new(SeverityCallAnalyzer)).unwrap();
    engine.registry_mut().register_call(Arc::new(RiskCallAnalyzer)).unwrap();
    engine
        .registry_mut()
        .register_parameter(Arc::new(DiffParameterAnalyzer))
        .unwrap();

    let cancel = CancellationToken::new();
    let outcome = engine
        .run(&cancel, &fixture_request("cre"), &mixed_risk_batch())
        .await
        .unwrap();

    assert!(outcome.errors.is_none(), "unexpected errors: {:?}", outcome.errors);
    let batch = &outcome.analyzed.batch_operations[0];

    // transfer call: info severity. Risk read the call-level scoped store,
    // which is level-wide rather than entity-scoped, so it sees the
    // upgradeTo call's error severity too and escalates here as well.
    let transfer = &batch.calls[0];
    let transfer_annotations = transfer.annotations.snapshot();
    assert_eq!(
        transfer_annotations.iter().find(|a| a.name == well_known::SEVERITY).unwrap().value,
        serde_json::json!("info")
    );
    assert_eq!(
        transfer_annotations.iter().find(|a| a.name == well_known::RISK).unwrap().value,
        serde_json::json!("high")
    );

    // upgradeTo call: error severity, high risk, and its amount parameter
    // carries a diff annotation because its decoded value was raised above
    // rawValue.
    let upgrade = &batch.calls[1];
    let upgrade_annotations = upgrade.annotations.snapshot();
    assert_eq!(
        upgrade_annotations.iter().find(|a| a.name == well_known::SEVERITY).unwrap().value,
        serde_json::json!("error")
    );
    assert_eq!(
        upgrade_annotations.iter().find(|a| a.name == well_known::RISK).unwrap().value,
        serde_json::json!("high")
    );
    let diff_annotations = upgrade.inputs[0].annotations.snapshot();
    assert_eq!(diff_annotations.len(), 1);
    assert_eq!(diff_annotations[0].name, well_known::DIFF);
    assert_eq!(diff_annotations[0].analyzer_id, "diff");
}

// ── Failure propagation ──────────────────────────────────────────────────

#[tokio::test]
async fn failing_analyzer_skips_dependents_but_not_independents() {
    let mut engine = Engine::new(decoder_factory());
    engine
        .registry_mut()
        .register_call(Arc::new(AlwaysFailsCallAnalyzer))
        .unwrap();
    engine
        .registry_mut()
        .register_call(Arc::new(DependsOnFailingAnalyzer))
        .unwrap();
    engine
        .registry_mut()
        .register_call(Arc::new(IndependentCallAnalyzer))
        .unwrap();

    let cancel = CancellationToken::new();
    let outcome = engine
        .run(&cancel, &fixture_request("cre"), &single_transfer())
        .await
        .unwrap();

    let errors = outcome.errors.expect("failing analyzer should surface errors");
    let message = errors.to_string();
    assert!(message.contains("run analyzer \"always-fails\""));
    assert!(message.contains("skip analyzer \"depends-on-failing\": dependency failure"));

    let call_annotations = outcome.analyzed.batch_operations[0].calls[0].annotations.snapshot();
    // independent still ran; the dependent never produced its marker.
    assert!(call_annotations.iter().any(|a| a.name == "cld.ran"));
    assert!(!call_annotations.iter().any(|a| a.name == "cld.should-not-run"));
}

// ── Decoder and validation errors ────────────────────────────────────────

#[tokio::test]
async fn decoder_error_is_wrapped_with_context() {
    struct FailingDecoder;

    #[async_trait::async_trait]
    impl analyzer_core::decoder::ProposalDecoder for FailingDecoder {
        async fn decode(
            &self,
            _cancel: &CancellationToken,
            _environment: &analyzer_core::decoder::Environment,
            _proposal: &analyzer_core::decoder::TimelockProposal,
        ) -> std::result::Result<
            analyzer_core::tree::DecodedTimelockProposal,
            analyzer_core::decoder::DecodeError,
        > {
            Err("chain RPC unavailable".into())
        }
    }

    let factory: analyzer_core::decoder::DecoderFactory =
        Arc::new(|_config| Ok(Arc::new(FailingDecoder) as Arc<dyn analyzer_core::decoder::ProposalDecoder>));
    let engine = Engine::new(factory);
    let cancel = CancellationToken::new();
    let err = engine
        .run(&cancel, &fixture_request("cre"), &single_transfer())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("building timelock report"));
    assert!(err.to_string().contains("chain RPC unavailable"));
}

#[tokio::test]
async fn rejects_empty_domain() {
    let engine = Engine::new(decoder_factory());
    let cancel = CancellationToken::new();
    let mut request = fixture_request("cre");
    request.domain = String::new();
    let err = engine.run(&cancel, &request, &single_transfer()).await.unwrap_err();
    assert!(matches!(err, analyzer_core::error::EngineError::Validation(_)));
}

// ── Rendering ─────────────────────────────────────────────────────────

#[tokio::test]
async fn renders_analyzed_proposal_to_markdown() {
    let mut engine = Engine::new(decoder_factory());
    engine.registry_mut().register_call(Arc::new(SeverityCallAnalyzer)).unwrap();
    engine
        .register_renderer(Arc::new(MarkdownRenderer::new().unwrap()))
        .unwrap();

    let cancel = CancellationToken::new();
    let outcome = engine
        .run(&cancel, &fixture_request("cre"), &mixed_risk_batch())
        .await
        .unwrap();
    assert!(outcome.errors.is_none());

    let mut buf = Vec::new();
    engine
        .render_to(
            &mut buf,
            "markdown",
            &RenderRequest {
                domain: "cre".to_string(),
                environment_name: "staging".to_string(),
                options: serde_json::json!({}),
            },
            &outcome.analyzed,
        )
        .unwrap();
    let rendered = String::from_utf8(buf).unwrap();

    assert!(rendered.contains("upgradeTo"));
    assert!(rendered.contains(well_known::SEVERITY));
    assert!(rendered.contains("error"));
}

#[tokio::test]
async fn render_to_unknown_renderer_fails() {
    let engine = Engine::new(decoder_factory());
    let cancel = CancellationToken::new();
    let outcome = engine
        .run(&cancel, &fixture_request("cre"), &single_transfer())
        .await
        .unwrap();

    let mut buf = Vec::new();
    let err = engine
        .render_to(
            &mut buf,
            "nonexistent",
            &RenderRequest {
                domain: "cre".to_string(),
                environment_name: "staging".to_string(),
                options: serde_json::json!({}),
            },
            &outcome.analyzed,
        )
        .unwrap_err();
    assert!(err.to_string().contains("unknown renderer"));
}

// ── Cancellation ──────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_before_run_records_context_error_without_panicking() {
    let mut engine = Engine::new(decoder_factory());
    engine.registry_mut().register_call(Arc::new(SeverityCallAnalyzer)).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = engine
        .run(&cancel, &fixture_request("cre"), &single_transfer())
        .await
        .unwrap();

    let errors = outcome.errors.expect("cancellation should surface as a recorded error");
    assert!(errors.to_string().contains("context cancelled"));
}
