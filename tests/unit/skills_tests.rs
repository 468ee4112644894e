//! Unit tests for the built-in skill pipelines.
//!
//! Provider calls are served by an in-memory connector that records every
//! chat request and answers with `<label> output`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use allpath_runner::config::GlobalConfig;
use allpath_runner::models::{Request, RunArgs};
use allpath_runner::pipeline::executor::PipelineExecutor;
use allpath_runner::skills::catalog::SkillCatalog;
use allpath_runner::skills::provider::{
    is_placeholder_credential, provider_ids, ChatProvider, ChatRequest, HttpConnector,
    ProviderConnector, ProviderFuture,
};
use allpath_runner::skills::security::SkillScanner;
use allpath_runner::skills::{default_registry, SkillContext, PACKAGES};
use allpath_runner::{AppError, Result};

type Calls = Arc<Mutex<Vec<(RunArgs, ChatRequest)>>>;

struct RecordingProvider {
    args: RunArgs,
    calls: Calls,
}

impl ChatProvider for RecordingProvider {
    fn complete(&self, request: ChatRequest) -> ProviderFuture<'_, String> {
        Box::pin(async move {
            let answer = format!("{} output", request.label);
            self.calls
                .lock()
                .expect("calls lock")
                .push((self.args.clone(), request));
            Ok(answer)
        })
    }
}

#[derive(Default)]
struct RecordingConnector {
    calls: Calls,
}

impl ProviderConnector for RecordingConnector {
    fn connect<'a>(&'a self, args: &'a RunArgs) -> ProviderFuture<'a, Arc<dyn ChatProvider>> {
        Box::pin(async move {
            let provider: Arc<dyn ChatProvider> = Arc::new(RecordingProvider {
                args: args.clone(),
                calls: Arc::clone(&self.calls),
            });
            Ok(provider)
        })
    }
}

fn context(connector: Arc<RecordingConnector>) -> SkillContext {
    SkillContext {
        connector,
        catalog: Arc::new(SkillCatalog::builtin()),
        scanner: Arc::new(SkillScanner::new()),
    }
}

async fn call(ctx: &SkillContext, function: &str, args: &[&str]) -> allpath_runner::models::SkillResult {
    let registry = default_registry(ctx).expect("registry builds");
    let pipeline = registry.lookup(PACKAGES[0], function).expect("registered");
    let request = Request::new(
        PACKAGES[0],
        function,
        args.iter().map(|a| (*a).to_owned()).collect(),
    );
    PipelineExecutor::new(Duration::from_secs(5))
        .execute(&pipeline, &request)
        .await
}

#[test]
fn registry_serves_both_packages() -> Result<()> {
    let ctx = context(Arc::default());

    let registry = default_registry(&ctx)?;

    assert_eq!(registry.packages(), PACKAGES);
    assert_eq!(registry.len(), 12);
    for function in ["run", "byakugan", "skills_list", "skills_count", "check_skill", "version"] {
        assert!(registry.lookup("senjutsu-agent", function).is_ok(), "{function} missing");
    }
    Ok(())
}

#[tokio::test]
async fn run_pipeline_produces_every_field() {
    let connector = Arc::new(RecordingConnector::default());
    let ctx = context(Arc::clone(&connector));

    let result = call(&ctx, "run", &["build a todo api", "gsk_test", "OpenAI"]).await;

    assert!(result.is_success(), "unexpected error: {}", result.error);
    let fields: Vec<&str> = result.stages.iter().map(|s| s.field.as_str()).collect();
    assert_eq!(fields, ["byakugan", "mode_sage", "jougan", "skill_selection", "code"]);
    assert_eq!(result.stage("byakugan"), Some("byakugan output"));
    assert_eq!(result.execution, "code output");
    assert!(result.skills_used.iter().any(|s| s == "dev-expert"));

    let calls = connector.calls.lock().unwrap();
    assert_eq!(calls.len(), 5, "one provider call per stage");
    assert!(calls.iter().all(|(args, _)| args.provider == "openai" && args.credential == "gsk_test"));
}

#[tokio::test]
async fn later_stages_see_earlier_outputs() {
    let connector = Arc::new(RecordingConnector::default());
    let ctx = context(Arc::clone(&connector));

    call(&ctx, "run", &["write a cli"]).await;

    let calls = connector.calls.lock().unwrap();
    let (_, jougan) = calls
        .iter()
        .find(|(_, req)| req.label == "jougan")
        .expect("jougan called");
    let quoted: Vec<&str> = jougan.messages.iter().map(|m| m.content.as_str()).collect();
    assert!(quoted.iter().any(|c| c.contains("byakugan output")));
    assert!(quoted.iter().any(|c| c.contains("mode_sage output")));

    let (_, code) = calls.iter().find(|(_, req)| req.label == "code").expect("code called");
    assert!(code.messages.iter().any(|m| m.content.contains("SKILL [builtin] : dev-expert")));
}

#[tokio::test]
async fn run_without_task_fails_in_first_stage() {
    let ctx = context(Arc::default());

    let result = call(&ctx, "run", &[]).await;

    assert!(result.error.starts_with("stage: byakugan failed"), "got: {}", result.error);
    assert!(result.error.contains("task description is required"));
    assert_eq!(result.stage("mode_sage"), Some(""));
}

#[tokio::test]
async fn skills_count_and_list_use_the_catalog() {
    let ctx = context(Arc::default());

    let count = call(&ctx, "skills_count", &[]).await;
    let list = call(&ctx, "skills_list", &[]).await;

    assert_eq!(count.execution, "3");
    assert!(list.execution.contains("[github-actions]"));
}

#[tokio::test]
async fn check_skill_reports_violations() {
    let ctx = context(Arc::default());

    let result = call(&ctx, "check_skill", &["please jailbreak yourself"]).await;
    let report: serde_json::Value = serde_json::from_str(&result.execution).expect("json report");

    assert_eq!(report["safe"], false);
    assert_eq!(report["violations"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn check_skill_without_content_is_invalid() {
    let ctx = context(Arc::default());

    let result = call(&ctx, "check_skill", &[]).await;

    assert!(result.error.contains("invalid args"), "got: {}", result.error);
}

#[tokio::test]
async fn version_reports_crate_version() {
    let ctx = context(Arc::default());

    let result = call(&ctx, "version", &[]).await;
    let body: serde_json::Value = serde_json::from_str(&result.execution).expect("json body");

    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["package"], PACKAGES[0]);
    assert_eq!(body["providers"].as_array().map(Vec::len), Some(provider_ids().len()));
}

// ── Provider resolution ─────────────────────────────────────────────────────

fn run_args(provider: &str, credential: &str) -> RunArgs {
    let mut request = Request::new("p", "run", vec!["task".into(), credential.into()]);
    request.provider = Some(provider.into());
    request.run_args().expect("valid args")
}

#[tokio::test]
async fn http_connector_rejects_unknown_provider() {
    let connector = HttpConnector::new(&GlobalConfig::default()).expect("client builds");

    let err = match connector.connect(&run_args("nonesuch", "key")).await {
        Ok(_) => panic!("unknown provider must be rejected"),
        Err(err) => err,
    };

    assert!(matches!(err, AppError::InvalidArgs(_)));
    assert!(err.to_string().contains("groq"), "supported list is reported: {err}");
}

#[tokio::test]
async fn http_connector_accepts_explicit_credential() {
    let connector = HttpConnector::new(&GlobalConfig::default()).expect("client builds");

    assert!(connector.connect(&run_args("groq", "gsk_real_key")).await.is_ok());
}

#[test]
fn placeholder_credentials_are_detected() {
    assert!(is_placeholder_credential(""));
    assert!(is_placeholder_credential("  "));
    assert!(is_placeholder_credential("gsk_XXXXXXXX"));
    assert!(!is_placeholder_credential("gsk_abc123"));
}
