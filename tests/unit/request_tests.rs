//! Unit tests for request validation and typed run arguments.

use allpath_runner::models::request::DEFAULT_PROVIDER;
use allpath_runner::models::Request;
use allpath_runner::AppError;

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

#[test]
fn positional_args_resolve_in_order() {
    let request = Request::new(
        "dojutsu-agent",
        "run",
        args(&["write a parser", "gsk_key", "OpenAI", "gpt-4o-mini"]),
    );

    let run = request.run_args().expect("valid args");

    assert_eq!(run.task, "write a parser");
    assert_eq!(run.credential, "gsk_key");
    assert_eq!(run.provider, "openai", "provider is lower-cased");
    assert_eq!(run.model.as_deref(), Some("gpt-4o-mini"));
}

#[test]
fn named_fields_take_precedence() {
    let mut request = Request::new("p", "run", args(&["positional task", "k1", "groq"]));
    request.prompt = Some("named task".into());
    request.provider = Some("mistral".into());

    let run = request.run_args().unwrap();

    assert_eq!(run.task, "named task");
    assert_eq!(run.credential, "k1");
    assert_eq!(run.provider, "mistral");
}

#[test]
fn provider_defaults_when_absent() {
    let request = Request::new("p", "run", args(&["task"]));

    let run = request.run_args().unwrap();

    assert_eq!(run.provider, DEFAULT_PROVIDER);
    assert!(run.credential.is_empty());
    assert!(run.model.is_none());
}

#[test]
fn missing_task_is_invalid_args() {
    let request = Request::new("p", "run", args(&["   "]));

    let err = request.run_args().expect_err("blank task must fail");

    assert!(matches!(err, AppError::InvalidArgs(_)), "got {err:?}");
}

#[test]
fn validate_rejects_blank_function() {
    let request = Request::new("p", "", Vec::new());

    assert!(matches!(request.validate(), Err(AppError::Codec(_))));
}

#[test]
fn debug_output_redacts_arguments() {
    let request = Request::new("p", "run", args(&["task", "secret-key-123"]));

    let debug = format!("{request:?}");
    let run_debug = format!("{:?}", request.run_args().unwrap());

    assert!(!debug.contains("secret-key-123"), "args leaked: {debug}");
    assert!(debug.contains("2 redacted"));
    assert!(!run_debug.contains("secret-key-123"), "credential leaked: {run_debug}");
}

#[test]
fn skill_key_joins_package_and_function() {
    assert_eq!(Request::new("pkg", "fn", Vec::new()).skill_key(), "pkg/fn");
}
