//! Unit tests for the skill registry.

use allpath_runner::pipeline::registry::SkillRegistry;
use allpath_runner::pipeline::{Pipeline, Stage, StageFuture, StageInput, StageOutput};
use allpath_runner::AppError;

struct Noop;

impl Stage for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn run<'a>(&'a self, _input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async { Ok(StageOutput::default()) })
    }
}

fn one_stage(name: &str) -> Pipeline {
    Pipeline::new(name).stage(Noop)
}

#[test]
fn lookup_resolves_registered_pair() {
    let registry = SkillRegistry::builder()
        .register("pkg", "run", one_stage("run"))
        .unwrap()
        .build();

    let pipeline = registry.lookup("pkg", "run").expect("registered");

    assert_eq!(pipeline.name(), "run");
    assert_eq!(registry.len(), 1);
}

#[test]
fn unknown_package_is_reported() {
    let registry = SkillRegistry::builder()
        .register("pkg", "run", one_stage("run"))
        .unwrap()
        .build();

    let err = registry.lookup("nope", "run").expect_err("unknown package");

    assert!(matches!(err, AppError::UnknownSkill(_)));
    assert!(err.to_string().contains("'nope'"));
}

#[test]
fn unknown_function_lists_alternatives() {
    let registry = SkillRegistry::builder()
        .register("pkg", "run", one_stage("run"))
        .unwrap()
        .register("pkg", "version", one_stage("version"))
        .unwrap()
        .build();

    let err = registry.lookup("pkg", "missing").expect_err("unknown function");

    let msg = err.to_string();
    assert!(msg.starts_with("unknown skill:"), "got: {msg}");
    assert!(msg.contains("run, version"), "got: {msg}");
}

#[test]
fn duplicate_registration_is_rejected() {
    let result = SkillRegistry::builder()
        .register("pkg", "run", one_stage("a"))
        .unwrap()
        .register("pkg", "run", one_stage("b"));

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn empty_pipeline_is_rejected() {
    let result = SkillRegistry::builder().register("pkg", "run", Pipeline::new("empty"));

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn reserved_field_is_rejected() {
    let pipeline = Pipeline::new("bad").named_stage("execution", Noop);

    let result = SkillRegistry::builder().register("pkg", "run", pipeline);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn duplicate_field_is_rejected() {
    let pipeline = Pipeline::new("bad")
        .named_stage("analysis", Noop)
        .named_stage("analysis", Noop);

    let result = SkillRegistry::builder().register("pkg", "run", pipeline);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn register_all_shares_the_pipeline() {
    let registry = SkillRegistry::builder()
        .register_all(&["a", "b"], "version", &one_stage("version"))
        .unwrap()
        .build();

    assert_eq!(registry.packages(), ["a", "b"]);
    assert!(registry.lookup("a", "version").is_ok());
    assert!(registry.lookup("b", "version").is_ok());
}
