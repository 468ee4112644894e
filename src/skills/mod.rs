//! Built-in skills and the startup registry.
//!
//! Both provider packages expose the same function table:
//!
//! | function       | stage fields                                                |
//! |----------------|-------------------------------------------------------------|
//! | `run`          | `byakugan`, `mode_sage`, `jougan`, `skill_selection`, `code` |
//! | `byakugan`     | `byakugan`                                                  |
//! | `skills_list`  | `skills`                                                    |
//! | `skills_count` | `count`                                                     |
//! | `check_skill`  | `check`                                                     |
//! | `version`      | `version`                                                   |

pub mod catalog;
pub mod provider;
pub mod security;
pub mod stages;

use std::sync::Arc;

use crate::pipeline::registry::SkillRegistry;
use crate::pipeline::Pipeline;
use crate::Result;

use self::catalog::SkillCatalog;
use self::provider::ProviderConnector;
use self::security::SkillScanner;
use self::stages::{
    AnalysisStage, CheckSkillStage, CodeStage, SkillSelectionStage, SkillsCountStage,
    SkillsListStage, VersionStage, BYAKUGAN_PROMPT, JOUGAN_PROMPT, MODE_SAGE_PROMPT,
};

/// Packages that serve the skill table.
pub const PACKAGES: [&str; 2] = ["dojutsu-agent", "senjutsu-agent"];

const ANALYSIS_FIELDS: &[&str] = &["byakugan", "mode_sage", "jougan"];

/// Collaborators shared by every registered stage.
#[derive(Clone)]
pub struct SkillContext {
    /// Builds provider clients per run.
    pub connector: Arc<dyn ProviderConnector>,
    /// Indexed skill documents.
    pub catalog: Arc<SkillCatalog>,
    /// Hostile-content scanner.
    pub scanner: Arc<SkillScanner>,
}

/// The five-stage precision pipeline behind `run`.
#[must_use]
pub fn run_pipeline(ctx: &SkillContext) -> Pipeline {
    Pipeline::new("run")
        .named_stage("byakugan", byakugan_stage(ctx))
        .named_stage(
            "mode_sage",
            AnalysisStage::new(
                "mode_sage",
                MODE_SAGE_PROMPT,
                &["byakugan"],
                2000,
                Arc::clone(&ctx.connector),
            ),
        )
        .named_stage(
            "jougan",
            AnalysisStage::new(
                "jougan",
                JOUGAN_PROMPT,
                &["byakugan", "mode_sage"],
                2000,
                Arc::clone(&ctx.connector),
            ),
        )
        .named_stage(
            "skill_selection",
            SkillSelectionStage::new(
                ANALYSIS_FIELDS,
                Arc::clone(&ctx.catalog),
                Arc::clone(&ctx.connector),
            ),
        )
        .named_stage(
            "code",
            CodeStage::new(
                ANALYSIS_FIELDS,
                Arc::clone(&ctx.catalog),
                Arc::clone(&ctx.connector),
            ),
        )
}

fn byakugan_stage(ctx: &SkillContext) -> AnalysisStage {
    AnalysisStage::new(
        "byakugan",
        BYAKUGAN_PROMPT,
        &[],
        2000,
        Arc::clone(&ctx.connector),
    )
}

/// Build the frozen registry served by the daemon.
///
/// # Errors
///
/// Returns `AppError::Config` if two registrations collide.
pub fn default_registry(ctx: &SkillContext) -> Result<SkillRegistry> {
    let byakugan = Pipeline::new("byakugan").named_stage("byakugan", byakugan_stage(ctx));
    let skills_list = Pipeline::new("skills_list")
        .named_stage("skills", SkillsListStage::new(Arc::clone(&ctx.catalog)));
    let skills_count = Pipeline::new("skills_count")
        .named_stage("count", SkillsCountStage::new(Arc::clone(&ctx.catalog)));
    let check_skill = Pipeline::new("check_skill")
        .named_stage("check", CheckSkillStage::new(Arc::clone(&ctx.scanner)));
    let version = Pipeline::new("version").named_stage("version", VersionStage);

    Ok(SkillRegistry::builder()
        .register_all(&PACKAGES, "run", &run_pipeline(ctx))?
        .register_all(&PACKAGES, "byakugan", &byakugan)?
        .register_all(&PACKAGES, "skills_list", &skills_list)?
        .register_all(&PACKAGES, "skills_count", &skills_count)?
        .register_all(&PACKAGES, "check_skill", &check_skill)?
        .register_all(&PACKAGES, "version", &version)?
        .build())
}
