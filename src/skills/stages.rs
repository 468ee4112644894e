//! Stage implementations behind the registered skills.

use std::sync::Arc;

use super::catalog::SkillCatalog;
use super::provider::{provider_ids, ChatMessage, ChatRequest, ProviderConnector};
use super::security::SkillScanner;
use crate::pipeline::{Stage, StageFuture, StageInput, StageOutput};
use crate::AppError;

/// Skills retrieved for the selection prompt and reported in `skills_used`.
pub const RETRIEVED_SKILLS: usize = 6;
/// Skills whose content is handed to the code stage.
pub const INJECTED_SKILLS: usize = 4;
const SKILL_CONTENT_CHARS: usize = 3000;
const ANALYSIS_CONTEXT_CHARS: usize = 1500;

pub(crate) const BYAKUGAN_PROMPT: &str = "\
You are the structural-vision module of a precision code-generation pipeline.
Reveal what the request really requires, not what it literally says:
1. Concrete behaviour and exact deliverable format.
2. Business domain and sub-domains (auth, payments, search, files, realtime, email).
3. Structural dependencies and implicit assumptions.
4. Structural breaking points and hidden incompatibilities between requirements.
5. Stated state versus real state.
Be precise and structured.";

pub(crate) const MODE_SAGE_PROMPT: &str = "\
You are the systemic-coherence module of a precision code-generation pipeline.
Given the request and its structural analysis, decide the one coherent stack and
architecture: language, frameworks, storage, hosting, security model, and the
standards each sub-domain must follow. Justify every choice against the analysis.";

pub(crate) const JOUGAN_PROMPT: &str = "\
You are the trajectory module of a precision code-generation pipeline.
Given the request, its structural analysis and the chosen architecture, anticipate
how the project will evolve: scaling pressure, likely feature drift, irreversible
decisions that must be right from day one, and the foundations to lay now.";

const SELECTION_PROMPT: &str = "\
You select the skills a code-generation agent should apply.
You receive the combined analyses of a task and the catalog of available skills.
Pick the 2 to 5 most relevant skills; dev-expert, github-actions and svg-animations
take priority whenever they apply.

AVAILABLE SKILLS:
{skills}

Answer as:
SELECTED:
1. [name] - reason - critical rules
DISCARDED:
- [name]: short reason";

const CODE_PROMPT: &str = "\
You are an expert full-stack developer producing production-ready code.
You hold three perceptions of the project (structural vision, systemic coherence,
trajectories) plus skill documents that guide the implementation.
Rules: apply the intent of each skill, use exactly the chosen stack, cover the
identified breaking points, lay the foundations flagged as irreversible, and treat
security as a design input.
Answer with: the key decisions, the full project tree, the complete code of every
file, and a short validation against each perception.";

/// One provider call whose prompt grows with the outputs of earlier stages.
pub struct AnalysisStage {
    name: &'static str,
    system: &'static str,
    context_fields: &'static [&'static str],
    max_tokens: u32,
    connector: Arc<dyn ProviderConnector>,
}

impl AnalysisStage {
    /// Stage `name` prompting with `system`, quoting the outputs stored
    /// under `context_fields` back to the provider.
    #[must_use]
    pub fn new(
        name: &'static str,
        system: &'static str,
        context_fields: &'static [&'static str],
        max_tokens: u32,
        connector: Arc<dyn ProviderConnector>,
    ) -> Self {
        Self {
            name,
            system,
            context_fields,
            max_tokens,
            connector,
        }
    }
}

impl Stage for AnalysisStage {
    fn name(&self) -> &str {
        self.name
    }

    fn run<'a>(&'a self, input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move {
            let args = input.request.run_args()?;
            let provider = self.connector.connect(&args).await?;

            let mut messages = vec![ChatMessage::user(format!("Request: {}", args.task))];
            for field in self.context_fields {
                if let Some(content) = input.prior_output(field) {
                    messages.push(ChatMessage::assistant(format!(
                        "{}:\n{content}",
                        field.to_uppercase()
                    )));
                }
            }
            if messages.len() > 1 {
                messages.push(ChatMessage::user("Continue from these analyses."));
            }

            let content = provider
                .complete(ChatRequest {
                    label: self.name.to_owned(),
                    system: self.system.to_owned(),
                    messages,
                    max_tokens: self.max_tokens,
                })
                .await?;
            Ok(StageOutput::text(content))
        })
    }
}

/// Joined analysis outputs used as the retrieval query.
fn combined_analysis(input: &StageInput<'_>, fields: &[&str]) -> String {
    fields
        .iter()
        .filter_map(|field| input.prior_output(field))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Retrieves catalog skills and asks the provider which ones apply.
pub struct SkillSelectionStage {
    analysis_fields: &'static [&'static str],
    catalog: Arc<SkillCatalog>,
    connector: Arc<dyn ProviderConnector>,
}

impl SkillSelectionStage {
    /// Selection over `catalog`, querying with the outputs under `analysis_fields`.
    #[must_use]
    pub fn new(
        analysis_fields: &'static [&'static str],
        catalog: Arc<SkillCatalog>,
        connector: Arc<dyn ProviderConnector>,
    ) -> Self {
        Self {
            analysis_fields,
            catalog,
            connector,
        }
    }
}

impl Stage for SkillSelectionStage {
    fn name(&self) -> &str {
        "skill_selection"
    }

    fn run<'a>(&'a self, input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move {
            let args = input.request.run_args()?;
            let combined = combined_analysis(input, self.analysis_fields);
            let hits: Vec<String> = self
                .catalog
                .retrieve(&combined, RETRIEVED_SKILLS)
                .into_iter()
                .map(|(skill, _)| skill.name.clone())
                .collect();

            let provider = self.connector.connect(&args).await?;
            let excerpt: String = combined.chars().take(ANALYSIS_CONTEXT_CHARS).collect();
            let content = provider
                .complete(ChatRequest {
                    label: "skill_selection".into(),
                    system: SELECTION_PROMPT.replace("{skills}", &self.catalog.listing()),
                    messages: vec![
                        ChatMessage::user(format!("Request: {}", args.task)),
                        ChatMessage::assistant(format!("ANALYSES:\n{excerpt}")),
                        ChatMessage::user("Select the skills."),
                    ],
                    max_tokens: 800,
                })
                .await?;

            Ok(StageOutput::text(content).with_skills(hits))
        })
    }
}

/// Final generation call fed with every analysis and the top skills.
pub struct CodeStage {
    analysis_fields: &'static [&'static str],
    catalog: Arc<SkillCatalog>,
    connector: Arc<dyn ProviderConnector>,
}

impl CodeStage {
    /// Code generation quoting `analysis_fields` and skills from `catalog`.
    #[must_use]
    pub fn new(
        analysis_fields: &'static [&'static str],
        catalog: Arc<SkillCatalog>,
        connector: Arc<dyn ProviderConnector>,
    ) -> Self {
        Self {
            analysis_fields,
            catalog,
            connector,
        }
    }
}

impl Stage for CodeStage {
    fn name(&self) -> &str {
        "code"
    }

    fn run<'a>(&'a self, input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move {
            let args = input.request.run_args()?;
            let combined = combined_analysis(input, self.analysis_fields);
            let top: Vec<String> = self
                .catalog
                .retrieve(&combined, INJECTED_SKILLS)
                .into_iter()
                .map(|(skill, _)| skill.name.clone())
                .collect();
            let skills = self.catalog.render(&top, SKILL_CONTENT_CHARS);

            let mut messages = vec![ChatMessage::user(format!("Request: {}", args.task))];
            for field in self.analysis_fields {
                if let Some(content) = input.prior_output(field) {
                    messages.push(ChatMessage::assistant(format!(
                        "{}:\n{content}",
                        field.to_uppercase()
                    )));
                }
            }
            messages.push(ChatMessage::user("Skills loaded."));
            messages.push(ChatMessage::assistant(format!("SKILLS:\n{skills}")));
            messages.push(ChatMessage::user(
                "Generate the complete project with absolute precision.",
            ));

            let provider = self.connector.connect(&args).await?;
            let content = provider
                .complete(ChatRequest {
                    label: "code".into(),
                    system: CODE_PROMPT.to_owned(),
                    messages,
                    max_tokens: 4500,
                })
                .await?;
            Ok(StageOutput::text(content))
        })
    }
}

/// Lists the indexed skills.
pub struct SkillsListStage {
    catalog: Arc<SkillCatalog>,
}

impl SkillsListStage {
    /// Listing over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<SkillCatalog>) -> Self {
        Self { catalog }
    }
}

impl Stage for SkillsListStage {
    fn name(&self) -> &str {
        "skills_list"
    }

    fn run<'a>(&'a self, _input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move { Ok(StageOutput::text(self.catalog.listing())) })
    }
}

/// Counts the indexed skills.
pub struct SkillsCountStage {
    catalog: Arc<SkillCatalog>,
}

impl SkillsCountStage {
    /// Count over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<SkillCatalog>) -> Self {
        Self { catalog }
    }
}

impl Stage for SkillsCountStage {
    fn name(&self) -> &str {
        "skills_count"
    }

    fn run<'a>(&'a self, _input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move { Ok(StageOutput::text(self.catalog.len().to_string())) })
    }
}

/// Security-scans the skill text passed in `args[0]`.
pub struct CheckSkillStage {
    scanner: Arc<SkillScanner>,
}

impl CheckSkillStage {
    /// Check using `scanner`.
    #[must_use]
    pub fn new(scanner: Arc<SkillScanner>) -> Self {
        Self { scanner }
    }
}

impl Stage for CheckSkillStage {
    fn name(&self) -> &str {
        "check_skill"
    }

    fn run<'a>(&'a self, input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move {
            let content = input
                .request
                .prompt
                .as_deref()
                .or_else(|| input.request.arg(0))
                .ok_or_else(|| AppError::InvalidArgs("skill content is required".into()))?;
            let report = self.scanner.scan(content);
            Ok(StageOutput::text(serde_json::to_string(&report)?))
        })
    }
}

/// Reports the daemon version and supported providers.
pub struct VersionStage;

impl Stage for VersionStage {
    fn name(&self) -> &str {
        "version"
    }

    fn run<'a>(&'a self, input: &'a StageInput<'a>) -> StageFuture<'a> {
        Box::pin(async move {
            let body = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "package": input.request.package,
                "providers": provider_ids(),
            });
            Ok(StageOutput::text(body.to_string()))
        })
    }
}
