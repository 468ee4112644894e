//! Skill catalog and keyword retrieval.
//!
//! The catalog holds the built-in skills plus every skill document found
//! anywhere below the configured `skills_dir`: `SKILL.md` files,
//! `*.cursorrules` rule files, and `llms.txt` / `llms-full.txt` digests.
//! Retrieval is a plain keyword score; pinned built-ins always outrank
//! everything else.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::security::SkillScanner;
use crate::{AppError, Result};

/// Built-ins that receive the pinned bonus whenever they are indexed.
pub const PINNED_SKILLS: [&str; 3] = ["dev-expert", "github-actions", "svg-animations"];

const PINNED_BONUS: u32 = 500;
const NAME_HIT: u32 = 15;
const DESCRIPTION_HIT: u32 = 10;
const BODY_HIT: u32 = 2;
const BODY_WINDOW: usize = 600;

const STOPWORDS: [&str; 49] = [
    "the", "a", "an", "is", "to", "of", "and", "or", "for", "in", "on", "with", "that", "this",
    "be", "as", "at", "from", "je", "le", "la", "les", "un", "une", "des", "et", "ou", "de", "du",
    "pour", "sur", "si", "qui", "que", "ce", "se", "il", "ils", "elle", "use", "when", "skill",
    "file", "task", "create", "make", "build", "run", "add",
];

const DEV_EXPERT: &str = "---
name: dev-expert
description: \"Apply before any coding task: identify the domain, pick the stack, design for security and scale before writing code.\"
---

# Dev expert

Understand first, architect second, code last.

## Domain
- SaaS: multi-tenant data, robust auth, billing.
- E-commerce: cart, payments through a processor, inventory, taxes.
- API/backend: explicit contracts, versioning, rate limiting.
- AI application: latency budgets, token cost, provider fallbacks.

## Non-negotiables
- Secrets come from the environment, never from source.
- Passwords are hashed with a slow KDF; sessions use short-lived tokens.
- Every input crossing a trust boundary is validated.
- The project layout, tests and a README ship with the code.
";

const GITHUB_ACTIONS: &str = "---
name: github-actions
description: \"Apply when generating CI/CD workflows, GitHub Actions, release automation, Docker builds or package publishing.\"
---

# GitHub Actions

Every workflow is fast, pinned and least-privilege.

- Pin third-party actions to a full commit SHA.
- Declare `permissions:` per job; default to `contents: read`.
- Cache dependency directories keyed on the lockfile hash.
- Split lint, test and build into parallel jobs; gate deploys on all three.
- Publish with OIDC trusted publishing instead of long-lived tokens.
";

const SVG_ANIMATIONS: &str = "---
name: svg-animations
description: \"Apply when creating animated SVG: loading spinners, README badges, logo reveals, hero illustrations, data visualisations.\"
---

# SVG animations

- Prefer SMIL or CSS keyframes inside the SVG so the file animates standalone.
- Animate `transform` and `opacity`; avoid layout-affecting attributes.
- Honour `prefers-reduced-motion` with a static fallback.
- Keep a `viewBox` and no fixed width/height so the asset scales.
";

/// Where a skill document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillSource {
    /// Compiled into the daemon.
    Builtin,
    /// Loaded from `skills_dir`.
    Local,
}

impl Display for SkillSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin => f.write_str("builtin"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// File layout a skill document was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillFormat {
    /// `SKILL.md` with optional front-matter.
    SkillMd,
    /// Editor rule file (`*.cursorrules`).
    Cursorrules,
    /// `llms.txt` or `llms-full.txt` digest.
    LlmsTxt,
}

/// Glob suffixes searched below `skills_dir`, in indexing order.
const FORMAT_PATTERNS: [&str; 4] = ["SKILL.md", "*.cursorrules", "llms.txt", "llms-full.txt"];

impl SkillFormat {
    /// Format implied by a file name, if it is a skill document at all.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        if file_name == "SKILL.md" {
            Some(Self::SkillMd)
        } else if file_name == "llms.txt" || file_name == "llms-full.txt" {
            Some(Self::LlmsTxt)
        } else if file_name.ends_with(".cursorrules") {
            Some(Self::Cursorrules)
        } else {
            None
        }
    }

    /// Name a document gets when its content does not declare one.
    ///
    /// `SKILL.md` and `llms*.txt` are named after their directory; rule
    /// files after their stem, or their directory for a bare `.cursorrules`.
    #[must_use]
    pub fn fallback_name(self, path: &Path) -> String {
        let dir_name = || {
            path.parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let name = match self {
            Self::SkillMd | Self::LlmsTxt => dir_name(),
            Self::Cursorrules => match path.file_stem().map(|stem| stem.to_string_lossy()) {
                Some(stem) if !stem.is_empty() && !stem.starts_with('.') => stem.into_owned(),
                _ => dir_name(),
            },
        };
        name.replace('_', "-")
    }
}

impl Display for SkillFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkillMd => f.write_str("skill_md"),
            Self::Cursorrules => f.write_str("cursorrules"),
            Self::LlmsTxt => f.write_str("llms_txt"),
        }
    }
}

/// One indexed skill document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDoc {
    /// Skill identifier reported in `skills_used`.
    pub name: String,
    /// Origin of the document.
    pub source: SkillSource,
    /// File layout of the document.
    pub format: SkillFormat,
    /// One-line summary.
    pub description: String,
    /// Full document text.
    pub content: String,
}

impl SkillDoc {
    /// Parse a skill document, naming it `fallback_name` when the
    /// front-matter carries no `name:`.
    ///
    /// Only `SKILL.md` documents take their description from front-matter;
    /// the other formats use their first meaningful line.
    #[must_use]
    pub fn parse(raw: &str, fallback_name: &str, source: SkillSource, format: SkillFormat) -> Self {
        let name = front_matter_value(raw, "name").unwrap_or_else(|| fallback_name.replace('_', "-"));
        let declared = match format {
            SkillFormat::SkillMd => front_matter_value(raw, "description"),
            SkillFormat::Cursorrules | SkillFormat::LlmsTxt => None,
        };
        let description = declared
            .or_else(|| first_meaningful_line(raw))
            .unwrap_or_else(|| name.clone());
        Self {
            name,
            source,
            format,
            description,
            content: raw.to_owned(),
        }
    }
}

/// Read-only set of skill documents.
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: Vec<SkillDoc>,
}

impl SkillCatalog {
    /// Catalog with only the built-in skills.
    #[must_use]
    pub fn builtin() -> Self {
        let skills = [
            ("dev-expert", DEV_EXPERT),
            ("github-actions", GITHUB_ACTIONS),
            ("svg-animations", SVG_ANIMATIONS),
        ]
        .into_iter()
        .map(|(name, raw)| SkillDoc::parse(raw, name, SkillSource::Builtin, SkillFormat::SkillMd))
        .collect();
        Self::from_docs(skills)
    }

    /// Catalog over explicit documents.
    #[must_use]
    pub fn from_docs(skills: Vec<SkillDoc>) -> Self {
        Self { skills }
    }

    /// Built-ins plus every skill document below `dir` that passes `scanner`.
    ///
    /// The search is recursive. Documents whose name is already taken are
    /// skipped, so built-ins and `SKILL.md` files win over later formats.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `dir` is set but does not exist or
    /// a glob pattern cannot be built from it.
    pub fn load(dir: Option<&Path>, scanner: &SkillScanner) -> Result<Self> {
        let mut catalog = Self::builtin();
        let Some(dir) = dir else {
            return Ok(catalog);
        };

        if !dir.is_dir() {
            return Err(AppError::Config(format!(
                "skills_dir {} is not a directory",
                dir.display()
            )));
        }

        let mut rejected = 0usize;
        for path in discover(dir)? {
            let Some(format) = SkillFormat::detect(&path) else {
                continue;
            };
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to read skill, skipping");
                    continue;
                }
            };
            let fallback_name = format.fallback_name(&path);

            let report = scanner.scan(&raw);
            if !report.safe {
                rejected += 1;
                warn!(skill = %fallback_name, violations = ?report.violations, "skill rejected by security scan");
                continue;
            }

            let doc = SkillDoc::parse(&raw, &fallback_name, SkillSource::Local, format);
            if catalog.get(&doc.name).is_some() {
                warn!(skill = %doc.name, path = %path.display(), "duplicate skill name, keeping the first");
                continue;
            }
            catalog.skills.push(doc);
        }

        info!(count = catalog.len(), rejected, "skill catalog indexed");
        Ok(catalog)
    }

    /// Number of indexed skills.
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether no skill is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skill by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SkillDoc> {
        self.skills.iter().find(|skill| skill.name == name)
    }

    /// Up to `top_k` skills ranked by score, highest first; zero scores are dropped.
    #[must_use]
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<(&SkillDoc, u32)> {
        let words = keywords(query);
        let mut scored: Vec<(&SkillDoc, u32)> = self
            .skills
            .iter()
            .map(|skill| (skill, score(skill, &words)))
            .filter(|(_, score)| *score > 0)
            .collect();
        // Stable sort keeps catalog order between equal scores.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(top_k);
        scored
    }

    /// Concatenated content of the named skills, each truncated to `max_chars`.
    #[must_use]
    pub fn render(&self, names: &[String], max_chars: usize) -> String {
        let separator = "=".repeat(50);
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|skill| {
                let body: String = skill.content.chars().take(max_chars).collect();
                format!(
                    "{separator}\nSKILL [{}] : {}\nFormat: {}\n{separator}\n{body}",
                    skill.source, skill.name, skill.format
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One line per skill, sorted by name.
    #[must_use]
    pub fn listing(&self) -> String {
        if self.skills.is_empty() {
            return "(no skills indexed)".into();
        }
        let mut lines: Vec<String> = self
            .skills
            .iter()
            .map(|skill| {
                let description: String = skill.description.chars().take(80).collect();
                format!(
                    "• [{}] ({}, {}) — {description}",
                    skill.name, skill.source, skill.format
                )
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

/// Every candidate file below `dir`, grouped by format in indexing order.
fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for suffix in FORMAT_PATTERNS {
        let pattern = dir.join("**").join(suffix);
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|err| AppError::Config(format!("invalid skills_dir pattern: {err}")))?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(err) => warn!(%err, "unreadable skill entry, skipping"),
            }
        }
    }
    Ok(paths)
}

/// Lower-cased runs of `[a-z_-]` of length three or more, stop-words removed.
#[must_use]
pub fn keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphabetic() || c == '_' || c == '-'))
        .filter(|word| word.len() >= 3 && !STOPWORDS.contains(word))
        .map(str::to_owned)
        .collect()
}

fn score(skill: &SkillDoc, words: &[String]) -> u32 {
    let name = skill.name.to_lowercase();
    let description = skill.description.to_lowercase();
    let body: String = skill.content.chars().take(BODY_WINDOW).collect::<String>().to_lowercase();

    let mut total = 0u32;
    if PINNED_SKILLS.iter().any(|pinned| name.contains(pinned)) {
        total += PINNED_BONUS;
    }
    for word in words {
        if name.contains(word.as_str()) {
            total += NAME_HIT;
        }
        if description.contains(word.as_str()) {
            total += DESCRIPTION_HIT;
        }
        let hits = u32::try_from(body.matches(word.as_str()).count()).unwrap_or(u32::MAX);
        total = total.saturating_add(hits.saturating_mul(BODY_HIT));
    }
    total
}

/// Value of `key:` inside a leading `---` front-matter block.
fn front_matter_value(raw: &str, key: &str) -> Option<String> {
    let rest = raw.strip_prefix("---")?;
    let block = rest.split("---").next()?;
    block.lines().find_map(|line| {
        let value = line.trim().strip_prefix(key)?.strip_prefix(':')?;
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_owned())
    })
}

/// Document text after a leading front-matter block, if any.
fn strip_front_matter(raw: &str) -> &str {
    raw.strip_prefix("---")
        .and_then(|rest| rest.split_once("---"))
        .map_or(raw, |(_, body)| body)
}

fn first_meaningful_line(raw: &str) -> Option<String> {
    strip_front_matter(raw)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && line.len() > 15)
        .map(|line| line.chars().take(120).collect())
}
