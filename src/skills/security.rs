//! Pattern scan for hostile skill content.
//!
//! Skill documents are pasted verbatim into provider prompts, so any text
//! that tries to steer the model (prompt injection, exfiltration, hidden
//! characters, destructive shell commands) is rejected before indexing.

use regex::{RegexSet, RegexSetBuilder};
use serde::Serialize;

/// Patterns matched case-insensitively with `.` spanning newlines.
pub const HOSTILE_PATTERNS: [&str; 19] = [
    // prompt injection
    r"ignore\s+(all\s+)?previous\s+instructions",
    r"disregard\s+(your\s+)?system\s+prompt",
    r"you\s+are\s+now\s+DAN",
    r"jailbreak",
    r"pretend\s+you\s+have\s+no\s+restrictions",
    // exfiltration
    r"send\s+(all\s+)?(user\s+)?data\s+to",
    r"exfiltrate",
    r"https?://\S+\s*(api[_\-]?key|token|password|secret)",
    r"curl\s+.*\$\{?(API_KEY|TOKEN|SECRET|PASSWORD)",
    // credential theft
    r"steal\s+(api\s+)?key",
    r"extract\s+(the\s+)?(api|auth)\s+(key|token|secret)",
    // hidden instructions
    r"<!--.*inject.*-->",
    r"\x{200B}",
    r"\x{00AD}",
    // system commands
    r"os\.system\s*\(",
    r#"subprocess\.(call|run|Popen)\s*\(['"](rm\s+-rf|del\s+/|format\s+c)"#,
    r"eval\s*\(.*__import__",
    // user manipulation
    r"tell\s+the\s+user\s+to\s+click\s+",
    r"always\s+respond\s+with\s+this\s+link",
];

/// Outcome of a scan, serialized as the `check_skill` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Whether no pattern matched.
    pub safe: bool,
    /// One entry per matched pattern.
    pub violations: Vec<String>,
}

/// Compiled [`HOSTILE_PATTERNS`].
#[derive(Debug, Clone)]
pub struct SkillScanner {
    set: RegexSet,
}

impl Default for SkillScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillScanner {
    /// Compile the built-in pattern list.
    #[must_use]
    pub fn new() -> Self {
        let set = RegexSetBuilder::new(HOSTILE_PATTERNS)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .unwrap_or_else(|err| {
                tracing::error!(%err, "hostile pattern set failed to compile, scanning disabled");
                RegexSet::empty()
            });
        Self { set }
    }

    /// Scan `content` against every pattern.
    #[must_use]
    pub fn scan(&self, content: &str) -> ScanReport {
        let violations: Vec<String> = self
            .set
            .matches(content)
            .iter()
            .filter_map(|index| {
                HOSTILE_PATTERNS
                    .get(index)
                    .map(|pattern| format!("pattern {index}: {pattern}"))
            })
            .collect();
        ScanReport {
            safe: violations.is_empty(),
            violations,
        }
    }
}
