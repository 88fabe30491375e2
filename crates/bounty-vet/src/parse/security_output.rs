//! Auditor output parsing.
//!
//! Each ecosystem's auditor gets its own patterns; when none of them match, a
//! whole-word keyword count over the output is used instead. `moderate` is
//! folded into `medium` everywhere.

use regex::Regex;
use std::sync::LazyLock;

use bounty_vet_domain::{keys, Metrics, ProjectType, SeverityCounts};

/// `"critical": 3` as emitted by `npm|pnpm|yarn|bun audit --json`.
static NODE_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(critical|high|moderate|medium|low)"\s*:\s*(\d+)"#).expect("node json pattern")
});
/// `3 critical`, `2 High` as in the human-readable audit summary.
static NODE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s+(critical|high|moderate|medium|low)\b").expect("node text pattern")
});
/// cargo-audit: `Severity:  7.5 (high)`.
static CARGO_AUDIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Severity:\s*(?:[\d.]+\s*)?\(?(critical|high|medium|low)\)?")
        .expect("cargo audit pattern")
});
/// bundler-audit: `Criticality: High`.
static BUNDLER_AUDIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Criticality:\s*(critical|high|medium|low)").expect("bundler audit pattern")
});

static WORD_CRITICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcritical\b").expect("critical keyword"));
static WORD_HIGH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhigh\b").expect("high keyword"));
static WORD_MEDIUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:medium|moderate)\b").expect("medium keyword"));
static WORD_LOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blow\b").expect("low keyword"));

/// Severity counts plus the name of the parser that produced them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityFindings {
    pub counts: SeverityCounts,
    pub parser: &'static str,
}

impl SecurityFindings {
    pub fn to_metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(keys::CRITICAL.to_string(), self.counts.critical.into());
        metrics.insert(keys::HIGH.to_string(), self.counts.high.into());
        metrics.insert(keys::MEDIUM.to_string(), self.counts.medium.into());
        metrics.insert(keys::LOW.to_string(), self.counts.low.into());
        metrics.insert("parser".to_string(), self.parser.into());
        metrics
    }
}

fn set_level(counts: &mut SeverityCounts, level: &str, n: u64) {
    match level.to_ascii_lowercase().as_str() {
        "critical" => counts.critical = n,
        "high" => counts.high = n,
        "moderate" | "medium" => counts.medium = n,
        "low" => counts.low = n,
        _ => {}
    }
}

fn bump_level(counts: &mut SeverityCounts, level: &str) {
    match level.to_ascii_lowercase().as_str() {
        "critical" => counts.critical += 1,
        "high" => counts.high += 1,
        "moderate" | "medium" => counts.medium += 1,
        "low" => counts.low += 1,
        _ => {}
    }
}

/// Summary tables repeat themselves; the last value seen per level wins.
fn summary_counts(
    re: &Regex,
    output: &str,
    level_group: usize,
    count_group: usize,
) -> Option<SeverityCounts> {
    let mut counts = SeverityCounts::default();
    let mut matched = false;
    for caps in re.captures_iter(output) {
        let n = caps[count_group].parse::<u64>().unwrap_or(0);
        set_level(&mut counts, &caps[level_group], n);
        matched = true;
    }
    matched.then_some(counts)
}

fn tally(re: &Regex, output: &str) -> Option<SeverityCounts> {
    let mut counts = SeverityCounts::default();
    let mut matched = false;
    for caps in re.captures_iter(output) {
        bump_level(&mut counts, &caps[1]);
        matched = true;
    }
    matched.then_some(counts)
}

fn keyword_counts(output: &str) -> SeverityCounts {
    SeverityCounts {
        critical: WORD_CRITICAL.find_iter(output).count() as u64,
        high: WORD_HIGH.find_iter(output).count() as u64,
        medium: WORD_MEDIUM.find_iter(output).count() as u64,
        low: WORD_LOW.find_iter(output).count() as u64,
    }
}

fn tool_specific(project_type: ProjectType, output: &str) -> Option<SecurityFindings> {
    let found = |counts: SeverityCounts, parser| SecurityFindings { counts, parser };
    match project_type {
        ProjectType::Node => summary_counts(&NODE_JSON, output, 1, 2)
            .map(|c| found(c, "node-json"))
            .or_else(|| summary_counts(&NODE_TEXT, output, 2, 1).map(|c| found(c, "node-text"))),
        ProjectType::Rust => tally(&CARGO_AUDIT, output).map(|c| found(c, "cargo-audit")),
        ProjectType::Ruby => tally(&BUNDLER_AUDIT, output).map(|c| found(c, "bundler-audit")),
        ProjectType::Python | ProjectType::Go | ProjectType::Java | ProjectType::Unknown => None,
    }
}

/// Extract severity counts from an auditor's combined output.
pub fn parse_security_output(project_type: ProjectType, output: &str) -> SecurityFindings {
    tool_specific(project_type, output).unwrap_or_else(|| SecurityFindings {
        counts: keyword_counts(output),
        parser: "keywords",
    })
}
