//! Test runner output parsing.
//!
//! Fallback chain, first match wins: Jest/Vitest summary line, Rust
//! `test result:` lines, pytest summary banner, Go `--- PASS/FAIL/SKIP`
//! markers, any `N passed` / `N failed` phrase, literal `PASS`/`FAIL` tokens.
//! When nothing matches every count is zero. Counts are informational; the test
//! stage's status comes from the exit code alone.

use regex::Regex;
use std::sync::LazyLock;

use bounty_vet_domain::{keys, Metrics};

static JEST_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Tests:?\s+(.*\d+\s+(?:passed|failed).*)$").expect("jest summary pattern")
});
static RUST_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored")
        .expect("rust result pattern")
});
static PYTEST_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^=+ (.+) in [\d.]+s(?: \([^)]*\))? =+\s*$").expect("pytest summary pattern")
});
static GO_PASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*--- PASS:").expect("go pass pattern"));
static GO_FAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*--- FAIL:").expect("go fail pattern"));
static GO_SKIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*--- SKIP:").expect("go skip pattern"));
static PASSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+passed").expect("passed pattern"));
static FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+failed").expect("failed pattern"));
static SKIPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+(?:skipped|pending|todo)").expect("skipped pattern"));
static ERRORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+errors?\b").expect("errors pattern"));
static PASS_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bPASS\b").expect("pass token pattern"));
static FAIL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bFAIL\b").expect("fail token pattern"));

static COVERAGE: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"All files\s*\|\s*([\d.]+)").expect("istanbul coverage pattern"),
        Regex::new(r"(?m)^TOTAL\s+.*?(\d+(?:\.\d+)?)%\s*$").expect("pytest-cov pattern"),
        Regex::new(r"coverage:\s*([\d.]+)% of statements").expect("go coverage pattern"),
    ]
});

/// Counts extracted from a test run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCounts {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub coverage: Option<f64>,
    /// Which parser matched (`jest`, `rust`, `pytest`, `go`, `generic`, `tokens`, `none`).
    pub parser: &'static str,
}

impl TestCounts {
    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.skipped
    }

    pub fn to_metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(keys::TESTS_PASSED.to_string(), self.passed.into());
        metrics.insert(keys::TESTS_FAILED.to_string(), self.failed.into());
        metrics.insert(keys::TESTS_SKIPPED.to_string(), self.skipped.into());
        if let Some(coverage) = self.coverage {
            metrics.insert(keys::COVERAGE.to_string(), coverage.into());
        }
        metrics.insert("parser".to_string(), self.parser.into());
        metrics
    }
}

fn first_count(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn counts_in(text: &str, parser: &'static str) -> Option<TestCounts> {
    let passed = first_count(&PASSED, text);
    let failed = first_count(&FAILED, text);
    let skipped = first_count(&SKIPPED, text);
    if passed.is_none() && failed.is_none() {
        return None;
    }
    Some(TestCounts {
        passed: passed.unwrap_or(0),
        failed: failed.unwrap_or(0),
        skipped: skipped.unwrap_or(0),
        coverage: None,
        parser,
    })
}

fn parse_jest(output: &str) -> Option<TestCounts> {
    let line = JEST_SUMMARY.captures(output)?.get(1)?.as_str();
    counts_in(line, "jest")
}

fn parse_rust(output: &str) -> Option<TestCounts> {
    let mut counts = TestCounts {
        parser: "rust",
        ..Default::default()
    };
    let mut matched = false;
    for caps in RUST_RESULT.captures_iter(output) {
        matched = true;
        let n = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
        counts.passed += n(1);
        counts.failed += n(2);
        counts.skipped += n(3);
    }
    matched.then_some(counts)
}

fn parse_pytest(output: &str) -> Option<TestCounts> {
    let summary = PYTEST_SUMMARY.captures_iter(output).last()?;
    let line = summary.get(1)?.as_str();
    let mut counts = counts_in(line, "pytest")?;
    counts.failed += first_count(&ERRORS, line).unwrap_or(0);
    Some(counts)
}

fn parse_go(output: &str) -> Option<TestCounts> {
    let counts = TestCounts {
        passed: GO_PASS.find_iter(output).count() as u64,
        failed: GO_FAIL.find_iter(output).count() as u64,
        skipped: GO_SKIP.find_iter(output).count() as u64,
        coverage: None,
        parser: "go",
    };
    (counts.total() > 0).then_some(counts)
}

fn parse_tokens(output: &str) -> Option<TestCounts> {
    let counts = TestCounts {
        passed: PASS_TOKEN.find_iter(output).count() as u64,
        failed: FAIL_TOKEN.find_iter(output).count() as u64,
        skipped: 0,
        coverage: None,
        parser: "tokens",
    };
    (counts.total() > 0).then_some(counts)
}

fn parse_coverage(output: &str) -> Option<f64> {
    COVERAGE.iter().find_map(|re| {
        re.captures_iter(output)
            .last()
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    })
}

/// Extract passed/failed/skipped/coverage from test runner output.
pub fn parse_test_output(output: &str) -> TestCounts {
    let mut counts = parse_jest(output)
        .or_else(|| parse_rust(output))
        .or_else(|| parse_pytest(output))
        .or_else(|| parse_go(output))
        .or_else(|| counts_in(output, "generic"))
        .or_else(|| parse_tokens(output))
        .unwrap_or(TestCounts {
            parser: "none",
            ..Default::default()
        });
    counts.coverage = parse_coverage(output);
    counts
}
