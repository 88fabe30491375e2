//! Best-effort parsers for tool output.
//!
//! Every parser is total: when nothing recognizable is found the counts are
//! zero, never an error.

mod lint_output;
mod security_output;
mod test_output;

pub use lint_output::{parse_lint_output, LintCounts};
pub use security_output::{parse_security_output, SecurityFindings};
pub use test_output::{parse_test_output, TestCounts};
