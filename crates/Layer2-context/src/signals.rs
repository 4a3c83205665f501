//! Pass/fail signal detection in tool output
//!
//! Failure vocabulary is checked before success vocabulary, so
//! `test result: FAILED. 12 passed; 3 failed` reads as a failure.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::turn::ToolOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

/// What a signal talks about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalScope {
    Test,
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signal {
    pub verdict: Verdict,
    pub scope: SignalScope,
}

impl Signal {
    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn is_test_pass(&self) -> bool {
        self.is_pass() && self.scope == SignalScope::Test
    }

    pub fn is_build_pass(&self) -> bool {
        self.is_pass() && self.scope == SignalScope::Build
    }
}

struct Patterns {
    fail: Option<Regex>,
    test_pass: Option<Regex>,
    build_pass: Option<Regex>,
    test_word: Option<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        fail: compile(
            r"(?i)test result: failed|tests? failed|build failed|compilation failed|could not compile|\b[1-9]\d*\s+(?:tests?\s+)?(?:failed|failing)\b|\bfailed:|\berror(?:\[e\d+\])?:|panicked at|\bfailures:",
        ),
        test_pass: compile(
            r"(?i)all \d+ tests? passed|\b\d+ (?:tests? )?passed|tests? passed|test result: ok|tests? succeeded|\d+ passing\b",
        ),
        build_pass: compile(
            r"(?i)build succeeded|build passed|build successful|built successfully|compiled successfully|compilation succeeded|finished .*target",
        ),
        test_word: compile(r"(?i)\btests?\b|\bspecs?\b"),
    })
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(error = %e, "Invalid signal pattern, disabled");
            None
        }
    }
}

fn matches(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Classify free text
pub fn classify(text: &str) -> Option<Signal> {
    let p = patterns();
    if matches(&p.fail, text) {
        let scope = if matches(&p.test_word, text) {
            SignalScope::Test
        } else {
            SignalScope::Build
        };
        return Some(Signal {
            verdict: Verdict::Fail,
            scope,
        });
    }
    if matches(&p.test_pass, text) {
        return Some(Signal {
            verdict: Verdict::Pass,
            scope: SignalScope::Test,
        });
    }
    if matches(&p.build_pass, text) {
        return Some(Signal {
            verdict: Verdict::Pass,
            scope: SignalScope::Build,
        });
    }
    None
}

/// Classify a tool result
///
/// Pass vocabulary from a tool that itself failed is read as a failure.
pub fn classify_outcome(outcome: &ToolOutcome) -> Option<Signal> {
    let signal = classify(&outcome.text())?;
    if signal.is_pass() && !outcome.success {
        return Some(Signal {
            verdict: Verdict::Fail,
            scope: signal.scope,
        });
    }
    Some(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        let p = patterns();
        assert!(p.fail.is_some());
        assert!(p.test_pass.is_some());
        assert!(p.build_pass.is_some());
        assert!(p.test_word.is_some());
    }

    #[test]
    fn test_passing_vocabulary() {
        for text in [
            "All 15 tests passed",
            "test result: ok. 15 passed; 0 failed; 0 ignored",
            "Tests passed",
            "  42 passing (3s)",
        ] {
            let signal = classify(text).unwrap_or_else(|| panic!("no signal for {text:?}"));
            assert!(signal.is_test_pass(), "{text:?}");
        }
    }

    #[test]
    fn test_failing_vocabulary() {
        for text in [
            "FAILED: 3 tests failed",
            "test result: FAILED. 12 passed; 3 failed",
            "error[E0308]: mismatched types",
            "thread 'main' panicked at src/lib.rs:3:5",
            "Build failed with 2 errors",
        ] {
            let signal = classify(text).unwrap_or_else(|| panic!("no signal for {text:?}"));
            assert_eq!(signal.verdict, Verdict::Fail, "{text:?}");
        }
    }

    #[test]
    fn test_build_pass() {
        let signal = classify("Finished `dev` profile [unoptimized] target(s) in 2.31s").unwrap();
        assert!(signal.is_build_pass());
        assert!(classify("Compiled successfully").unwrap().is_build_pass());
    }

    #[test]
    fn test_no_signal() {
        assert!(classify("Updated 3 lines in auth.rs").is_none());
        assert!(classify("0 failed").is_none());
    }

    #[test]
    fn test_pass_text_on_failed_tool_is_failure() {
        let outcome = ToolOutcome::failure("exit code 1").with_output("2 passed");
        assert_eq!(classify_outcome(&outcome).unwrap().verdict, Verdict::Fail);
    }
}
