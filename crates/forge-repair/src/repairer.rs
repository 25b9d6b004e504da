//! Pass trait and the ordered pass runner

use crate::outcome::{RepairOptions, RepairOutcome};
use crate::passes;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What one pass did to the text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassResult {
    /// Replacement text, when the pass changed anything
    pub text: Option<String>,
    /// Fix messages
    pub fixes: Vec<String>,
    /// Warnings
    pub warnings: Vec<String>,
}

impl PassResult {
    /// Nothing to do
    #[inline]
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Text rewritten with one fix message
    #[inline]
    #[must_use]
    pub fn fixed(text: String, fix: &str) -> Self {
        Self {
            text: Some(text),
            fixes: vec![fix.to_string()],
            warnings: Vec::new(),
        }
    }

    /// Add a warning
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// One repair heuristic.
///
/// Passes are pure: same text and options, same result. Running a pass on its
/// own output must report no fixes.
pub trait RepairPass: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Higher runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Inspect `text` and propose a rewrite
    fn apply(&self, text: &str, options: &RepairOptions) -> PassResult;
}

/// Ordered set of passes
pub struct Repairer {
    passes: Vec<Box<dyn RepairPass>>,
}

impl std::fmt::Debug for Repairer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repairer")
            .field("passes", &self.pass_names())
            .finish()
    }
}

impl Default for Repairer {
    fn default() -> Self {
        let mut repairer = Self::empty();
        for pass in passes::default_passes() {
            repairer.passes.push(pass);
        }
        repairer.sort();
        repairer
    }
}

impl Repairer {
    /// No passes; only the final parse check runs
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass
    pub fn register<P: RepairPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
        self.sort();
    }

    /// Replace the pass named `name`, returning whether one was replaced
    pub fn replace<P: RepairPass + 'static>(&mut self, name: &str, pass: P) -> bool {
        let before = self.passes.len();
        self.passes.retain(|p| p.name() != name);
        let removed = self.passes.len() != before;
        self.register(pass);
        removed
    }

    /// Pass names in run order
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    fn sort(&mut self) {
        // stable, so equal priorities keep registration order
        self.passes.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Run every pass, then check the result parses.
    ///
    /// Never fails: a pass that panics is skipped and logged, and the worst
    /// case is the input back with `still_invalid` set.
    #[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
    #[must_use]
    pub fn run(&self, source: &str, options: &RepairOptions) -> RepairOutcome {
        let mut text = source.to_string();
        let mut applied_fixes: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        for pass in &self.passes {
            let result = match catch_unwind(AssertUnwindSafe(|| pass.apply(&text, options))) {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(target: "forge_repair", pass = pass.name(), "repair pass panicked, skipped");
                    continue;
                }
            };
            if let Some(rewritten) = result.text {
                text = rewritten;
            }
            for fix in result.fixes {
                tracing::info!(target: "forge_repair", pass = pass.name(), fix = %fix, "applied fix");
                if !applied_fixes.contains(&fix) {
                    applied_fixes.push(fix);
                }
            }
            for warning in result.warnings {
                tracing::debug!(target: "forge_repair", pass = pass.name(), %warning, "repair warning");
                warnings.push(warning);
            }
        }

        let parse_error = match forge_syntax::parse(&text) {
            Ok(parsed) => parsed.first_issue().map(|issue| issue.to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(error) = &parse_error {
            tracing::info!(target: "forge_repair", %error, "source still invalid after repair");
        }

        RepairOutcome {
            repaired_text: text,
            applied_fixes,
            warnings,
            still_invalid: parse_error.is_some(),
            parse_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    impl RepairPass for Shout {
        fn name(&self) -> &'static str {
            "shout"
        }

        fn priority(&self) -> i32 {
            1000
        }

        fn apply(&self, text: &str, _options: &RepairOptions) -> PassResult {
            if text.contains("quiet") {
                PassResult::fixed(text.replace("quiet", "loud"), "shouted")
            } else {
                PassResult::unchanged()
            }
        }
    }

    struct Explodes;

    impl RepairPass for Explodes {
        fn name(&self) -> &'static str {
            "explodes"
        }

        fn apply(&self, _text: &str, _options: &RepairOptions) -> PassResult {
            panic!("heuristic bug")
        }
    }

    #[test]
    fn default_order() {
        assert_eq!(
            Repairer::default().pass_names(),
            vec![
                "duplicate-binding",
                "markup-escape",
                "registration-style",
                "missing-export",
                "tag-balance",
            ]
        );
    }

    #[test]
    fn custom_pass_runs_first_by_priority() {
        let mut repairer = Repairer::default();
        repairer.register(Shout);
        assert_eq!(repairer.pass_names()[0], "shout");
        let outcome = repairer.run("const quiet = 1;", &RepairOptions::default());
        assert_eq!(outcome.repaired_text, "const loud = 1;");
        assert_eq!(outcome.applied_fixes, vec!["shouted".to_string()]);
    }

    #[test]
    fn panicking_pass_is_skipped() {
        let mut repairer = Repairer::empty();
        repairer.register(Explodes);
        let outcome = repairer.run("let a = 1;", &RepairOptions::default());
        assert_eq!(outcome.repaired_text, "let a = 1;");
        assert!(!outcome.still_invalid);
    }

    #[test]
    fn replace_swaps_named_pass() {
        let mut repairer = Repairer::default();
        assert!(repairer.replace("markup-escape", Shout));
        assert!(!repairer.pass_names().contains(&"markup-escape"));
    }
}
