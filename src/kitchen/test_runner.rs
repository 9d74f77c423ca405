// src/kitchen/test_runner.rs

//! Post-install test stage

use super::executor::{StageContext, StageExecutor, StageOutcome};
use crate::error::{Error, Result};
use crate::recipe::Stage;
use tracing::info;

/// Outcome of a test run
#[derive(Debug, Clone)]
pub enum TestResult {
    /// Recipe declares no test stage; nothing was spawned
    Skipped,
    /// Test stage exited successfully
    Passed(StageOutcome),
}

impl TestResult {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TestResult::Skipped)
    }
}

/// Runs a recipe's test stage against an installed build tree
pub struct TestRunner<'a> {
    executor: &'a StageExecutor,
}

impl<'a> TestRunner<'a> {
    pub fn new(executor: &'a StageExecutor) -> Self {
        Self { executor }
    }

    /// Run `test_stage` if there is one
    ///
    /// A failing or timed-out test is reported as [`Error::TestFailed`].
    pub fn run_tests(&self, test_stage: Option<&Stage>, ctx: &StageContext) -> Result<TestResult> {
        let Some(stage) = test_stage else {
            info!("No test stage declared, skipping tests");
            return Ok(TestResult::Skipped);
        };

        match self.executor.run_stage(0, stage, ctx) {
            Ok(outcome) => {
                info!("Tests passed in {:?}", outcome.duration);
                Ok(TestResult::Passed(outcome))
            }
            Err(Error::StageFailed { exit_code, output, .. }) => {
                Err(Error::TestFailed { exit_code, output })
            }
            Err(Error::StageTimeout { timeout, .. }) => Err(Error::TestFailed {
                exit_code: None,
                output: format!("test stage timed out after {}s", timeout.as_secs()),
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::recipe::StageKind;
    use tempfile::TempDir;

    fn sh(script: &str) -> Stage {
        Stage::new(StageKind::Test, vec!["sh".into(), "-c".into(), script.into()]).unwrap()
    }

    #[test]
    fn test_no_test_stage_is_skipped() {
        let executor = StageExecutor::new();
        // A context pointing nowhere proves nothing is spawned
        let ctx = StageContext::new("/nonexistent/formulary/source");
        let result = TestRunner::new(&executor).run_tests(None, &ctx).unwrap();
        assert!(result.is_skipped());
    }

    #[test]
    fn test_passing_tests() {
        let dir = TempDir::new().unwrap();
        let executor = StageExecutor::new();
        let result = TestRunner::new(&executor)
            .run_tests(Some(&sh("echo ok")), &StageContext::new(dir.path()))
            .unwrap();
        match result {
            TestResult::Passed(outcome) => assert_eq!(outcome.output, "ok\n"),
            TestResult::Skipped => panic!("tests were skipped"),
        }
    }

    #[test]
    fn test_failing_tests() {
        let dir = TempDir::new().unwrap();
        let executor = StageExecutor::new();
        let err = TestRunner::new(&executor)
            .run_tests(Some(&sh("echo 1 of 3 failed; exit 1")), &StageContext::new(dir.path()))
            .unwrap_err();
        match err {
            Error::TestFailed { exit_code, output } => {
                assert_eq!(exit_code, Some(1));
                assert!(output.contains("1 of 3 failed"));
            }
            other => panic!("expected TestFailed, got {other:?}"),
        }
    }
}
