use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::checkers::byte_equality;
use crate::core::domain::{
    BatchConfig, ExecutionBudget, IoMode, RunMetrics, RunResult, RunStatus, TestCase,
};
use crate::core::supervisor::{AbortSignal, ProcessSupervisor};
use crate::core::traits::checker::{Checker, Verdict};
use crate::core::traits::sampler::{Launch, SpawnError, UsageSampler};

/// What the scoreboard sees of a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunState {
    pub status: RunStatus,
    pub metrics: RunMetrics,
    pub diagnostic: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("failed to prepare test data: {0}")]
    Io(#[from] io::Error),
}

/// One test case going through WAITING -> RUNNING -> CHECKING -> DONE.
///
/// Only the worker executing the run writes its state; readers get
/// snapshots through the watch channel.
#[derive(Debug)]
pub struct Run {
    case: TestCase,
    state: watch::Sender<RunState>,
    abort: Arc<AbortSignal>,
}

impl Run {
    pub fn new(case: TestCase) -> Self {
        let (state, _) = watch::channel(RunState::default());
        Self {
            case,
            state,
            abort: Arc::default(),
        }
    }

    pub fn case(&self) -> &TestCase {
        &self.case
    }

    pub fn snapshot(&self) -> RunState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    #[tracing::instrument(skip_all, fields(input = %self.case.input_file))]
    pub async fn execute(
        &self,
        config: &BatchConfig,
        sampler: Arc<dyn UsageSampler>,
        checker: Arc<dyn Checker>,
    ) -> RunResult {
        let supervisor = ProcessSupervisor::new(sampler, self.abort.clone());
        let outcome = match config.io_mode {
            IoMode::Stream => self.execute_streamed(config, &supervisor, checker).await,
            IoMode::File => self.execute_in_workdir(config, &supervisor, checker).await,
        };

        let (result, diagnostic) = match outcome {
            Ok(result) => (result, None),
            Err(e) => {
                tracing::warn!("Run failed: {}", e);
                (RunResult::RuntimeError, Some(e.to_string()))
            }
        };
        self.finish(result, diagnostic);
        result
    }

    async fn execute_streamed(
        &self,
        config: &BatchConfig,
        supervisor: &ProcessSupervisor,
        checker: Arc<dyn Checker>,
    ) -> Result<RunResult, RunError> {
        let input = File::open(self.case.input_path())?;
        let output = tempfile::NamedTempFile::new()?;
        let launch = Launch {
            program: config.executable.clone(),
            stdin: Some(input),
            stdout: Some(output.reopen()?),
            cwd: None,
        };

        let metrics = self.supervise(supervisor, launch, &config.budget).await?;
        self.grade(&metrics, checker, output.path().to_path_buf())
            .await
    }

    async fn execute_in_workdir(
        &self,
        config: &BatchConfig,
        supervisor: &ProcessSupervisor,
        checker: Arc<dyn Checker>,
    ) -> Result<RunResult, RunError> {
        let workdir = tempfile::tempdir()?;
        let task = &self.case.task;
        fs::copy(self.case.input_path(), workdir.path().join(format!("{}.in", task)))?;
        let output = workdir.path().join(format!("{}.out", task));
        let launch = Launch {
            program: std::path::absolute(&config.executable)?,
            stdin: None,
            stdout: None,
            cwd: Some(workdir.path().to_path_buf()),
        };

        let metrics = self.supervise(supervisor, launch, &config.budget).await?;
        if !output.exists() {
            // Nothing written counts as empty output.
            File::create(&output)?;
        }
        self.grade(&metrics, checker, output).await
    }

    async fn supervise(
        &self,
        supervisor: &ProcessSupervisor,
        launch: Launch,
        budget: &ExecutionBudget,
    ) -> Result<RunMetrics, SpawnError> {
        self.set_status(RunStatus::Running);
        let metrics = supervisor
            .run(launch, budget, |metrics| {
                self.state.send_modify(|state| state.metrics = *metrics)
            })
            .await;
        self.set_status(RunStatus::Checking);
        metrics
    }

    async fn grade(
        &self,
        metrics: &RunMetrics,
        checker: Arc<dyn Checker>,
        output: PathBuf,
    ) -> Result<RunResult, RunError> {
        if let Some(result) = classify(metrics) {
            return Ok(result);
        }

        let input = self.case.input_path();
        let reference = self.case.reference_path();
        let verdict = tokio::task::spawn_blocking(move || {
            checker
                .check(&input, &output, &reference)
                .or_else(|e| {
                    tracing::warn!("Checker failed ({}), comparing bytes instead", e);
                    byte_equality(&output, &reference)
                })
        })
        .await
        .map_err(io::Error::other)??;

        Ok(match verdict {
            Verdict::Correct => RunResult::Passed,
            Verdict::PresentationError => RunResult::PresentationError,
            Verdict::WrongAnswer => RunResult::WrongAnswer,
        })
    }

    fn set_status(&self, status: RunStatus) {
        self.state.send_modify(|state| state.status = status);
    }

    fn finish(&self, result: RunResult, diagnostic: Option<String>) {
        self.state.send_if_modified(|state| {
            if state.status.is_done() {
                tracing::error!("Run already finished as {:?}", state.status);
                return false;
            }
            state.status = RunStatus::Done(result);
            state.diagnostic = diagnostic;
            true
        });
    }
}

/// Verdicts that do not need the output. Limits come first: a killed
/// process usually also exits non-zero.
pub fn classify(metrics: &RunMetrics) -> Option<RunResult> {
    if metrics.timed_out {
        Some(RunResult::TimeLimit)
    } else if metrics.mem_exceeded {
        Some(RunResult::MemoryLimit)
    } else if metrics.exit_code != Some(0) {
        Some(RunResult::RuntimeError)
    } else {
        None
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::checkers::diff::DiffChecker;
    use crate::constants::{GIB, MIB};
    use crate::core::traits::checker::{CheckerError, MockChecker};
    use crate::samplers::{SamplerChoice, select};
    use crate::stubs::checker::CheckerStub;
    use crate::stubs::sampler::SamplerStub;
    use crate::stubs::script::script;

    fn test_case(dir: &Path, input: &str, reference: &str) -> TestCase {
        fs::write(dir.join("1.in"), input).unwrap();
        fs::write(dir.join("1.out"), reference).unwrap();
        TestCase {
            task: "sum".to_string(),
            directory: dir.to_path_buf(),
            input_file: "1.in".to_string(),
            output_file: "1.out".to_string(),
        }
    }

    fn config(executable: PathBuf, io_mode: IoMode) -> BatchConfig {
        BatchConfig {
            executable,
            io_mode,
            budget: ExecutionBudget {
                time_limit_seconds: 5.0,
                memory_limit_bytes: 4 * GIB,
                parallelism: 1,
            },
            presentation_error_is_failure: false,
        }
    }

    async fn execute_with(
        body: &str,
        input: &str,
        reference: &str,
        checker: Arc<dyn Checker>,
    ) -> (RunResult, RunState) {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "solution", body);
        let run = Run::new(test_case(dir.path(), input, reference));
        let result = run
            .execute(
                &config(program, IoMode::Stream),
                select(SamplerChoice::Auto).unwrap(),
                checker,
            )
            .await;
        (result, run.snapshot())
    }

    async fn execute(body: &str, input: &str, reference: &str) -> RunResult {
        execute_with(body, input, reference, Arc::new(DiffChecker)).await.0
    }

    #[tokio::test]
    async fn test_correct_answer_passes() {
        let (result, state) = execute_with(
            "read a; read b; echo $((a + b))",
            "5\n3\n",
            "8\n",
            Arc::new(DiffChecker),
        )
        .await;

        assert_eq!(result, RunResult::Passed);
        assert_eq!(state.status, RunStatus::Done(RunResult::Passed));
        assert_eq!(state.metrics.exit_code, Some(0));
        assert_eq!(state.diagnostic, None);
    }

    #[tokio::test]
    async fn test_echo_is_wrong_answer() {
        assert_eq!(execute("cat", "5\n3\n", "8\n").await, RunResult::WrongAnswer);
    }

    #[tokio::test]
    async fn test_trailing_space_is_presentation_error() {
        assert_eq!(
            execute("echo '8 '", "5\n3\n", "8\n").await,
            RunResult::PresentationError
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_after_correct_output() {
        assert_eq!(
            execute("echo 8; exit 1", "5\n3\n", "8\n").await,
            RunResult::RuntimeError
        );
    }

    #[tokio::test]
    async fn test_checker_not_consulted_for_runtime_error() {
        let mut checker = MockChecker::new();
        checker.expect_check().never();

        let (result, _) = execute_with("exit 2", "", "", Arc::new(checker)).await;
        assert_eq!(result, RunResult::RuntimeError);
    }

    #[tokio::test]
    async fn test_checker_verdict_is_mapped() {
        let checker = CheckerStub::new(Verdict::PresentationError, Duration::from_millis(10));
        let (result, _) = execute_with("echo 8", "", "8\n", Arc::new(checker)).await;
        assert_eq!(result, RunResult::PresentationError);
    }

    #[tokio::test]
    async fn test_checker_error_falls_back_to_byte_equality() {
        let mut checker = MockChecker::new();
        checker
            .expect_check()
            .returning(|_, _, _| Err(CheckerError::ToolUnavailable("cmp".to_string())));
        let checker = Arc::new(checker);

        let (exact, _) = execute_with("echo 8", "", "8\n", checker.clone()).await;
        assert_eq!(exact, RunResult::Passed);

        // No presentation error without the checker.
        let (spaced, _) = execute_with("echo '8 '", "", "8\n", checker).await;
        assert_eq!(spaced, RunResult::WrongAnswer);
    }

    #[tokio::test]
    async fn test_missing_executable_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(test_case(dir.path(), "1\n", "1\n"));
        let result = run
            .execute(
                &config(dir.path().join("missing"), IoMode::Stream),
                select(SamplerChoice::Auto).unwrap(),
                Arc::new(DiffChecker),
            )
            .await;

        assert_eq!(result, RunResult::RuntimeError);
        let diagnostic = run.snapshot().diagnostic.unwrap();
        assert!(diagnostic.contains("not found"), "{}", diagnostic);
    }

    #[tokio::test]
    async fn test_missing_input_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "solution", "cat");
        let run = Run::new(TestCase {
            task: "sum".to_string(),
            directory: dir.path().to_path_buf(),
            input_file: "nope.in".to_string(),
            output_file: "nope.out".to_string(),
        });

        let result = run
            .execute(
                &config(program, IoMode::Stream),
                select(SamplerChoice::Auto).unwrap(),
                Arc::new(DiffChecker),
            )
            .await;

        assert_eq!(result, RunResult::RuntimeError);
        assert!(run.snapshot().diagnostic.is_some());
    }

    #[tokio::test]
    async fn test_memory_limit_beats_checker() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "solution", "echo 8; exec sleep 5");
        let mut checker = MockChecker::new();
        checker.expect_check().never();
        let mut config = config(program, IoMode::Stream);
        config.budget.memory_limit_bytes = 256 * MIB;

        let run = Run::new(test_case(dir.path(), "", "8\n"));
        let result = run
            .execute(
                &config,
                Arc::new(SamplerStub::constant(0.01, 2 * GIB)),
                Arc::new(checker),
            )
            .await;

        assert_eq!(result, RunResult::MemoryLimit);
        assert_eq!(run.snapshot().metrics.peak_memory_bytes, 2 * GIB);
    }

    #[tokio::test]
    async fn test_time_limit_beats_memory_limit() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "solution", "exec sleep 5");
        let mut config = config(program, IoMode::Stream);
        config.budget.time_limit_seconds = 1.0;
        config.budget.memory_limit_bytes = MIB;

        let run = Run::new(test_case(dir.path(), "", ""));
        let result = run
            .execute(
                &config,
                Arc::new(SamplerStub::constant(5.0, GIB)),
                Arc::new(DiffChecker),
            )
            .await;

        assert_eq!(result, RunResult::TimeLimit);
    }

    #[tokio::test]
    async fn test_file_mode_reads_task_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            "solution",
            "{ read a; read b; } < sum.in; echo $((a + b)) > sum.out",
        );
        let run = Run::new(test_case(dir.path(), "5\n3\n", "8\n"));

        let result = run
            .execute(
                &config(program, IoMode::File),
                select(SamplerChoice::Auto).unwrap(),
                Arc::new(DiffChecker),
            )
            .await;

        assert_eq!(result, RunResult::Passed);
    }

    #[tokio::test]
    async fn test_file_mode_without_output_is_wrong_answer() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "solution", "echo 8");
        let run = Run::new(test_case(dir.path(), "5\n3\n", "8\n"));

        let result = run
            .execute(
                &config(program, IoMode::File),
                select(SamplerChoice::Auto).unwrap(),
                Arc::new(DiffChecker),
            )
            .await;

        assert_eq!(result, RunResult::WrongAnswer);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_transitions_are_observable() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "solution", "sleep 0.3; echo 8");
        let run = Arc::new(Run::new(test_case(dir.path(), "", "8\n")));
        let mut states = run.subscribe();
        assert_eq!(states.borrow().status, RunStatus::Waiting);

        let running = run.clone();
        let task = tokio::spawn(async move {
            running
                .execute(
                    &config(program, IoMode::Stream),
                    select(SamplerChoice::Auto).unwrap(),
                    Arc::new(DiffChecker),
                )
                .await
        });

        let running = states
            .wait_for(|state| state.status == RunStatus::Running)
            .await
            .is_ok();
        assert!(running);
        assert_eq!(task.await.unwrap(), RunResult::Passed);
        assert_eq!(run.snapshot().status, RunStatus::Done(RunResult::Passed));
    }
}
