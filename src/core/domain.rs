use std::path::PathBuf;

/// Limits shared by every run of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionBudget {
    pub time_limit_seconds: f64,
    pub memory_limit_bytes: u64,
    pub parallelism: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestCase {
    pub task: String,
    pub directory: PathBuf,
    pub input_file: String,
    pub output_file: String,
}

impl TestCase {
    pub fn input_path(&self) -> PathBuf {
        self.directory.join(&self.input_file)
    }

    pub fn reference_path(&self) -> PathBuf {
        self.directory.join(&self.output_file)
    }
}

/// How the program under test receives its input and produces its output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IoMode {
    /// Input on stdin, output captured from stdout.
    #[default]
    Stream,
    /// USACO style: the program opens `TASK.in` and writes `TASK.out`
    /// in its working directory.
    File,
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub executable: PathBuf,
    pub io_mode: IoMode,
    pub budget: ExecutionBudget,
    pub presentation_error_is_failure: bool,
}

/// Resource usage observed for one supervised process.
///
/// `cpu_seconds` and `peak_memory_bytes` are running maxima over all samples
/// taken so far, so they never decrease within a run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunMetrics {
    pub cpu_seconds: f64,
    pub peak_memory_bytes: u64,
    pub timed_out: bool,
    pub mem_exceeded: bool,
    pub exit_code: Option<i32>,
}

impl RunMetrics {
    pub fn record(&mut self, cpu_seconds: f64, memory_bytes: u64) {
        self.cpu_seconds = self.cpu_seconds.max(cpu_seconds);
        self.peak_memory_bytes = self.peak_memory_bytes.max(memory_bytes);
    }

    pub fn evaluate(&mut self, budget: &ExecutionBudget) {
        self.timed_out = self.cpu_seconds > budget.time_limit_seconds;
        self.mem_exceeded = self.peak_memory_bytes > budget.memory_limit_bytes;
    }

    pub fn limit_exceeded(&self) -> bool {
        self.timed_out || self.mem_exceeded
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunResult {
    Passed,
    PresentationError,
    WrongAnswer,
    TimeLimit,
    MemoryLimit,
    RuntimeError,
}

impl RunResult {
    pub fn is_failure(self, presentation_error_is_failure: bool) -> bool {
        match self {
            RunResult::Passed => false,
            RunResult::PresentationError => presentation_error_is_failure,
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Waiting,
    Running,
    Checking,
    Done(RunResult),
}

impl RunStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Done(_))
    }

    pub fn result(&self) -> Option<RunResult> {
        match self {
            RunStatus::Done(result) => Some(*result),
            _ => None,
        }
    }
}
