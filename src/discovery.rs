//! Finds test data next to the program under test by filename conventions.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use regex::Regex;
use walkdir::WalkDir;

use crate::core::domain::TestCase;

/// `TASK` is replaced by the candidate task name.
const EXAMPLE_PATTERNS: &[(&str, &str)] = &[
    // in1 out1
    (r"in(.+)", r"out(.+)"),
    // task.dummy.in.1 task.dummy.out.1
    (r"TASK\.dummy\.in(.+)", r"TASK\.dummy\.out(.+)"),
];

const FULL_PATTERNS: &[(&str, &str)] = &[
    // task.in.1 task.out.1
    (r"TASK\.in\.(\d+[a-z]*)", r"TASK\.out\.(\d+[a-z]*)"),
    // task.in1 task.ou1
    (r"TASK\.in([0-9a-z])", r"TASK\.ou([0-9a-z])"),
    // task_1.in task_1.out
    (r"TASK_(\d+)\.in", r"TASK_(\d+)\.out"),
    // 1.in 1.out
    (r"(\d+)\.in", r"(\d+)\.out"),
    // task-001.in task-001.ans
    (r"TASK-(.+)\.in", r"TASK-(.+)\.ans"),
];

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no test data found under {}", .0.display())]
    NoTestData(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions<'a> {
    pub examples_only: bool,
    /// Used as the only candidate task name when given.
    pub task: Option<&'a str>,
    pub executable: &'a Path,
}

struct Candidate {
    directory: PathBuf,
    task: String,
    pairs: Vec<(String, String)>,
}

/// Returns the test cases of the (directory, task, pattern) combination
/// with the most input/output pairs, in natural filename order.
pub fn find(root: &Path, options: SearchOptions) -> Result<Vec<TestCase>, DiscoveryError> {
    let patterns: Vec<_> = if options.examples_only {
        EXAMPLE_PATTERNS.to_vec()
    } else {
        EXAMPLE_PATTERNS.iter().chain(FULL_PATTERNS).copied().collect()
    };
    let tasks = candidate_tasks(options);
    tracing::debug!("Trying tasks {:?}", tasks);

    let directories = walk(root).map_err(|e| DiscoveryError::Io {
        path: root.to_path_buf(),
        source: e.into(),
    })?;

    let mut best: Option<Candidate> = None;
    for (directory, filenames) in &directories {
        for task in &tasks {
            for pattern in &patterns {
                let pairs = match_pairs(filenames, task, *pattern);
                if best.as_ref().is_none_or(|best| pairs.len() > best.pairs.len()) {
                    best = Some(Candidate {
                        directory: directory.clone(),
                        task: task.clone(),
                        pairs,
                    });
                }
            }
        }
    }

    let Some(mut best) = best.filter(|best| !best.pairs.is_empty()) else {
        return Err(DiscoveryError::NoTestData(root.to_path_buf()));
    };
    tracing::info!(
        "Found {} test cases in {}, task name is '{}'",
        best.pairs.len(),
        best.directory.display(),
        best.task
    );

    best.pairs.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    Ok(best
        .pairs
        .into_iter()
        .map(|(input_file, output_file)| TestCase {
            task: best.task.clone(),
            directory: best.directory.clone(),
            input_file,
            output_file,
        })
        .collect())
}

fn candidate_tasks(options: SearchOptions) -> Vec<String> {
    let names = match options.task {
        Some(task) => vec![task.to_string()],
        None => {
            let cwd = std::env::current_dir()
                .ok()
                .and_then(|dir| dir.file_name().map(|name| name.to_string_lossy().into_owned()));
            let stem = options
                .executable
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
            cwd.into_iter().chain(stem).collect()
        }
    };
    names.into_iter().map(|name| name.to_lowercase()).unique().collect()
}

/// Collects every directory below `root` with the names of its
/// non-directory entries, both in sorted order. Entries that cannot be read
/// are skipped, only an unreadable root is an error.
fn walk(root: &Path) -> Result<Vec<(PathBuf, Vec<String>)>, walkdir::Error> {
    let mut directories: Vec<(PathBuf, Vec<String>)> = Vec::new();
    let mut index = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            index.insert(entry.path().to_path_buf(), directories.len());
            directories.push((entry.path().to_path_buf(), Vec::new()));
            continue;
        }
        let Some(&slot) = entry.path().parent().and_then(|parent| index.get(parent)) else {
            continue;
        };
        match entry.file_name().to_str() {
            Some(name) => directories[slot].1.push(name.to_string()),
            None => tracing::warn!("Skipping non UTF-8 file name {}", entry.path().display()),
        }
    }
    Ok(directories)
}

fn match_pairs(filenames: &[String], task: &str, pattern: (&str, &str)) -> Vec<(String, String)> {
    let compile = |template: &str| {
        Regex::new(&format!("^{}$", template.replace("TASK", &regex::escape(task))))
    };
    let (Ok(input_re), Ok(output_re)) = (compile(pattern.0), compile(pattern.1)) else {
        tracing::warn!("Invalid pattern for task '{}'", task);
        return Vec::new();
    };

    let mut inputs = HashMap::new();
    let mut outputs = HashMap::new();
    for filename in filenames {
        let lower = filename.to_lowercase();
        if let Some(key) = input_re.captures(&lower).and_then(|c| c.get(1)) {
            inputs.insert(key.as_str().to_string(), filename.clone());
        } else if let Some(key) = output_re.captures(&lower).and_then(|c| c.get(1)) {
            outputs.insert(key.as_str().to_string(), filename.clone());
        }
    }

    inputs
        .into_iter()
        .filter_map(|(key, input)| outputs.remove(&key).map(|output| (input, output)))
        .collect()
}

#[derive(Debug)]
enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

impl Ord for Chunk<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Number(a), Chunk::Number(b)) => {
                let a = a.trim_start_matches('0');
                let b = b.trim_start_matches('0');
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialEq for Chunk<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Chunk<'_> {}

impl PartialOrd for Chunk<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn chunks(name: &str) -> Vec<Chunk<'_>> {
    name.as_bytes()
        .chunk_by(|a, b| a.is_ascii_digit() == b.is_ascii_digit())
        .scan(0, |start, run| {
            let text = &name[*start..*start + run.len()];
            *start += run.len();
            Some(if run[0].is_ascii_digit() {
                Chunk::Number(text)
            } else {
                Chunk::Text(text)
            })
        })
        .collect()
}

/// Orders digit runs by value, so `2.in` sorts before `10.in`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    chunks(a).cmp(&chunks(b)).then_with(|| a.cmp(b))
}
