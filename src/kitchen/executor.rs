// src/kitchen/executor.rs

//! Stage execution
//!
//! Each stage runs as a subprocess: the argv is executed directly (no
//! shell), in the stage's working directory under the source root, with
//! stdin nulled and stdout/stderr drained on reader threads so a chatty
//! build can never fill a pipe and stall. Stages run strictly in order and
//! the first failure stops the sequence.

use crate::error::{Error, Result};
use crate::recipe::{substitute, Stage, StageKind};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Captured output kept per stage (tail end)
const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

/// Consecutive read errors after which a reader gives up on its pipe
const MAX_READ_ERRORS: usize = 16;

/// Everything a stage needs besides its own argv
#[derive(Debug, Clone)]
pub struct StageContext {
    source_dir: PathBuf,
    env: BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
}

impl StageContext {
    /// Context rooted at the unpacked source tree
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            env: BTreeMap::new(),
            vars: BTreeMap::new(),
        }
    }

    /// Add an environment variable for every stage
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables; values are substituted first
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (k, v) in vars {
            let value = substitute(v, &self.vars);
            self.env.insert(k.clone(), value);
        }
        self
    }

    /// Set the `%(key)s` substitutions applied to argv
    pub fn with_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// argv for `stage` with substitutions applied
    pub fn render(&self, stage: &Stage) -> Vec<String> {
        stage
            .command()
            .iter()
            .map(|arg| substitute(arg, &self.vars))
            .collect()
    }
}

/// A stage that ran to a successful exit
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub index: usize,
    pub kind: StageKind,
    pub command: Vec<String>,
    pub output: String,
    pub duration: Duration,
}

/// Outcome of a whole stage sequence
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub stages: Vec<StageOutcome>,
}

impl ExecutionResult {
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

/// Runs recipe stages as subprocesses
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    timeout: Option<Duration>,
}

impl StageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any stage running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `stages` in order, stopping at the first failure
    pub fn run(&self, stages: &[Stage], ctx: &StageContext) -> Result<ExecutionResult> {
        self.run_with(stages, ctx, |_, _| Ok(()))
    }

    /// Like [`StageExecutor::run`], calling `before_stage` ahead of each stage
    ///
    /// An error from the callback aborts the sequence before the stage spawns.
    pub fn run_with<F>(
        &self,
        stages: &[Stage],
        ctx: &StageContext,
        mut before_stage: F,
    ) -> Result<ExecutionResult>
    where
        F: FnMut(usize, &Stage) -> Result<()>,
    {
        let mut result = ExecutionResult::default();
        for (index, stage) in stages.iter().enumerate() {
            before_stage(index, stage)?;
            result.stages.push(self.run_stage(index, stage, ctx)?);
        }
        Ok(result)
    }

    /// Run a single stage
    pub fn run_stage(&self, index: usize, stage: &Stage, ctx: &StageContext) -> Result<StageOutcome> {
        let argv = ctx.render(stage);
        let workdir = stage.workdir_in(ctx.source_dir());
        info!("[{}] {}", stage.kind(), argv.join(" "));
        debug!("Working directory: {}", workdir.display());

        let started = Instant::now();
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(&workdir)
            .envs(&ctx.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout can take down the whole stage
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command
            .spawn()
            .map_err(|e| Error::StageFailed {
                stage_index: index,
                kind: stage.kind(),
                exit_code: None,
                output: format!("failed to spawn '{}' in {}: {}", argv[0], workdir.display(), e),
            })?;

        let readers = OutputReaders::start(&mut child, stage.kind());
        let status = match self.wait(&mut child) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let timeout = self.timeout.unwrap_or_default();
                warn!("{} stage #{} exceeded {:?}, killing it", stage.kind(), index, timeout);
                kill_stage(&mut child);
                // A process that left the group may still hold the pipes
                drop(readers);
                return Err(Error::StageTimeout {
                    stage_index: index,
                    kind: stage.kind(),
                    timeout,
                });
            }
            Err(e) => {
                kill_stage(&mut child);
                drop(readers);
                return Err(e.into());
            }
        };
        let output = readers.finish();
        let duration = started.elapsed();

        if !status.success() {
            return Err(Error::StageFailed {
                stage_index: index,
                kind: stage.kind(),
                exit_code: status.code(),
                output,
            });
        }

        debug!("{} stage #{} finished in {:?}", stage.kind(), index, duration);
        Ok(StageOutcome {
            index,
            kind: stage.kind(),
            command: argv,
            output,
            duration,
        })
    }

    fn wait(&self, child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
        match self.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        }
    }
}

/// Kill a stage's process group and reap its leader
fn kill_stage(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Ok(pgid) = i32::try_from(child.id())
            && let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL)
        {
            debug!("killpg({}) failed: {}", pgid, e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Reader threads draining a child's stdout and stderr
struct OutputReaders {
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

impl OutputReaders {
    fn start(child: &mut Child, kind: StageKind) -> Self {
        Self {
            stdout: child.stdout.take().map(|r| spawn_reader(r, kind)),
            stderr: child.stderr.take().map(|r| spawn_reader(r, kind)),
        }
    }

    /// Join both readers and combine their output, stdout first
    fn finish(self) -> String {
        let join = |handle: Option<JoinHandle<String>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };
        let mut output = join(self.stdout);
        output.push_str(&join(self.stderr));
        truncate_front(output, MAX_CAPTURED_OUTPUT)
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, kind: StageKind) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut captured = String::new();
        let mut buf = Vec::new();
        let mut errors = 0;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => errors = 0,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Keep the pipe open; the child must never see EPIPE
                    errors += 1;
                    if errors >= MAX_READ_ERRORS {
                        warn!("Giving up on {} stage output: {}", kind, e);
                        break;
                    }
                    continue;
                }
            }
            // Build tools print file names in any encoding
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            debug!("[{}] {}", kind, line);
            captured.push_str(line);
            captured.push('\n');
            if captured.len() > MAX_CAPTURED_OUTPUT * 2 {
                captured = truncate_front(captured, MAX_CAPTURED_OUTPUT);
            }
        }
        captured
    })
}

/// Keep at most `max` trailing bytes, cut on a char boundary
fn truncate_front(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}
