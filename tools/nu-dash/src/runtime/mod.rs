use crate::errors::DashError;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TIMEOUT_POLL: Duration = Duration::from_millis(10);
const KILLED_OUTPUT_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Complete child environment. `None` inherits the parent's.
    pub env: Option<Vec<(String, String)>>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// `-1` when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out_after: Option<Duration>,
}

impl ProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out_after: None,
        }
    }

    pub fn failure(&self) -> Option<String> {
        if let Some(limit) = self.timed_out_after {
            return Some(format!("timed out after {limit:?}"));
        }
        match self.exit_code {
            0 => None,
            -1 => Some("terminated by signal".to_string()),
            code => Some(format!("exit status {code}")),
        }
    }

    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Runs to completion with captured output. Only a spawn failure is an `Err`;
    /// a non-zero exit is reported through [`ProcessOutput::failure`].
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, DashError>;

    /// Runs with the parent's stdio attached and returns the exit code.
    fn run_interactive(&self, request: ProcessRequest) -> Result<i32, DashError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, DashError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn stdin_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), DashError>;
    fn wait_for_enter(&self, prompt: &str) -> Result<(), DashError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, DashError> {
        std::fs::read_to_string(path)
            .map_err(|e| DashError::Io(format!("{}: {e}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Default)]
pub struct ProductionProcessRunner;

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn command_for(request: &ProcessRequest) -> Command {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args);
    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = &request.env {
        cmd.env_clear();
        cmd.envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())));
    }
    cmd
}

/// Kills the child's whole process group so grandchildren die with it.
#[cfg(unix)]
fn kill_tree(child: &mut std::process::Child) {
    let Ok(pgid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut std::process::Child) {
    let _ = child.kill();
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        let _ = tx.send(buffer);
    });
    rx
}

fn collect_output(reader: Option<mpsc::Receiver<Vec<u8>>>, killed: bool) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    // A killed child may leave grandchildren holding the pipe open.
    let bytes = if killed {
        reader.recv_timeout(KILLED_OUTPUT_GRACE).unwrap_or_default()
    } else {
        reader.recv().unwrap_or_default()
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

fn wait_with_deadline(
    child: &mut std::process::Child,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, bool), DashError> {
    let Some(timeout) = timeout else {
        let status = child
            .wait()
            .map_err(|e| DashError::Process(e.to_string()))?;
        return Ok((status, false));
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| DashError::Process(e.to_string()))?
        {
            return Ok((status, false));
        }
        if started.elapsed() >= timeout {
            kill_tree(child);
            let status = child
                .wait()
                .map_err(|e| DashError::Process(e.to_string()))?;
            return Ok((status, true));
        }
        std::thread::sleep(TIMEOUT_POLL);
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, DashError> {
        let mut cmd = command_for(&request);
        let stdin = if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        cmd.stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            DashError::Process(format!("failed to spawn `{}`: {e}", request.program))
        })?;

        let writer = match (child.stdin.take(), request.stdin) {
            (Some(mut pipe), Some(input)) => Some(std::thread::spawn(move || {
                // The child may exit without reading its input.
                let _ = pipe.write_all(input.as_bytes());
            })),
            _ => None,
        };
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let (status, killed) = wait_with_deadline(&mut child, request.timeout)?;
        // After a kill the writer may still be blocked on a full pipe; leave it detached.
        if let Some(writer) = writer.filter(|_| !killed) {
            let _ = writer.join();
        }

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: collect_output(stdout, killed),
            stderr: collect_output(stderr, killed),
            timed_out_after: if killed { request.timeout } else { None },
        })
    }

    fn run_interactive(&self, request: ProcessRequest) -> Result<i32, DashError> {
        let status = command_for(&request)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                DashError::Process(format!("failed to spawn `{}`: {e}", request.program))
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdin_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdin())
    }

    fn write_line(&self, line: &str) -> Result<(), DashError> {
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| DashError::Io(e.to_string()))
    }

    fn wait_for_enter(&self, prompt: &str) -> Result<(), DashError> {
        let mut out = std::io::stdout();
        write!(out, "{prompt}").map_err(|e| DashError::Io(e.to_string()))?;
        out.flush().map_err(|e| DashError::Io(e.to_string()))?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| DashError::Io(e.to_string()))?;
        Ok(())
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner::new()),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.set_file(path, contents);
        fs
    }

    pub fn set_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }

    pub fn remove_file(&self, path: &Path) {
        self.files.lock().expect("files lock").remove(path);
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, DashError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| DashError::Io(format!("missing file {}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    pause_error: Arc<Mutex<Option<String>>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    /// Makes every later `wait_for_enter` fail with `message`.
    pub fn fail_pauses(&self, message: &str) {
        *self.pause_error.lock().expect("pause lock") = Some(message.to_string());
    }
}

impl Terminal for FakeTerminal {
    fn stdin_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), DashError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn wait_for_enter(&self, prompt: &str) -> Result<(), DashError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        match self.pause_error.lock().expect("pause lock").clone() {
            Some(message) => Err(DashError::Io(message)),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct ScriptedResponse {
    needle: String,
    delay: Option<Duration>,
    output: Result<ProcessOutput, String>,
}

/// Answers by matching a substring of the command line; falls back to a FIFO queue.
#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    scripted: Arc<Mutex<Vec<ScriptedResponse>>>,
    queued: Arc<Mutex<VecDeque<Result<ProcessOutput, String>>>>,
    interactive: Arc<Mutex<VecDeque<Result<i32, String>>>>,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
    interactive_requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl FakeProcessRunner {
    pub fn on_command(&self, needle: &str, output: Result<ProcessOutput, String>) {
        self.scripted
            .lock()
            .expect("scripted lock")
            .push(ScriptedResponse {
                needle: needle.to_string(),
                delay: None,
                output,
            });
    }

    pub fn on_command_delayed(&self, needle: &str, delay: Duration, output: ProcessOutput) {
        self.scripted
            .lock()
            .expect("scripted lock")
            .push(ScriptedResponse {
                needle: needle.to_string(),
                delay: Some(delay),
                output: Ok(output),
            });
    }

    pub fn push_response(&self, output: Result<ProcessOutput, String>) {
        self.queued.lock().expect("queue lock").push_back(output);
    }

    pub fn push_interactive(&self, exit: Result<i32, String>) {
        self.interactive
            .lock()
            .expect("interactive lock")
            .push_back(exit);
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn interactive_requests(&self) -> Vec<ProcessRequest> {
        self.interactive_requests
            .lock()
            .expect("interactive requests lock")
            .clone()
    }

    pub fn invoked(&self, needle: &str) -> bool {
        self.requests()
            .iter()
            .any(|request| request.command_line().contains(needle))
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, DashError> {
        let line = request.command_line();
        self.requests
            .lock()
            .expect("requests lock")
            .push(request);

        let scripted = self
            .scripted
            .lock()
            .expect("scripted lock")
            .iter()
            .find(|entry| line.contains(&entry.needle))
            .cloned();
        let output = match scripted {
            Some(entry) => {
                if let Some(delay) = entry.delay {
                    std::thread::sleep(delay);
                }
                entry.output
            }
            None => self
                .queued
                .lock()
                .expect("queue lock")
                .pop_front()
                .unwrap_or_else(|| Err(format!("no fake response for `{line}`"))),
        };
        output.map_err(DashError::Process)
    }

    fn run_interactive(&self, request: ProcessRequest) -> Result<i32, DashError> {
        self.interactive_requests
            .lock()
            .expect("interactive requests lock")
            .push(request);
        self.interactive
            .lock()
            .expect("interactive lock")
            .pop_front()
            .unwrap_or(Ok(0))
            .map_err(DashError::Process)
    }
}
