use crate::command::ManageCommand;
use crate::options::{Options, OptionsError};
use crate::shell::Shell;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const FATAL_MESSAGE: &str = "Django management command failed.";

/// Receives everything the runner reports while a command runs.
pub trait OutputSink: Sync {
    fn stdout_line(&self, line: &str);
    fn stderr_line(&self, line: &str);
    /// The command about to be launched.
    fn acknowledge(&self, command_line: &str);
    fn failure(&self, command_line: &str, detail: &str);
    /// The build cannot continue.
    fn fatal(&self, msg: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminated without an exit code, with the signal number when known.
    Signal(Option<i32>),
}

impl Exit {
    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Exit::Code(code),
            None => Exit::Signal(signal_of(status)),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Exit::Code(0))
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

impl std::fmt::Display for Exit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exit::Code(c) => write!(f, "code {}", c),
            Exit::Signal(Some(s)) => write!(f, "signal {}", s),
            Exit::Signal(None) => write!(f, "signal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub success: bool,
    pub exit: Exit,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error("starting {shell} for {command:?}: {source}")]
    Spawn {
        shell: Shell,
        command: String,
        source: std::io::Error,
    },
    #[error("waiting for {command:?}: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
    #[error("a command is already running in this task context")]
    Busy,
    #[error("task was terminated before the command could run")]
    Terminated,
}

/// A running child the runner can poll and terminate.
pub trait ProcessHandle: Send {
    fn try_wait(&mut self) -> std::io::Result<Option<Exit>>;
    fn wait(&mut self) -> std::io::Result<Exit>;
    fn terminate(&mut self) -> std::io::Result<()>;
}

impl ProcessHandle for Child {
    fn try_wait(&mut self) -> std::io::Result<Option<Exit>> {
        Ok(Child::try_wait(self)?.map(Exit::from_status))
    }

    fn wait(&mut self) -> std::io::Result<Exit> {
        Ok(Exit::from_status(Child::wait(self)?))
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        match self.kill() {
            // Already exited and reaped by the OS.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

fn stop(mut handle: Box<dyn ProcessHandle>) {
    if handle.terminate().is_ok() {
        // Reap so no zombie outlives the host.
        let _ = handle.wait();
    }
}

enum Slot {
    Idle,
    /// Claimed by a run that has not spawned its child yet.
    Reserved,
    Running(Box<dyn ProcessHandle>),
    /// Terminated; nothing may run in this context any more.
    Closed,
}

/// Terminates the child held by a task context, if any.
#[derive(Clone)]
pub struct ExitGuard {
    slot: Arc<Mutex<Slot>>,
}

impl Default for ExitGuard {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Idle)),
        }
    }
}

impl ExitGuard {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claims the slot for a child about to be spawned.
    pub fn reserve(&self) -> Result<(), RunError> {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Idle) {
            *slot = Slot::Reserved;
            return Ok(());
        }
        if matches!(*slot, Slot::Closed) {
            return Err(RunError::Terminated);
        }
        Err(RunError::Busy)
    }

    /// Gives up a reservation whose spawn failed.
    fn release(&self) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Reserved) {
            *slot = Slot::Idle;
        }
    }

    /// Stores `handle` in the reserved slot. If the guard was terminated in
    /// the meantime the handle is stopped at once.
    pub fn attach(&self, handle: Box<dyn ProcessHandle>) -> Result<(), RunError> {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Reserved) {
            *slot = Slot::Running(handle);
            return Ok(());
        }
        let err = if matches!(*slot, Slot::Closed) {
            RunError::Terminated
        } else {
            RunError::Busy
        };
        drop(slot);
        stop(handle);
        Err(err)
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock(), Slot::Running(_))
    }

    /// Requests termination of the live child and closes the guard. Returns
    /// whether a child was held.
    pub fn terminate(&self) -> bool {
        let taken = std::mem::replace(&mut *self.lock(), Slot::Closed);
        match taken {
            Slot::Running(handle) => {
                stop(handle);
                true
            }
            _ => false,
        }
    }

    /// Blocks until the held child exits, then frees the slot.
    fn wait(&self) -> std::io::Result<Exit> {
        loop {
            {
                let mut slot = self.lock();
                match &mut *slot {
                    Slot::Running(handle) => {
                        if let Some(exit) = handle.try_wait()? {
                            *slot = Slot::Idle;
                            return Ok(exit);
                        }
                    }
                    // Terminated from outside; the child is gone.
                    _ => return Ok(Exit::Signal(None)),
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Merges `data` over `options` and picks the launcher: the platform shell,
/// or a direct launch when `shell` is `false`.
pub fn prepare(options: &Options, data: &Options) -> Result<(ManageCommand, Shell), OptionsError> {
    let effective = options.clone().merged(data);
    let cmd = ManageCommand::from_options(&effective)?;
    let shell = match effective.shell {
        Some(false) => Shell::Direct,
        _ => Shell::detect(),
    };
    Ok((cmd, shell))
}

/// Runs management commands one at a time.
#[derive(Default)]
pub struct TaskContext {
    workdir: Option<PathBuf>,
    guard: ExitGuard,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn guard(&self) -> ExitGuard {
        self.guard.clone()
    }

    pub fn run(
        &self,
        shell: Shell,
        cmd: &ManageCommand,
        sink: &dyn OutputSink,
    ) -> Result<Completion, RunError> {
        self.guard.reserve()?;
        let line = cmd.command_line();
        sink.acknowledge(&line);

        let mut process = shell.command(cmd);
        if let Some(dir) = &self.workdir {
            process.current_dir(dir);
        }
        process.stdin(Stdio::null());
        process.stdout(Stdio::piped());
        process.stderr(Stdio::piped());
        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.guard.release();
                return Err(RunError::Spawn {
                    shell,
                    command: line,
                    source,
                });
            }
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.guard.attach(Box::new(child))?;

        std::thread::scope(|s| {
            let h1 = s.spawn(|| {
                if let Some(r) = stdout {
                    relay_lines(r, |l| sink.stdout_line(l));
                }
            });
            let h2 = s.spawn(|| {
                if let Some(r) = stderr {
                    relay_lines(r, |l| sink.stderr_line(l));
                }
            });
            h1.join().ok();
            h2.join().ok();
        });

        let exit = self.guard.wait().map_err(|source| {
            self.guard.terminate();
            RunError::Wait {
                command: line.clone(),
                source,
            }
        })?;
        Ok(complete(sink, &line, exit))
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        self.guard.terminate();
    }
}

/// Maps a child's exit onto the completion the pipeline sees. Anything other
/// than exit code 0, signals included, is a fatal failure.
pub fn complete(sink: &dyn OutputSink, command_line: &str, exit: Exit) -> Completion {
    let success = exit.success();
    if !success {
        sink.failure(command_line, &exit.to_string());
        sink.fatal(FATAL_MESSAGE);
    }
    Completion { success, exit }
}

fn relay_lines<R: Read>(reader: R, mut emit: impl FnMut(&str)) {
    let mut buf = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match buf.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                emit(text.trim_end_matches(['\r', '\n']));
            }
        }
    }
}
