//! Process detection for running Claude Code instances.
//!
//! Produces a map from resolved working directory to the PIDs of the CLI
//! running there. The OS side sits behind [`ProcessSource`]; every call on it
//! may fail on its own, and a failure only ever drops the PID in question.

use crate::error::LocatorError;
use claude_watch_core::{resolve_path, ProcessMap};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, warn};

/// Programs that run the CLI as a script argument rather than being it.
const INTERPRETERS: &[&str] = &["node", "bun", "deno"];

/// Programs whose command lines mention the target without being it.
const SEARCH_TOOLS: &[&str] = &["grep", "egrep", "fgrep", "pgrep", "rg"];

const WAIT_STEP: Duration = Duration::from_millis(20);

/// OS process introspection, one capability per method.
///
/// Implementations are blocking; call them from `spawn_blocking`.
pub trait ProcessSource: Send + Sync {
    /// PIDs whose name or command line mentions `name`. A superset is fine,
    /// candidates are re-verified.
    fn candidate_pids(&self, name: &str) -> Result<Vec<u32>, LocatorError>;

    fn command_line(&self, pid: u32) -> Result<String, LocatorError>;

    fn cwd(&self, pid: u32) -> Result<PathBuf, LocatorError>;
}

/// Scan for live CLI processes and group them by resolved working directory.
///
/// Never fails: an unavailable or timed-out candidate listing yields an empty
/// map, a per-PID failure drops that PID. When `deadline` passes mid-scan the
/// PIDs verified so far are returned.
pub fn locate_processes<S>(source: &S, target: &str, deadline: Duration) -> ProcessMap
where
    S: ProcessSource + ?Sized,
{
    let started = Instant::now();
    let mut map = ProcessMap::new();

    let pids = match source.candidate_pids(target) {
        Ok(pids) => pids,
        Err(e) => {
            warn!("Process listing failed, treating nothing as live: {}", e);
            return map;
        }
    };

    let own_pid = std::process::id();
    for (checked, pid) in pids.iter().copied().enumerate() {
        if started.elapsed() >= deadline {
            warn!(
                checked,
                remaining = pids.len() - checked,
                "Process scan exceeded {:?}; returning partial results",
                deadline
            );
            break;
        }
        if pid == own_pid {
            continue;
        }

        let cmd = match source.command_line(pid) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!("Dropping pid {}: {}", pid, e);
                continue;
            }
        };
        if !matches_command_line(&cmd, target) {
            continue;
        }

        let cwd = match source.cwd(pid) {
            Ok(cwd) => cwd,
            Err(e) => {
                debug!("Dropping pid {}: {}", pid, e);
                continue;
            }
        };
        match resolve_path(&cwd) {
            Some(dir) => map.entry(dir).or_default().push(pid),
            None => debug!("Dropping pid {}: unresolvable cwd {:?}", pid, cwd),
        }
    }
    map
}

/// Whether `cmd` is an invocation of `target` itself.
///
/// Matches when the program, or the script of an interpreter launch such as
/// `node /usr/lib/node_modules/.bin/claude`, has basename exactly `target`.
/// Command lines that merely mention the name (`grep claude`,
/// `claude-watch`, an editor opening `claude.md`) do not match.
pub fn matches_command_line(cmd: &str, target: &str) -> bool {
    let mut tokens = cmd.split_whitespace();
    let Some(program) = tokens.next() else {
        return false;
    };
    let program = basename(program);

    if SEARCH_TOOLS.contains(&program) {
        return false;
    }
    if program == target {
        return true;
    }
    if INTERPRETERS.contains(&program) {
        return tokens
            .find(|t| !t.starts_with('-'))
            .is_some_and(|script| basename(script) == target);
    }
    false
}

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

// ============================================================================
// Shell-backed source
// ============================================================================

/// `pgrep`, `ps`, and `/proc` (or `lsof` where there is no `/proc`).
#[derive(Debug, Clone)]
pub struct ShellProcessSource {
    timeout: Duration,
}

impl ShellProcessSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<Output, LocatorError> {
        run_with_timeout(Command::new(program).args(args), program, self.timeout)
    }
}

impl ProcessSource for ShellProcessSource {
    fn candidate_pids(&self, name: &str) -> Result<Vec<u32>, LocatorError> {
        let output = self.run("pgrep", &["-f", name])?;
        match output.status.code() {
            Some(0) => Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout))),
            // pgrep: 1 means nothing matched
            Some(1) => Ok(Vec::new()),
            _ => Err(command_failed("pgrep", &output)),
        }
    }

    fn command_line(&self, pid: u32) -> Result<String, LocatorError> {
        let pid_arg = pid.to_string();
        let output = self.run("ps", &["-p", &pid_arg, "-o", "args="])?;
        let cmd = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || cmd.is_empty() {
            return Err(LocatorError::ProcessGone { pid });
        }
        Ok(cmd)
    }

    fn cwd(&self, pid: u32) -> Result<PathBuf, LocatorError> {
        if Path::new("/proc/self/cwd").exists() {
            return std::fs::read_link(format!("/proc/{pid}/cwd"))
                .map_err(|e| LocatorError::for_pid(pid, e));
        }

        let pid_arg = pid.to_string();
        let output = self.run("lsof", &["-a", "-p", &pid_arg, "-d", "cwd", "-Fn"])?;
        if !output.status.success() {
            return Err(LocatorError::ProcessGone { pid });
        }
        parse_lsof_cwd(&String::from_utf8_lossy(&output.stdout))
            .ok_or(LocatorError::PermissionDenied { pid })
    }
}

/// Run a command, killing it once `timeout` elapses.
pub fn run_with_timeout(
    cmd: &mut Command,
    program: &str,
    timeout: Duration,
) -> Result<Output, LocatorError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| LocatorError::io(program, e))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| LocatorError::io(program, e))
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LocatorError::Timeout {
                        program: program.to_string(),
                        timeout,
                    });
                }
                std::thread::sleep(WAIT_STEP);
            }
            Err(e) => return Err(LocatorError::io(program, e)),
        }
    }
}

fn command_failed(program: &str, output: &Output) -> LocatorError {
    LocatorError::CommandFailed {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn parse_pid_lines(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// `lsof -Fn` prints one field per line; the name field starts with `n`.
fn parse_lsof_cwd(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

// ============================================================================
// sysinfo-backed source
// ============================================================================

/// Reads the process table in-process. `candidate_pids` refreshes it; the
/// per-PID calls answer from that refresh.
pub struct SysinfoProcessSource {
    system: Mutex<System>,
}

impl SysinfoProcessSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> T {
        let mut guard = self.system.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoProcessSource {
    fn candidate_pids(&self, name: &str) -> Result<Vec<u32>, LocatorError> {
        self.with_system(|sys| {
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing()
                    .with_cmd(UpdateKind::Always)
                    .with_cwd(UpdateKind::Always),
            );
            let mut pids: Vec<u32> = sys
                .processes()
                .iter()
                .filter(|(_, process)| {
                    process.name().to_string_lossy().contains(name)
                        || process
                            .cmd()
                            .iter()
                            .any(|arg| arg.to_string_lossy().contains(name))
                })
                .map(|(pid, _)| pid.as_u32())
                .collect();
            pids.sort_unstable();
            Ok(pids)
        })
    }

    fn command_line(&self, pid: u32) -> Result<String, LocatorError> {
        self.with_system(|sys| {
            let process = sys
                .process(Pid::from_u32(pid))
                .ok_or(LocatorError::ProcessGone { pid })?;
            let args: Vec<String> = process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect();
            if args.is_empty() {
                return Err(LocatorError::PermissionDenied { pid });
            }
            Ok(args.join(" "))
        })
    }

    fn cwd(&self, pid: u32) -> Result<PathBuf, LocatorError> {
        self.with_system(|sys| {
            let process = sys
                .process(Pid::from_u32(pid))
                .ok_or(LocatorError::ProcessGone { pid })?;
            process
                .cwd()
                .map(Path::to_path_buf)
                .ok_or(LocatorError::PermissionDenied { pid })
        })
    }
}
