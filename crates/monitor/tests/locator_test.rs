// Process locator behaviour against a scripted process table.

use claude_watch_monitor::{locate_processes, LocatorError, ProcessSource};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

struct FakeProcess {
    cmd: Result<&'static str, ()>,
    cwd: Result<&'static str, ()>,
    delay: Duration,
}

#[derive(Default)]
struct FakeSource {
    listing_fails: bool,
    order: Vec<u32>,
    table: HashMap<u32, FakeProcess>,
}

impl FakeSource {
    fn with(mut self, pid: u32, cmd: &'static str, cwd: &'static str) -> Self {
        self.order.push(pid);
        self.table.insert(
            pid,
            FakeProcess {
                cmd: Ok(cmd),
                cwd: Ok(cwd),
                delay: Duration::ZERO,
            },
        );
        self
    }

    fn with_process(mut self, pid: u32, process: FakeProcess) -> Self {
        self.order.push(pid);
        self.table.insert(pid, process);
        self
    }
}

impl ProcessSource for FakeSource {
    fn candidate_pids(&self, _name: &str) -> Result<Vec<u32>, LocatorError> {
        if self.listing_fails {
            return Err(LocatorError::Unavailable {
                program: "pgrep".into(),
            });
        }
        Ok(self.order.clone())
    }

    fn command_line(&self, pid: u32) -> Result<String, LocatorError> {
        let p = self.table.get(&pid).ok_or(LocatorError::ProcessGone { pid })?;
        std::thread::sleep(p.delay);
        p.cmd
            .map(str::to_string)
            .map_err(|_| LocatorError::PermissionDenied { pid })
    }

    fn cwd(&self, pid: u32) -> Result<PathBuf, LocatorError> {
        let p = self.table.get(&pid).ok_or(LocatorError::ProcessGone { pid })?;
        p.cwd.map(PathBuf::from).map_err(|_| LocatorError::ProcessGone { pid })
    }
}

const DEADLINE: Duration = Duration::from_secs(10);

#[test]
fn groups_verified_pids_by_directory() {
    let source = FakeSource::default()
        .with(10, "claude", "/nonexistent/app")
        .with(11, "node /usr/lib/node_modules/.bin/claude --resume x", "/nonexistent/app")
        .with(12, "claude", "/nonexistent/other/./")
        .with(13, "grep claude", "/nonexistent/app")
        .with(14, "claude-watch watch", "/nonexistent/app");

    let map = locate_processes(&source, "claude", DEADLINE);

    let expected: Vec<(PathBuf, Vec<u32>)> = vec![
        (PathBuf::from("/nonexistent/app"), vec![10, 11]),
        (PathBuf::from("/nonexistent/other"), vec![12]),
    ];
    assert_eq!(map.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn per_pid_failures_drop_only_that_pid() {
    let source = FakeSource::default()
        .with(20, "claude", "/nonexistent/app")
        .with_process(
            21,
            FakeProcess {
                cmd: Err(()),
                cwd: Ok("/nonexistent/app"),
                delay: Duration::ZERO,
            },
        )
        .with_process(
            22,
            FakeProcess {
                cmd: Ok("claude"),
                cwd: Err(()),
                delay: Duration::ZERO,
            },
        );

    let map = locate_processes(&source, "claude", DEADLINE);
    assert_eq!(map.get(&PathBuf::from("/nonexistent/app")), Some(&vec![20]));
    assert_eq!(map.len(), 1);
}

#[test]
fn listing_failure_degrades_to_empty() {
    let source = FakeSource {
        listing_fails: true,
        ..FakeSource::default()
    };
    assert!(locate_processes(&source, "claude", DEADLINE).is_empty());
}

#[test]
fn own_pid_is_excluded() {
    let source = FakeSource::default().with(std::process::id(), "claude", "/nonexistent/self");
    assert!(locate_processes(&source, "claude", DEADLINE).is_empty());
}

#[test]
fn deadline_returns_partial_results() {
    let slow = |cwd| FakeProcess {
        cmd: Ok("claude"),
        cwd: Ok(cwd),
        delay: Duration::from_millis(150),
    };
    let source = FakeSource::default()
        .with_process(30, slow("/nonexistent/a"))
        .with_process(31, slow("/nonexistent/b"))
        .with_process(32, slow("/nonexistent/c"));

    let map = locate_processes(&source, "claude", Duration::from_millis(100));
    // The first PID is checked before the deadline passes; the rest are skipped.
    assert_eq!(map.len(), 1);
    assert!(map.contains_key(&PathBuf::from("/nonexistent/a")));
}
