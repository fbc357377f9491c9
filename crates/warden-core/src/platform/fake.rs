use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io,
    sync::Mutex,
};

use super::{CommandSpec, ProcessControl, Termination};

const FIRST_PID: u32 = 4000;

#[derive(Debug)]
struct FakeProcess {
    name: String,
    alive: bool,
}

#[derive(Debug, Default)]
struct State {
    next_pid: u32,
    processes: BTreeMap<u32, FakeProcess>,
    spawned: Vec<String>,
    signals: Vec<(u32, Termination)>,
    fail_spawn: HashSet<String>,
    ignore_graceful: HashSet<String>,
    ignore_forced: HashSet<String>,
    reject_signals: HashSet<String>,
}

/// In-memory stand-in for the OS: processes are entries in a table and
/// signals flip their `alive` flag unless told otherwise.
#[derive(Debug, Default)]
pub struct FakeControl {
    state: Mutex<State>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    /// Spawning this service fails as if the executable were missing.
    pub fn fail_spawn(&self, name: &str) {
        self.with(|s| s.fail_spawn.insert(name.to_owned()));
    }

    /// This service survives `SIGTERM`.
    pub fn ignore_graceful(&self, name: &str) {
        self.with(|s| s.ignore_graceful.insert(name.to_owned()));
    }

    /// This service survives `SIGKILL` too (e.g. stuck in uninterruptible IO).
    pub fn ignore_forced(&self, name: &str) {
        self.with(|s| s.ignore_forced.insert(name.to_owned()));
    }

    /// Signal delivery to this service fails with `EPERM`.
    pub fn reject_signals(&self, name: &str) {
        self.with(|s| s.reject_signals.insert(name.to_owned()));
    }

    /// Registers a live process that was not spawned through this control.
    pub fn insert_running(&self, pid: u32, name: &str) {
        self.with(|s| {
            s.processes.insert(
                pid,
                FakeProcess {
                    name: name.to_owned(),
                    alive: true,
                },
            )
        });
    }

    /// The process dies on its own.
    pub fn crash(&self, pid: u32) {
        self.with(|s| {
            if let Some(process) = s.processes.get_mut(&pid) {
                process.alive = false;
            }
        });
    }

    /// Names passed to `spawn_detached`, in call order.
    pub fn spawned(&self) -> Vec<String> {
        self.with(|s| s.spawned.clone())
    }

    pub fn signals(&self) -> Vec<(u32, Termination)> {
        self.with(|s| s.signals.clone())
    }

    pub fn alive_pids(&self) -> Vec<u32> {
        self.with(|s| {
            s.processes
                .iter()
                .filter_map(|(pid, p)| p.alive.then_some(*pid))
                .collect()
        })
    }
}

#[async_trait::async_trait]
impl ProcessControl for FakeControl {
    async fn spawn_detached(&self, spec: &CommandSpec, _log: File) -> io::Result<u32> {
        self.with(|s| {
            if s.fail_spawn.contains(&spec.name) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}: command not found", spec.cmd[0]),
                ));
            }
            let pid = FIRST_PID + s.next_pid;
            s.next_pid += 1;
            s.processes.insert(
                pid,
                FakeProcess {
                    name: spec.name.clone(),
                    alive: true,
                },
            );
            s.spawned.push(spec.name.clone());
            Ok(pid)
        })
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.with(|s| s.processes.get(&pid).is_some_and(|p| p.alive))
    }

    async fn terminate(&self, pid: u32, how: Termination) -> io::Result<()> {
        self.with(|s| {
            let Some(process) = s.processes.get(&pid) else {
                return Ok(());
            };
            if s.reject_signals.contains(&process.name) {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            let survives = match how {
                Termination::Graceful => s.ignore_graceful.contains(&process.name),
                Termination::Forced => s.ignore_forced.contains(&process.name),
            };
            s.signals.push((pid, how));
            if !survives {
                if let Some(process) = s.processes.get_mut(&pid) {
                    process.alive = false;
                }
            }
            Ok(())
        })
    }
}
