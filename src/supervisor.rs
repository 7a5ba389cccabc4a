//! The supervisor facade: registration, startup, shutdown, and the launch
//! binding that ties a subprocess's exit back to the watchdog.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use crate::channel::{Command, CommandChannel};
use crate::error::Error;
use crate::launch::LaunchSpec;
use crate::registry::{LaunchEntry, Registry};
use crate::watchdog::{self, WatchdogHandle};

/// Where the supervisor currently is in its lifecycle.
#[derive(Debug)]
enum State {
    NotRunning,
    Running {
        channel: CommandChannel,
        watchdog: WatchdogHandle,
    },
    ShuttingDown,
}

#[derive(Debug)]
struct Shared {
    state: State,
    registry: Registry,
}

/// Supervises worker subprocesses through a forked watchdog.
///
/// Cloning is cheap and every clone addresses the same watchdog. Launch
/// bindings keep a clone alive for as long as they are waiting on a child,
/// so the command channel cannot disappear under an in-flight wait. When
/// the last clone is dropped the channel closes exactly as it would in a
/// crash, and the watchdog takes over from there.
///
/// The design assumes one logical writer: calls serialize internally, but
/// ordering between concurrent callers is theirs to manage.
#[derive(Clone, Debug)]
pub struct Supervisor {
    shared: Arc<Mutex<Shared>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: State::NotRunning,
                registry: Registry::default(),
            })),
        }
    }

    /// Store a launch specification with its argument vector (`argv[0]` is
    /// the program). If supervision is already running the subprocess is
    /// spawned immediately; either way the entry is kept and spawned again
    /// by any later [`start`](Self::start).
    pub fn register_launch<I, S>(&self, spec: LaunchSpec, argv: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let entry = LaunchEntry {
            spec,
            argv: argv
                .into_iter()
                .map(|arg| arg.as_ref().to_os_string())
                .collect(),
        };

        let mut shared = self.shared.lock().unwrap();
        if let State::Running { channel, .. } = &mut shared.state {
            self.launch(channel, &entry);
        }
        shared.registry.launches.push(entry);
    }

    /// Bring an already-running process under supervision.
    ///
    /// Before [`start`](Self::start) the id is parked in the registry and
    /// flushed once the watchdog is up; afterwards it is reported directly.
    /// Identifier 0 can never name a supervised process and is dropped with
    /// a warning.
    pub fn register_identifier(&self, id: u32) {
        if id == 0 {
            warn!("refusing to supervise process identifier 0");
            return;
        }

        let mut shared = self.shared.lock().unwrap();
        match &mut shared.state {
            State::Running { channel, .. } => {
                if let Err(err) = channel.send(Command::Add(id)) {
                    warn!(id, "failed to report process to watchdog: {err}");
                }
            }
            _ => shared.registry.pending.push(id),
        }
    }

    /// Register a process spawned elsewhere by its runtime-assigned
    /// identifier string (on Unix, the pid in decimal).
    ///
    /// Identifiers that do not parse are logged and dropped rather than
    /// treated as fatal.
    pub fn register_external_process(&self, identifier: &str) {
        match identifier.parse::<u32>() {
            Ok(id) => self.register_identifier(id),
            Err(_) => warn!("failed to parse process identifier {identifier:?}"),
        }
    }

    /// Fork the watchdog and begin supervision.
    ///
    /// Every identifier registered so far is reported to the fresh watchdog
    /// and every stored launch specification is spawned. Fails without
    /// changing state if supervision is already running or the pipe or fork
    /// cannot be created.
    pub fn start(&self) -> Result<(), Error> {
        let mut shared = self.shared.lock().unwrap();
        if !matches!(shared.state, State::NotRunning) {
            return Err(Error::AlreadyRunning);
        }

        let (handle, mut channel) = watchdog::spawn()?;
        debug!(watchdog = %handle.pid(), "watchdog forked");

        // The pending list stays in place so a stop/start cycle registers
        // the same identifiers with the next watchdog.
        for &id in &shared.registry.pending {
            if let Err(err) = channel.send(Command::Add(id)) {
                warn!(id, "failed to report pre-registered process: {err}");
            }
        }
        for entry in &shared.registry.launches {
            self.launch(&mut channel, entry);
        }

        shared.state = State::Running {
            channel,
            watchdog: handle,
        };
        Ok(())
    }

    /// Detach from the watchdog.
    ///
    /// Closes the command channel and forgets the watchdog; no signal is
    /// sent to it or to anything it tracks, and it is not waited on. What
    /// happens to the tracked processes from here is the watchdog's own
    /// channel-closure handling.
    pub fn stop(&self) {
        let mut shared = self.shared.lock().unwrap();

        // Swap to ShuttingDown so the Running handles drop, closing the
        // write end, before the state settles at NotRunning.
        let previous = std::mem::replace(&mut shared.state, State::ShuttingDown);
        if let State::Running { watchdog, .. } = &previous {
            debug!(watchdog = %watchdog.pid(), "closing command channel");
        }
        drop(previous);

        shared.state = State::NotRunning;
    }

    /// Whether a watchdog is currently attached.
    pub fn is_running(&self) -> bool {
        matches!(self.shared.lock().unwrap().state, State::Running { .. })
    }

    /// Launch one entry: spawn, report `a <pid>`, and bind the exit wait.
    ///
    /// Failures here are isolated: a spec that cannot spawn is logged and
    /// skipped without affecting anything already supervised.
    fn launch(&self, channel: &mut CommandChannel, entry: &LaunchEntry) {
        let Some(mut command) = entry.spec.command(&entry.argv) else {
            warn!("ignoring launch with an empty argument vector");
            return;
        };

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = ?entry.argv.first(), "failed to spawn: {err}");
                return;
            }
        };

        let pid = child.id();
        debug!(pid, "launched supervised subprocess");
        if let Err(err) = channel.send(Command::Add(pid)) {
            warn!(pid, "failed to report new subprocess: {err}");
        }

        // The waiter owns a supervisor clone, so the channel outlives every
        // outstanding wait. The wait itself cannot be cancelled; a process
        // must eventually exit.
        let supervisor = self.clone();
        let waiter = thread::Builder::new().name(format!("wait-{pid}"));
        let spawned = waiter.spawn(move || {
            match child.wait() {
                Ok(status) => debug!(pid, %status, "supervised subprocess exited"),
                // An error while waiting counts as an exit: the pid must
                // still leave the live set.
                Err(err) => warn!(pid, "failed waiting for subprocess: {err}"),
            }
            supervisor.send(Command::Remove(pid));
        });
        if let Err(err) = spawned {
            warn!(pid, "failed to spawn exit waiter: {err}");
        }
    }

    /// Write one command if running; quietly drop it otherwise (a waiter
    /// may outlive the supervision it was started under).
    fn send(&self, command: Command) {
        let mut shared = self.shared.lock().unwrap();
        match &mut shared.state {
            State::Running { channel, .. } => {
                if let Err(err) = channel.send(command) {
                    warn!("failed to write {command} to watchdog: {err}");
                }
            }
            _ => debug!("dropping {command}: supervision is not running"),
        }
    }
}
