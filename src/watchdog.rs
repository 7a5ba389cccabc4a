//! The watchdog: a forked process that outlives the application and reaps
//! whatever it still tracks once the application is gone.
//!
//! The watchdog owns the live set of tracked pids. It learns about them
//! exclusively through the command channel and never reports anything back.
//! Any read problem (EOF because the parent died or closed the pipe, a
//! truncated line, a line that does not parse) means the channel can no
//! longer be trusted, and all of them get the same response as confirmed
//! parent death: SIGTERM every tracked pid, then exit.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{fork, pipe2, ForkResult, Pid};

use crate::channel::CommandChannel;
use crate::error::Error;

/// Handle the application keeps on its forked watchdog while running.
#[derive(Debug)]
pub(crate) struct WatchdogHandle {
    pid: Pid,
}

impl WatchdogHandle {
    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }
}

/// One successfully parsed protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Instruction {
    Add(u32),
    Remove(u32),
}

/// Fork the watchdog.
///
/// The child never returns from this call: it serves the read loop until
/// the channel gives out and exits on its own. The parent gets the child's
/// handle and the channel's write end. On pipe or fork failure both pipe
/// ends are dropped and nothing is retained.
pub(crate) fn spawn() -> Result<(WatchdogHandle, CommandChannel), Error> {
    // Close-on-exec on both ends: the fork below keeps them regardless, but
    // subprocesses launched later must not inherit the write end or the
    // watchdog would never observe the channel closing.
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(Error::Pipe)?;

    match unsafe { fork() }.map_err(Error::Fork)? {
        ForkResult::Child => {
            drop(write_end);
            run(read_end)
        }
        ForkResult::Parent { child } => {
            drop(read_end);
            Ok((WatchdogHandle { pid: child }, CommandChannel::new(write_end)))
        }
    }
}

/// The watchdog process body: listen until the channel gives out, then reap
/// and exit.
fn run(read_end: OwnedFd) -> ! {
    set_process_title();

    let mut live = LiveSet::default();
    let mut reader = BufReader::new(File::from(read_end));
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => match parse_line(&line) {
                Some(Instruction::Add(pid)) => live.insert(pid),
                Some(Instruction::Remove(pid)) => live.remove(pid),
                None => break,
            },
        }
    }

    reap(&live);
    std::process::exit(0);
}

/// Parse one raw line from the channel.
///
/// A valid line is a single mode character, one space, and a nonzero
/// decimal pid small enough to signal, terminated by a newline. Anything
/// else, including a line cut off before its terminator, is
/// indistinguishable from a corrupted channel and yields `None`.
fn parse_line(line: &str) -> Option<Instruction> {
    let line = line.strip_suffix('\n')?;
    let (mode, id) = line.split_once(' ')?;
    let id: u32 = id.parse().ok()?;
    if id == 0 || id > i32::MAX as u32 {
        return None;
    }
    match mode {
        "a" => Some(Instruction::Add(id)),
        "r" => Some(Instruction::Remove(id)),
        _ => None,
    }
}

/// The authoritative set of tracked pids.
///
/// Duplicates are allowed; removal takes the first match only and does not
/// preserve the order of what remains.
#[derive(Debug, Default)]
struct LiveSet {
    pids: Vec<u32>,
}

impl LiveSet {
    fn insert(&mut self, pid: u32) {
        self.pids.push(pid);
    }

    /// Remove the first occurrence of `pid`. Unknown pids are a no-op.
    fn remove(&mut self, pid: u32) {
        if let Some(index) = self.pids.iter().position(|&p| p == pid) {
            self.pids.swap_remove(index);
        }
    }

    fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pids.iter().copied()
    }
}

/// Terminal state: SIGTERM everything still tracked.
///
/// Diagnostics go straight to stderr; the forked child cannot assume the
/// tracing subscriber's internal locks survived the fork in a usable state.
fn reap(live: &LiveSet) {
    for pid in live.iter() {
        eprintln!("Reaping {pid}");
        if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            eprintln!("Failed to signal {pid}: {err}");
        }
    }
}

/// Rename the forked process to `<program>-supervisor` so it is easy to
/// spot in `ps` output. Cosmetic; silently does nothing where unsupported.
fn set_process_title() {
    #[cfg(target_os = "linux")]
    {
        use std::ffi::CString;
        use std::path::Path;

        let program = std::env::args_os()
            .next()
            .and_then(|arg0| {
                Path::new(&arg0)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_owned());

        if let Ok(title) = CString::new(format!("{program}-supervisor")) {
            unsafe {
                libc::prctl(libc::PR_SET_NAME, title.as_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::process::{Child, Stdio};
    use std::time::Duration;

    use nix::sys::wait::{waitpid, WaitStatus};
    use serial_test::serial;
    use wait_timeout::ChildExt;

    use super::*;
    use crate::channel::Command;

    /// A throwaway child that sleeps long enough to observe it being reaped.
    fn spawn_sleep() -> Child {
        std::process::Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .spawn()
            .expect("Should spawn sleep")
    }

    /// True when the child went down to SIGTERM within `timeout`. A child
    /// that survives is killed here so tests never leak sleepers.
    fn sigterm_within(child: &mut Child, timeout: Duration) -> bool {
        use std::os::unix::process::ExitStatusExt;

        match child.wait_timeout(timeout).expect("Should wait on child") {
            Some(status) => status.signal() == Some(Signal::SIGTERM as i32),
            None => {
                child.kill().ok();
                let _ = child.wait();
                false
            }
        }
    }

    #[test]
    fn test_parse_accepts_add_and_remove() {
        assert_eq!(parse_line("a 123\n"), Some(Instruction::Add(123)));
        assert_eq!(parse_line("r 456\n"), Some(Instruction::Remove(456)));
    }

    #[test]
    fn test_parse_rejects_deviations() {
        let malformed = [
            "x 123\n",        // unknown mode
            "a notanumber\n", // unparseable id
            "a\n",            // missing id
            "a 123",          // truncated, no terminator
            "a 123 456\n",    // trailing junk
            "a 0\n",          // id zero is never valid
            "a 4294967296\n", // does not fit an id
            "a 2147483648\n", // cannot be signalled
            "\n",
            "",
        ];
        for line in malformed {
            assert_eq!(parse_line(line), None, "should reject {line:?}");
        }
    }

    #[test]
    fn test_live_set_removes_first_match_only() {
        let mut live = LiveSet::default();
        live.insert(7);
        live.insert(9);
        live.insert(7);

        live.remove(7);
        assert_eq!(live.iter().filter(|&p| p == 7).count(), 1);
        assert_eq!(live.iter().count(), 2);
    }

    #[test]
    fn test_live_set_remove_unknown_is_noop() {
        let mut live = LiveSet::default();
        live.insert(1);
        live.remove(99);
        assert_eq!(live.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    #[serial]
    fn test_channel_closure_reaps_tracked_pids() {
        let mut worker_a = spawn_sleep();
        let mut worker_b = spawn_sleep();

        let (handle, mut channel) = spawn().expect("Should fork watchdog");
        channel
            .send(Command::Add(worker_a.id()))
            .expect("Should send add");
        channel
            .send(Command::Add(worker_b.id()))
            .expect("Should send add");
        drop(channel);

        let status = waitpid(handle.pid(), None).expect("Should wait for watchdog");
        assert_eq!(status, WaitStatus::Exited(handle.pid(), 0));

        assert!(sigterm_within(&mut worker_a, Duration::from_secs(2)));
        assert!(sigterm_within(&mut worker_b, Duration::from_secs(2)));
    }

    #[test]
    #[serial]
    fn test_removed_pid_survives_channel_closure() {
        let mut tracked = spawn_sleep();
        let mut removed = spawn_sleep();

        let (handle, mut channel) = spawn().expect("Should fork watchdog");
        channel
            .send(Command::Add(tracked.id()))
            .expect("Should send add");
        channel
            .send(Command::Add(removed.id()))
            .expect("Should send add");
        channel
            .send(Command::Remove(removed.id()))
            .expect("Should send remove");
        // Removing something never tracked must not disturb the rest.
        channel
            .send(Command::Remove(3_999_999))
            .expect("Should send unknown remove");
        drop(channel);

        waitpid(handle.pid(), None).expect("Should wait for watchdog");
        assert!(sigterm_within(&mut tracked, Duration::from_secs(2)));

        assert!(crate::process::is_alive(removed.id()));
        removed.kill().expect("Should kill leftover sleeper");
        removed.wait().expect("Should reap leftover sleeper");
    }

    #[test]
    #[serial]
    fn test_malformed_line_tears_down_like_closure() {
        let mut worker = spawn_sleep();

        let (handle, mut channel) = spawn().expect("Should fork watchdog");
        channel
            .send(Command::Add(worker.id()))
            .expect("Should send add");
        channel.send_raw("x 123").expect("Should send malformed");

        // The channel is still open: teardown is driven by the bad line
        // alone.
        let status = waitpid(handle.pid(), None).expect("Should wait for watchdog");
        assert_eq!(status, WaitStatus::Exited(handle.pid(), 0));
        assert!(sigterm_within(&mut worker, Duration::from_secs(2)));

        drop(channel);
    }
}
