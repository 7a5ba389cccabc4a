//! Process liveness probing.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Check whether a process with the given pid currently exists.
///
/// Sends the null signal, so the kernel performs its existence and
/// permission checks without delivering anything. `EPERM` still means the
/// process exists.
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        // Cannot name a real process on this platform.
        return false;
    };

    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_out_of_range_pid_is_not_alive() {
        assert!(!is_alive(u32::MAX));
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("Should spawn true");
        let pid = child.id();
        child.wait().expect("Should wait for true");
        assert!(!is_alive(pid));
    }
}
