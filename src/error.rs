//! Error type for supervision setup.

use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by [`Supervisor::start`](crate::Supervisor::start).
///
/// Per-launch and per-write failures are not represented here; they are
/// logged where they occur and never interrupt the rest of the supervised
/// set.
#[derive(Debug, Error)]
pub enum Error {
    /// A watchdog is already attached; the call changed nothing.
    #[error("supervisor is already running")]
    AlreadyRunning,

    /// The command pipe could not be created.
    #[error("failed to create command pipe: {0}")]
    Pipe(#[source] Errno),

    /// The watchdog process could not be forked.
    #[error("failed to fork watchdog process: {0}")]
    Fork(#[source] Errno),
}
