//! Supervision of worker subprocesses through a crash-surviving watchdog.
//!
//! An application that spawns workers has a problem the moment it dies
//! abnormally: nothing is left behind to clean those workers up. A
//! [`Supervisor`] answers this by forking a small watchdog process whose only
//! input is a pipe from the application. Supervised pids travel over that
//! pipe as `a <pid>` / `r <pid>` lines. When the write end vanishes, and an
//! orderly shutdown looks no different from a SIGKILLed application here,
//! the watchdog sends SIGTERM to every pid it still tracks and exits.
//!
//! ```no_run
//! use warden::{LaunchSpec, Supervisor};
//!
//! let supervisor = Supervisor::new();
//! supervisor.register_launch(LaunchSpec::new(), ["sleep", "20"]);
//! supervisor.start()?;
//! # Ok::<(), warden::Error>(())
//! ```

mod channel;
pub mod error;
pub mod launch;
pub mod process;
mod registry;
pub mod supervisor;
mod watchdog;

pub use error::Error;
pub use launch::LaunchSpec;
pub use supervisor::Supervisor;
