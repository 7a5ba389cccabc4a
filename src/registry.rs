//! Pre-start registrations: launch specifications and bare identifiers.

use std::ffi::OsString;

use crate::launch::LaunchSpec;

/// A stored launch: spawn configuration plus its argument vector.
#[derive(Debug, Clone)]
pub(crate) struct LaunchEntry {
    pub(crate) spec: LaunchSpec,
    pub(crate) argv: Vec<OsString>,
}

/// Registrations owned by the facade for its whole lifetime.
///
/// Identifiers collected in `pending` are flushed as `a` lines when
/// supervision starts. Launch entries are never discarded: a later restart
/// spawns them all over again.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) pending: Vec<u32>,
    pub(crate) launches: Vec<LaunchEntry>,
}
