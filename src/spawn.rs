//! The spawn primitive and its child-side file-descriptor actions.

use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::mem;

use crate::descriptor::{Descriptor, StandardStream};
use crate::error::{Error, Result};
use crate::posix;

/// Accumulates the descriptor manipulations the kernel applies in the child
/// between `posix_spawnp` and exec: duplications onto the standard fds, and
/// closes of the originals.
///
/// Wraps `posix_spawn_file_actions_t`; the OS-level structure is initialized
/// on construction and destroyed on drop.  A builder is consumed by exactly
/// one spawn.
pub(crate) struct FileActions {
    raw: libc::posix_spawn_file_actions_t,
    closed_fds: HashSet<libc::c_int>,
}

impl FileActions {
    pub fn new() -> Result<FileActions> {
        let mut raw: libc::posix_spawn_file_actions_t = unsafe { mem::zeroed() };
        posix::check_spawn_err(unsafe { libc::posix_spawn_file_actions_init(&mut raw) })
            .map_err(|e| Error::os("posix_spawn_file_actions_init", e))?;
        Ok(FileActions {
            raw,
            closed_fds: HashSet::new(),
        })
    }

    /// Arrange for `desc`'s fd to appear as the given standard stream in the
    /// child.
    pub fn dup(&mut self, desc: &Descriptor, target: StandardStream) -> Result<()> {
        posix::check_spawn_err(unsafe {
            libc::posix_spawn_file_actions_adddup2(&mut self.raw, desc.fd(), target.fd())
        })
        .map_err(|e| Error::os("posix_spawn_file_actions_adddup2", e))
    }

    /// Arrange for `desc`'s fd to be closed in the child.
    ///
    /// Only closable descriptors are registered, and each fd at most once.
    /// The de-duplication matters when stdout and stderr share one
    /// descriptor after a merge redirection; without it the child would
    /// close the same fd twice and the spawn would fail.
    pub fn close(&mut self, desc: &Descriptor) -> Result<()> {
        let fd = desc.fd();
        if desc.closable() && self.closed_fds.insert(fd) {
            posix::check_spawn_err(unsafe {
                libc::posix_spawn_file_actions_addclose(&mut self.raw, fd)
            })
            .map_err(|e| Error::os("posix_spawn_file_actions_addclose", e))?;
        }
        Ok(())
    }

    fn as_raw(&self) -> *const libc::posix_spawn_file_actions_t {
        &self.raw
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.raw);
        }
    }
}

/// Spawn `argv` with the accumulated file actions, inheriting the parent's
/// environment.  On failure the error carries the binary name and the OS
/// error code.
pub(crate) fn spawn(argv: &[OsString], actions: &FileActions) -> Result<u32> {
    posix::spawnp(&argv[0], argv, &current_env(), actions.as_raw()).map_err(|e| {
        Error::os(
            format!("posix_spawnp {}", argv[0].to_string_lossy()),
            e,
        )
    })
}

fn current_env() -> Vec<OsString> {
    env::vars_os()
        .map(|(mut key, value)| {
            key.push("=");
            key.push(value);
            key
        })
        .collect()
}
