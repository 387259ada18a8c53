// Copyright (c) 2023 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! Descriptor-to-path resolution.
//!
//! Answers "which filesystem object is this descriptor currently bound
//! to", using the host's descriptor introspection facility: the
//! `/proc/self/fd` symlink table on Linux, `fcntl(F_GETPATH)` on macOS.
//! The resolved value seeds the registry entry later used by a bare
//! reopen, so it must be a real path: descriptors backed by anonymous
//! objects (pipes, sockets) are reported as unresolvable, never guessed
//! at.

use std::io;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The platform could not report anything for the descriptor, most
    /// commonly because it is not open.
    #[error("descriptor {0} cannot be resolved: {1}")]
    BadDescriptor(RawFd, #[source] io::Error),

    /// The descriptor is open but backed by an anonymous object such as a
    /// pipe or a socket. The carried string is what the platform reported
    /// instead of a path, e.g. `pipe:[4129]`.
    #[error("descriptor {0} is not backed by a filesystem path: {1}")]
    NotAPath(RawFd, String),

    /// The platform offers no descriptor introspection facility.
    #[error("no descriptor introspection facility on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Resolve the filesystem path currently bound to `fd`.
///
/// Purely a query; no side effects. Regular files, devices and terminals
/// all resolve to a canonical absolute path identifying the backing
/// object.
pub fn resolve_fd_path(fd: RawFd) -> Result<PathBuf> {
    imp::resolve_fd_path(fd)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod imp {
    use super::*;
    use std::fs;

    pub fn resolve_fd_path(fd: RawFd) -> Result<PathBuf> {
        let link = format!("/proc/self/fd/{}", fd);
        let target = fs::read_link(&link).map_err(|e| Error::BadDescriptor(fd, e))?;
        // Anonymous objects show up as "pipe:[4129]" or "socket:[5313]",
        // not as absolute paths.
        if !target.is_absolute() {
            return Err(Error::NotAPath(fd, target.to_string_lossy().into_owned()));
        }
        Ok(target)
    }
}

#[cfg(target_os = "macos")]
mod imp {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    pub fn resolve_fd_path(fd: RawFd) -> Result<PathBuf> {
        let mut buf = [0u8; libc::PATH_MAX as usize];
        let ret = unsafe { libc::fcntl(fd, libc::F_GETPATH, buf.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::BadDescriptor(fd, io::Error::last_os_error()));
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(PathBuf::from(OsStr::from_bytes(&buf[..len])))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod imp {
    use super::*;

    pub fn resolve_fd_path(_fd: RawFd) -> Result<PathBuf> {
        Err(Error::Unsupported)
    }
}
