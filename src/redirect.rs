// Copyright (c) 2023 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! The descriptor switch: atomically rebind an open descriptor number to
//! a freshly opened file.

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;
use thiserror::Error;

use crate::sl;

#[derive(Error, Debug)]
pub enum Error {
    /// The target could not be opened. The carried errno distinguishes a
    /// missing parent directory (`ENOENT`), a permission failure
    /// (`EACCES`) and descriptor table exhaustion (`EMFILE`/`ENFILE`).
    /// The caller's descriptor has not been touched.
    #[error("failed to open redirect target {0}: {1}")]
    OpenTarget(PathBuf, #[source] nix::Error),

    /// `dup2` onto the caller's descriptor failed; the previous binding
    /// is still in place.
    #[error("failed to rebind descriptor {0}: {1}")]
    Rebind(RawFd, #[source] nix::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Atomically rebind `fd` to a file freshly opened at `path`.
///
/// The target is opened in append/create mode, never truncated, so
/// redirecting to the path the descriptor is already bound to continues
/// writing at end-of-file. Every call opens the path anew rather than
/// reusing a cached handle; after an external rename the next call binds
/// the new directory entry, not the renamed file. This is a contract, not
/// an optimization opportunity.
///
/// A write racing with this call on the same descriptor lands entirely in
/// the old or entirely in the new file; `dup2` never exposes a closed or
/// half-bound descriptor number. Two concurrent *redirect* calls on the
/// same descriptor must be serialized by the caller —
/// [`RedirectRegistry`](crate::RedirectRegistry) does so.
///
/// Each call opens exactly one handle and disposes of exactly one, so the
/// process descriptor count is constant over arbitrarily many calls. On
/// failure the previous binding is intact and nothing has leaked.
pub fn redirect_fd<P: AsRef<Path>>(fd: RawFd, path: P) -> Result<()> {
    let path = path.as_ref();

    // O_CLOEXEC covers the temporary descriptor only: dup2 clears the
    // flag on the rebound one, keeping stdio inheritable.
    let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND | OFlag::O_CLOEXEC;
    let tmp = fcntl::open(path, flags, Mode::from_bits_truncate(0o666))
        .map_err(|e| Error::OpenTarget(path.to_path_buf(), e))?;

    debug!(sl!(), "rebinding descriptor";
        "fd" => fd, "target" => path.display().to_string());

    if let Err(e) = unistd::dup2(tmp, fd) {
        let _ = unistd::close(tmp);
        return Err(Error::Rebind(fd, e));
    }

    // dup2 is a no-op when both numbers match, which can only happen if
    // the caller passed a closed descriptor; closing would then drop the
    // binding just made.
    if tmp != fd {
        let _ = unistd::close(tmp);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_fd;
    use nix::unistd;
    use serial_test::serial;
    use std::fs;

    fn open_stream(path: &Path) -> RawFd {
        fcntl::open(
            path,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
            Mode::from_bits_truncate(0o666),
        )
        .unwrap()
    }

    #[test]
    #[serial]
    fn test_redirect_switches_target() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");

        let fd = open_stream(&first);
        write_fd(fd, b"one\n");

        redirect_fd(fd, &second).unwrap();
        write_fd(fd, b"two\n");
        let _ = unistd::close(fd);

        assert_eq!(fs::read_to_string(&first).unwrap(), "one\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "two\n");
    }

    #[test]
    #[serial]
    fn test_redirect_to_same_path_appends() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("stream.log");

        let fd = open_stream(&path);
        write_fd(fd, b"one\n");

        redirect_fd(fd, &path).unwrap();
        write_fd(fd, b"two\n");
        redirect_fd(fd, &path).unwrap();
        write_fd(fd, b"three\n");
        let _ = unistd::close(fd);

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    #[serial]
    fn test_missing_parent_leaves_binding_intact() {
        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("stream.log");
        let orphan = dir.path().join("no_such_dir").join("stream.log");

        let fd = open_stream(&path);
        write_fd(fd, b"before\n");

        let err = redirect_fd(fd, &orphan).unwrap_err();
        match err {
            Error::OpenTarget(p, errno) => {
                assert_eq!(p, orphan);
                assert_eq!(errno, nix::Error::ENOENT);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // The old binding must still be fully writable.
        write_fd(fd, b"after\n");
        let _ = unistd::close(fd);

        assert_eq!(fs::read_to_string(&path).unwrap(), "before\nafter\n");
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    #[serial]
    fn test_redirect_holds_descriptor_count() {
        use crate::test_utils::count_open_fds;

        let dir = tempfile::tempdir().expect("failed to create tmpdir");
        let path = dir.path().join("stream.log");

        let baseline = count_open_fds();
        let fd = open_stream(&path);
        assert_eq!(count_open_fds(), baseline + 1);

        for _ in 0..1000 {
            redirect_fd(fd, &path).unwrap();
            assert_eq!(count_open_fds(), baseline + 1);
        }

        let _ = unistd::close(fd);
        assert_eq!(count_open_fds(), baseline);
    }
}
