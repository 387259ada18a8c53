// Copyright (c) 2023 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! Process-lifetime table of managed descriptors and their intended
//! reopen targets.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::redirect::redirect_fd;
use crate::resolve::resolve_fd_path;
use crate::sl;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Redirect(#[from] crate::redirect::Error),

    /// A bare reopen or seed was requested for a descriptor that has never
    /// been redirected and whose original backing path cannot be resolved.
    #[error(transparent)]
    Resolve(#[from] crate::resolve::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Table remembering, for each managed descriptor, the path it should be
/// rebound to on a bare [`reopen()`](RedirectRegistry::reopen).
///
/// The registry is a plain value, meant to be owned by whichever layer
/// manages the process's streams and injected into whatever needs it. It
/// lives for the process lifetime: there is no teardown and entries are
/// never removed.
///
/// It also provides the exclusion required between concurrent
/// redirect/reopen calls on one descriptor: the whole open/rebind/close
/// sequence runs under that descriptor's entry lock, so one pending swap
/// completes before the next begins. Writers using the descriptor are not
/// synchronized with the swap and do not need to be; the rebind itself is
/// atomic.
///
/// A recorded path is the *intended* target. Its directory entry may
/// later point at a different file due to external rename activity; that
/// is exactly what makes a subsequent reopen bind a fresh file.
#[derive(Debug, Default)]
pub struct RedirectRegistry {
    entries: Mutex<HashMap<RawFd, Arc<Mutex<Option<PathBuf>>>>>,
}

impl RedirectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebind `fd` to `path` and record `path` as its reopen target.
    ///
    /// Nothing is recorded if the swap fails: the previous binding and
    /// the previously recorded target both survive.
    pub fn redirect<P: AsRef<Path>>(&self, fd: RawFd, path: P) -> Result<()> {
        let path = path.as_ref();
        let slot = self.slot(fd);
        let mut target = slot.lock().unwrap();

        redirect_fd(fd, path)?;
        *target = Some(path.to_path_buf());
        Ok(())
    }

    /// Re-execute the swap against the descriptor's recorded target,
    /// binding a fresh file if the path's directory entry changed
    /// underneath us.
    ///
    /// A descriptor that was never redirected falls back to the path
    /// reported by [`resolve_fd_path()`], which then becomes its recorded
    /// target. Callers wanting the fallback to reflect the descriptor's
    /// *original* binding should [`seed()`](Self::seed) it before any
    /// rotation can happen.
    pub fn reopen(&self, fd: RawFd) -> Result<()> {
        let slot = self.slot(fd);
        let mut target = slot.lock().unwrap();

        let path = match target.as_ref() {
            Some(path) => path.clone(),
            None => {
                let path = resolve_fd_path(fd)?;
                debug!(sl!(), "seeding reopen target from descriptor";
                    "fd" => fd, "target" => path.display().to_string());
                *target = Some(path.clone());
                path
            }
        };

        redirect_fd(fd, &path)?;
        Ok(())
    }

    /// Record the descriptor's current backing path as its reopen target
    /// without performing a swap. An already-recorded target is kept.
    pub fn seed(&self, fd: RawFd) -> Result<()> {
        let slot = self.slot(fd);
        let mut target = slot.lock().unwrap();

        if target.is_none() {
            *target = Some(resolve_fd_path(fd)?);
        }
        Ok(())
    }

    /// The currently recorded target for `fd`, if any.
    pub fn target(&self, fd: RawFd) -> Option<PathBuf> {
        let slot = {
            let entries = self.entries.lock().unwrap();
            entries.get(&fd).cloned()
        };
        slot.and_then(|slot| slot.lock().unwrap().clone())
    }

    // The outer lock only guards slot creation; the swap itself runs
    // under the per-descriptor slot lock.
    fn slot(&self, fd: RawFd) -> Arc<Mutex<Option<PathBuf>>> {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(fd).or_default().clone()
    }
}
