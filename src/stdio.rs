// Copyright (c) 2023 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! Convenience layer for the two conventional output streams.

use std::path::Path;

use libc::{STDERR_FILENO, STDOUT_FILENO};

use crate::registry::{RedirectRegistry, Result};
use crate::sl;

/// Manages redirection of the process's stdout and stderr.
///
/// Construction captures the paths the two streams are currently bound
/// to, so a rotation handler can call [`reopen_stdout()`] or
/// [`reopen_stderr()`] even if no explicit redirect ever happened. A
/// stream that is not path-backed at startup (a pipe to a supervisor,
/// say) is left unseeded; a bare reopen of it reports the resolution
/// failure until the stream is explicitly redirected.
///
/// [`reopen_stdout()`]: Self::reopen_stdout
/// [`reopen_stderr()`]: Self::reopen_stderr
#[derive(Debug)]
pub struct StdioRedirector {
    registry: RedirectRegistry,
}

impl StdioRedirector {
    /// Create a redirector, capturing the current stdout/stderr paths.
    pub fn new() -> Self {
        let redirector = StdioRedirector {
            registry: RedirectRegistry::new(),
        };
        for fd in [STDOUT_FILENO, STDERR_FILENO] {
            if let Err(e) = redirector.registry.seed(fd) {
                debug!(sl!(), "stream does not resolve, reopen disabled until redirected";
                    "fd" => fd, "error" => format!("{}", e));
            }
        }
        redirector
    }

    /// Redirect stdout to `path` and remember it for later reopens.
    pub fn redirect_stdout<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.registry.redirect(STDOUT_FILENO, path)
    }

    /// Redirect stderr to `path` and remember it for later reopens.
    pub fn redirect_stderr<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.registry.redirect(STDERR_FILENO, path)
    }

    /// Reopen stdout at its remembered path, binding a fresh file if the
    /// old one was renamed away.
    pub fn reopen_stdout(&self) -> Result<()> {
        self.registry.reopen(STDOUT_FILENO)
    }

    /// Reopen stderr at its remembered path, binding a fresh file if the
    /// old one was renamed away.
    pub fn reopen_stderr(&self) -> Result<()> {
        self.registry.reopen(STDERR_FILENO)
    }

    /// The underlying registry, for managing descriptors beyond the two
    /// standard streams.
    pub fn registry(&self) -> &RedirectRegistry {
        &self.registry
    }
}

impl Default for StdioRedirector {
    fn default() -> Self {
        Self::new()
    }
}
