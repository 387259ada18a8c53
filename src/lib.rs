// Copyright (c) 2023 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! stdio-redirect lets a running process retarget where its output
//! descriptors are physically written, and later reattach them to their
//! original filesystem location. This is the mechanism behind log rotation
//! without restart: an external tool renames the current log file away,
//! and the writing process reopens a fresh file at the original path with
//! no data loss and no descriptor leakage.
//!
//! The engine works at descriptor level:
//! - [`resolve_fd_path()`] reports the filesystem path currently backing a
//!   descriptor, via the host's descriptor introspection facility.
//! - [`redirect_fd()`] atomically rebinds a descriptor number to a freshly
//!   opened file, without ever exposing an invalid descriptor to
//!   concurrent writers.
//! - [`RedirectRegistry`] remembers each managed descriptor's intended
//!   target so a bare reopen can re-execute the swap after a rotation.
//! - [`StdioRedirector`] wraps the registry for the two conventional
//!   streams.
//!
//! ```no_run
//! use stdio_redirect::StdioRedirector;
//!
//! let stdio = StdioRedirector::new();
//! stdio.redirect_stdout("/var/log/agent.log")?;
//! // ... an external rotator renames agent.log away ...
//! stdio.reopen_stdout()?;
//! # Ok::<(), stdio_redirect::registry::Error>(())
//! ```

#[macro_use]
extern crate slog;

pub mod redirect;
pub mod registry;
pub mod resolve;
pub mod stdio;

#[cfg(test)]
mod test_utils;

pub use redirect::redirect_fd;
pub use registry::RedirectRegistry;
pub use resolve::resolve_fd_path;
pub use stdio::StdioRedirector;

/// Convenience macro to obtain the scoped logger tagged for this crate.
#[macro_export]
macro_rules! sl {
    () => {
        slog_scope::logger().new(o!("subsystem" => "stdio-redirect"))
    };
}
