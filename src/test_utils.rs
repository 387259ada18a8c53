// Copyright (c) 2023 Ant Group
//
// SPDX-License-Identifier: Apache-2.0
//

//! Helpers shared by the unit tests.

use std::os::unix::io::RawFd;

/// Number of entries in the process descriptor table.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn count_open_fds() -> usize {
    // The read_dir handle itself is counted, consistently on every call.
    std::fs::read_dir("/proc/self/fd")
        .expect("failed to read /proc/self/fd")
        .count()
}

/// Write the whole buffer to a raw descriptor, panicking on any error.
pub fn write_fd(fd: RawFd, data: &[u8]) {
    let mut off = 0;
    while off < data.len() {
        off += nix::unistd::write(fd, &data[off..]).expect("write failed");
    }
}
