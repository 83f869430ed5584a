//! # Utility Functions
//!
//! Small helpers shared by the command dispatcher, the probes and the tests:
//! deadline arithmetic for the timed queue calls, unique queue naming, and a
//! check for whether the mqueue filesystem is usable by the current user.

use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use uuid::Uuid;

/// Generate a unique identifier
///
/// Creates a UUID v4 string, used to keep queue names created by probes and
/// tests from colliding with each other or with queues that already exist.
pub fn generate_test_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build a queue name that no other run will pick
///
/// The name starts with a single slash and contains no other slashes, which
/// is the only form every implementation accepts. Hyphens from the UUID are
/// dropped to keep the name short.
pub fn unique_queue_name(prefix: &str, label: &str) -> String {
    let id: String = generate_test_id().chars().filter(|c| *c != '-').take(12).collect();
    format!("/{}_{}_{}", prefix, label, id)
}

/// Absolute deadline `seconds` from now on the realtime clock
///
/// `mq_timedsend()` and `mq_timedreceive()` take an absolute `CLOCK_REALTIME`
/// timestamp rather than a relative timeout.
///
/// Timeouts too large to represent saturate to the latest expressible time.
pub fn deadline_after(seconds: u64) -> Result<TimeSpec, Errno> {
    let now = clock_gettime(ClockId::CLOCK_REALTIME)?;
    let secs = libc::time_t::try_from(seconds).unwrap_or(libc::time_t::MAX);
    Ok(TimeSpec::new(now.tv_sec().saturating_add(secs), now.tv_nsec()))
}

/// Whether queues can be created and listed through `dir`
///
/// Requires the directory to exist and grant write and search permission to
/// its owner; used to skip tests on machines without mqueue support.
pub fn mqueue_fs_available(dir: &Path) -> bool {
    match std::fs::metadata(dir) {
        Ok(md) if md.is_dir() => {
            let mode = md.permissions().mode();
            (mode & 0o200) != 0 && (mode & 0o100) != 0
        }
        _ => false,
    }
}
