//! Close-on-exec behavior of message queue descriptors.
//!
//! Opens a queue with and without `O_CLOEXEC`, derives copies of both
//! descriptors, toggles the flag through `fcntl()` and `ioctl()`, and after
//! every step runs `inspect-fd` in a freshly exec'd child to see whether the
//! descriptor survived and is still usable for `mq_send()`.

use super::{Probe, ProbeConfig, ProbeReport, TempQueue};
use crate::queue::QueueHandle;
use crate::utils::unique_queue_name;
use crate::OpenModeSpec;
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::mqueue::{mq_send, MqdT};
use nix::unistd::dup;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

const INHERITED: &str = "inherited";
const CLOSED: &str = "closed";

pub struct CloexecProbe;

impl Probe for CloexecProbe {
    fn name(&self) -> &'static str {
        "cloexec"
    }

    fn description(&self) -> &'static str {
        "which queue descriptors survive exec"
    }

    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport> {
        let mut report = ProbeReport::new(self.name());
        let queue = TempQueue::new(unique_queue_name(&config.queue_prefix, self.name()));
        let inspector = config.inspector.as_path();

        let create: OpenModeSpec = "bc644,8,64".parse()?;
        let without = QueueHandle::open(queue.name(), &create)
            .with_context(|| format!("creating {} without O_CLOEXEC", queue.name()))?;
        let without_fd = without.raw_fd()?;
        check(&mut report, inspector, "without O_CLOEXEC", without_fd, INHERITED)?;

        let reopen: OpenModeSpec = "bs".parse()?;
        let with = QueueHandle::open(queue.name(), &reopen)
            .with_context(|| format!("opening {} with O_CLOEXEC", queue.name()))?;
        let with_fd = with.raw_fd()?;
        check(&mut report, inspector, "with O_CLOEXEC", with_fd, CLOSED)?;

        let cloned = fcntl(without_fd, FcntlArg::F_DUPFD_CLOEXEC(0))
            .context("cloning with F_DUPFD_CLOEXEC")?;
        let cloned = unsafe { OwnedFd::from_raw_fd(cloned) };
        check(
            &mut report,
            inspector,
            "cloned with F_DUPFD_CLOEXEC",
            cloned.as_raw_fd(),
            CLOSED,
        )?;

        // dup() never sets close-on-exec
        let duped = dup(with_fd).context("dup()ing")?;
        let duped = unsafe { OwnedFd::from_raw_fd(duped) };
        check(&mut report, inspector, "dup()'d", duped.as_raw_fd(), INHERITED)?;

        set_cloexec(without_fd, true).context("enabling cloexec through fcntl()")?;
        check(&mut report, inspector, "set FD_CLOEXEC", without_fd, CLOSED)?;
        set_cloexec(with_fd, false).context("disabling cloexec through fcntl()")?;
        check(&mut report, inspector, "cleared FD_CLOEXEC", with_fd, INHERITED)?;

        ioctl_cloexec(duped.as_raw_fd(), true).context("enabling cloexec through ioctl()")?;
        check(&mut report, inspector, "enabled by FIOCLEX", duped.as_raw_fd(), CLOSED)?;
        ioctl_cloexec(without_fd, false).context("disabling cloexec through ioctl()")?;
        check(&mut report, inspector, "disabled by FIONCLEX", without_fd, INHERITED)?;

        drop(duped);
        drop(cloned);
        with.close().context("closing the O_CLOEXEC descriptor")?;
        without.close().context("closing the original descriptor")?;
        Ok(report)
    }
}

fn set_cloexec(fd: RawFd, enable: bool) -> Result<(), Errno> {
    let mut flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD)?);
    flags.set(FdFlag::FD_CLOEXEC, enable);
    fcntl(fd, FcntlArg::F_SETFD(flags))?;
    Ok(())
}

fn ioctl_cloexec(fd: RawFd, enable: bool) -> Result<(), Errno> {
    let request = if enable { libc::FIOCLEX } else { libc::FIONCLEX };
    let res = unsafe { libc::ioctl(fd, request) };
    Errno::result(res).map(drop)
}

/// Run the inspector on `fd` in a child process and record whether it got it
fn check(
    report: &mut ProbeReport,
    inspector: &Path,
    label: &str,
    fd: RawFd,
    expected: &str,
) -> Result<()> {
    let output = Command::new(inspector)
        .arg("inspect-fd")
        .arg(label)
        .arg(fd.to_string())
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("exec'ing {}", inspector.display()))?;

    let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
    debug!("{}", detail);
    let observed = if output.status.success() { INHERITED } else { CLOSED };
    report.observe(label, expected, observed);
    Ok(())
}

/// Report on a descriptor inherited across exec, returning the exit status
///
/// Prints whether `fd` is open and close-on-exec, then tries to send one
/// message through it. The status is 0 if the send succeeded and the errno
/// otherwise.
pub fn inspect_fd(label: &str, fd: RawFd) -> u8 {
    let is_cloexec = match fcntl(fd, FcntlArg::F_GETFD) {
        Ok(bits) if FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC) => "yes",
        Ok(_) => "no",
        Err(Errno::EBADF) => "closed",
        Err(_) => "unknown",
    };

    let mqd = unsafe { MqdT::from_raw_fd(fd) };
    let result = mq_send(&mqd, b"send\n", 2);
    std::mem::forget(mqd); // the descriptor isn't ours to close

    let status = match result {
        Ok(()) => 0,
        Err(errno) => (errno as i32).clamp(1, 255) as u8,
    };
    eprintln!(
        "{} (fd {}): is cloexec: {}, mq_send() result: {}",
        label,
        fd,
        is_cloexec,
        result.err().map_or("Success", |e| e.desc())
    );
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_closed_descriptor() {
        // far above anything the test harness has open
        assert_eq!(inspect_fd("closed", 4000), Errno::EBADF as i32 as u8);
    }

    #[test]
    fn test_set_cloexec_toggles_flag() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();

        set_cloexec(fd, false).unwrap();
        let bits = fcntl(fd, FcntlArg::F_GETFD).unwrap();
        assert!(!FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC));

        ioctl_cloexec(fd, true).unwrap();
        let bits = fcntl(fd, FcntlArg::F_GETFD).unwrap();
        assert!(FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC));
    }
}
