//! # Error Taxonomy
//!
//! Every queue operation has its own table mapping `errno` values to a short
//! cause, because the same code means different things depending on the call
//! (`EAGAIN` is "queue is empty" for a receive and "queue is full" for a send).
//! Codes a table doesn't document fall back to `Undocumented`.
//!
//! [`MqError`] wraps the per-operation errors together with the action that
//! failed and renders them the way the command line reports them:
//!
//! ```text
//! opening failed with errno 2 = ENOENT: queue doesn't exist, or, name is just '/'
//! (generic desc: No such file or directory)
//! ```

use crate::mode::ParseError;
use nix::errno::Errno;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A per-operation decoding of an `errno` value
pub trait ErrnoCause: From<Errno> + Display + Copy {
    /// The code this cause was decoded from
    fn errno(&self) -> Errno;
}

/// Failures of `mq_open()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("EACCES: not permitted to open in this mode, or, more than one '/' in name")]
    PermissionDenied,
    #[error("EINVAL: invalid capacities, or, no slash in name")]
    InvalidArgument,
    #[error("ENOENT: queue doesn't exist, or, name is just '/'")]
    NotFound,
    #[error("ENAMETOOLONG - self explanatory")]
    NameTooLong,
    #[error("EEXIST: queue already exists")]
    AlreadyExists,
    #[error("EMFILE: per-process fd limit reached")]
    ProcessDescriptorLimit,
    #[error("ENFILE: system-wide fd limit reached")]
    SystemDescriptorLimit,
    #[error("ENOMEM: process out of memory")]
    OutOfMemory,
    #[error("ENOSPC: system out of memory")]
    NoSpace,
    #[error("undocumented error!")]
    Undocumented(Errno),
}

impl From<Errno> for OpenError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EACCES => OpenError::PermissionDenied,
            Errno::EINVAL => OpenError::InvalidArgument,
            Errno::ENOENT => OpenError::NotFound,
            Errno::ENAMETOOLONG => OpenError::NameTooLong,
            Errno::EEXIST => OpenError::AlreadyExists,
            Errno::EMFILE => OpenError::ProcessDescriptorLimit,
            Errno::ENFILE => OpenError::SystemDescriptorLimit,
            Errno::ENOMEM => OpenError::OutOfMemory,
            Errno::ENOSPC => OpenError::NoSpace,
            other => OpenError::Undocumented(other),
        }
    }
}

impl ErrnoCause for OpenError {
    fn errno(&self) -> Errno {
        match self {
            OpenError::PermissionDenied => Errno::EACCES,
            OpenError::InvalidArgument => Errno::EINVAL,
            OpenError::NotFound => Errno::ENOENT,
            OpenError::NameTooLong => Errno::ENAMETOOLONG,
            OpenError::AlreadyExists => Errno::EEXIST,
            OpenError::ProcessDescriptorLimit => Errno::EMFILE,
            OpenError::SystemDescriptorLimit => Errno::ENFILE,
            OpenError::OutOfMemory => Errno::ENOMEM,
            OpenError::NoSpace => Errno::ENOSPC,
            OpenError::Undocumented(errno) => *errno,
        }
    }
}

/// Failures of `mq_send()` and `mq_timedsend()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("EAGAIN: queue is full so the call would have to block")]
    WouldBlock,
    #[error("EBADF: BUG!")]
    BadDescriptor,
    #[error("EINTR: interrupted; try again")]
    Interrupted,
    #[error("EMSGSIZE: the message is too big for the queue")]
    MessageTooLarge,
    #[error("ETIMEDOUT - self explanatory")]
    TimedOut,
    #[error("undocumented error!")]
    Undocumented(Errno),
}

impl From<Errno> for SendError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EAGAIN => SendError::WouldBlock,
            Errno::EBADF => SendError::BadDescriptor,
            Errno::EINTR => SendError::Interrupted,
            Errno::EMSGSIZE => SendError::MessageTooLarge,
            Errno::ETIMEDOUT => SendError::TimedOut,
            other => SendError::Undocumented(other),
        }
    }
}

impl ErrnoCause for SendError {
    fn errno(&self) -> Errno {
        match self {
            SendError::WouldBlock => Errno::EAGAIN,
            SendError::BadDescriptor => Errno::EBADF,
            SendError::Interrupted => Errno::EINTR,
            SendError::MessageTooLarge => Errno::EMSGSIZE,
            SendError::TimedOut => Errno::ETIMEDOUT,
            SendError::Undocumented(errno) => *errno,
        }
    }
}

/// Failures of `mq_receive()` and `mq_timedreceive()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReceiveError {
    #[error("EAGAIN: queue is empty so the call would have to block")]
    WouldBlock,
    #[error("EBADF: BUG!")]
    BadDescriptor,
    #[error("EINTR: interrupted; try again")]
    Interrupted,
    #[error("EMSGSIZE: the receive buffer is smaller than the maximum message size")]
    BufferTooSmall,
    #[error("ETIMEDOUT - self explanatory")]
    TimedOut,
    #[error("undocumented error!")]
    Undocumented(Errno),
}

impl From<Errno> for ReceiveError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EAGAIN => ReceiveError::WouldBlock,
            Errno::EBADF => ReceiveError::BadDescriptor,
            Errno::EINTR => ReceiveError::Interrupted,
            Errno::EMSGSIZE => ReceiveError::BufferTooSmall,
            Errno::ETIMEDOUT => ReceiveError::TimedOut,
            other => ReceiveError::Undocumented(other),
        }
    }
}

impl ErrnoCause for ReceiveError {
    fn errno(&self) -> Errno {
        match self {
            ReceiveError::WouldBlock => Errno::EAGAIN,
            ReceiveError::BadDescriptor => Errno::EBADF,
            ReceiveError::Interrupted => Errno::EINTR,
            ReceiveError::BufferTooSmall => Errno::EMSGSIZE,
            ReceiveError::TimedOut => Errno::ETIMEDOUT,
            ReceiveError::Undocumented(errno) => *errno,
        }
    }
}

/// Failures of `mq_unlink()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnlinkError {
    #[error("EACCES: not permitted to delete this queue")]
    PermissionDenied,
    #[error("ENOENT: queue doesn't exist")]
    NotFound,
    #[error("EINVAL: name is empty or does not start with a slash")]
    InvalidName,
    #[error("ENAMETOOLONG - self explanatory")]
    NameTooLong,
    #[error("undocumented error!")]
    Undocumented(Errno),
}

impl From<Errno> for UnlinkError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EACCES => UnlinkError::PermissionDenied,
            Errno::ENOENT => UnlinkError::NotFound,
            Errno::EINVAL => UnlinkError::InvalidName,
            Errno::ENAMETOOLONG => UnlinkError::NameTooLong,
            other => UnlinkError::Undocumented(other),
        }
    }
}

impl ErrnoCause for UnlinkError {
    fn errno(&self) -> Errno {
        match self {
            UnlinkError::PermissionDenied => Errno::EACCES,
            UnlinkError::NotFound => Errno::ENOENT,
            UnlinkError::InvalidName => Errno::EINVAL,
            UnlinkError::NameTooLong => Errno::ENAMETOOLONG,
            UnlinkError::Undocumented(errno) => *errno,
        }
    }
}

/// Two-line report shared by every decoded OS failure.
pub fn os_report<C: ErrnoCause>(action: &str, cause: &C) -> String {
    let errno = cause.errno();
    format!(
        "{} failed with errno {} = {}\n(generic desc: {})",
        action,
        errno as i32,
        cause,
        errno.desc()
    )
}

fn desc(errno: &Errno) -> &'static str {
    errno.desc()
}

fn show(path: &Path) -> std::path::Display<'_> {
    path.display()
}

/// Any failure of a command; all of them end the invocation
#[derive(Debug, Error)]
pub enum MqError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{}", os_report("opening", .0))]
    Open(#[from] OpenError),

    #[error("{}", os_report("sending", .0))]
    Send(#[from] SendError),

    #[error("{}", os_report("receiving", .0))]
    Receive(#[from] ReceiveError),

    #[error("{}", os_report("deleting", .0))]
    Unlink(#[from] UnlinkError),

    #[error("bug or undocumented error!: mq_getattr() failed: {}", desc(.0))]
    Attributes(Errno),

    #[error("close queue: {}", desc(.0))]
    Close(Errno),

    #[error("Unable to get current system time: {}", desc(.0))]
    Clock(Errno),

    #[error("opening {}/ failed: {source}", show(.dir))]
    List {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("writing output failed: {0}")]
    Output(#[from] std::io::Error),

    #[error("encoding output failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("probe {0} did not behave as expected")]
    ProbeFailed(String),

    #[error(transparent)]
    Probe(#[from] anyhow::Error),
}

impl MqError {
    /// The `errno` behind this error, if it came from the OS
    pub fn errno(&self) -> Option<Errno> {
        match self {
            MqError::Open(e) => Some(e.errno()),
            MqError::Send(e) => Some(e.errno()),
            MqError::Receive(e) => Some(e.errno()),
            MqError::Unlink(e) => Some(e.errno()),
            MqError::Attributes(errno) | MqError::Close(errno) | MqError::Clock(errno) => {
                Some(*errno)
            }
            MqError::List { source, .. } => source.raw_os_error().map(Errno::from_raw),
            _ => None,
        }
    }
}
