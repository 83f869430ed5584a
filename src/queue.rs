//! # Message Queue Access
//!
//! A thin layer over the POSIX message-queue calls. Every error the OS reports
//! is passed up unchanged, `EINTR` included, as the error type of the call's
//! own cause table.
//!
//! [`QueueHandle`] owns the descriptor returned by `mq_open()`. It is closed
//! exactly once: either explicitly through [`QueueHandle::close`], which
//! reports failures, or when the handle is dropped on an early return.

use crate::error::{OpenError, ReceiveError, SendError, UnlinkError};
use crate::mode::{OpenModeSpec, ParseError};
use nix::errno::Errno;
use nix::mqueue::{
    mq_attr_member_t, mq_close, mq_getattr, mq_open, mq_receive, mq_send, mq_timedreceive,
    mq_unlink, MQ_OFlag, MqAttr, MqdT,
};
use nix::sys::time::TimeSpec;
use serde::Serialize;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use tracing::{debug, warn};

/// Snapshot of `mq_getattr()`
///
/// Only valid at the instant of the query; other processes may send or
/// receive right after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueAttributes {
    pub max_messages: i64,
    pub max_message_size: i64,
    pub current_messages: i64,
    pub flags: i64,
    pub nonblocking: bool,
}

impl From<MqAttr> for QueueAttributes {
    #[allow(clippy::unnecessary_cast)]
    fn from(attr: MqAttr) -> Self {
        let flags = attr.flags() as i64;
        Self {
            max_messages: attr.maxmsg() as i64,
            max_message_size: attr.msgsize() as i64,
            current_messages: attr.curmsgs() as i64,
            flags,
            nonblocking: flags & MQ_OFlag::O_NONBLOCK.bits() as i64 != 0,
        }
    }
}

/// A message taken off or put on a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub priority: u32,
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message, refusing payloads above the tool's size limit
    pub fn new(priority: u32, payload: Vec<u8>) -> Result<Self, ParseError> {
        if payload.len() > crate::defaults::MAX_MESSAGE_SIZE {
            return Err(ParseError::MessageTooLarge {
                len: payload.len(),
                max: crate::defaults::MAX_MESSAGE_SIZE,
            });
        }
        Ok(Self { priority, payload })
    }
}

/// An open message queue descriptor
#[derive(Debug)]
pub struct QueueHandle {
    name: String,
    mqd: Option<MqdT>,
}

impl QueueHandle {
    /// Open (and possibly create) the queue `name` as described by `spec`
    pub fn open(name: &str, spec: &OpenModeSpec) -> Result<Self, OpenError> {
        let attr = match spec.capacity {
            Some(capacity) => {
                let max_messages = mq_attr_member_t::try_from(capacity.max_messages)
                    .map_err(|_| OpenError::InvalidArgument)?;
                let max_message_size = mq_attr_member_t::try_from(capacity.max_message_size)
                    .map_err(|_| OpenError::InvalidArgument)?;
                Some(MqAttr::new(0, max_messages, max_message_size, 0))
            }
            None => None,
        };

        let mqd = mq_open(name, spec.oflag(), spec.mode(), attr.as_ref())?;
        debug!(
            "Opened message queue '{}' with mode '{}' as fd {}",
            name,
            spec,
            mqd.as_raw_fd()
        );

        Ok(Self {
            name: name.to_string(),
            mqd: Some(mqd),
        })
    }

    fn mqd(&self) -> Result<&MqdT, Errno> {
        self.mqd.as_ref().ok_or(Errno::EBADF)
    }

    /// Descriptor number, for the close-on-exec checks
    pub fn raw_fd(&self) -> Result<RawFd, Errno> {
        Ok(self.mqd()?.as_raw_fd())
    }

    pub fn attributes(&self) -> Result<QueueAttributes, Errno> {
        let attr = mq_getattr(self.mqd()?)?;
        Ok(attr.into())
    }

    /// Send one message
    ///
    /// With a deadline this is `mq_timedsend()`, which fails with `ETIMEDOUT`
    /// once the deadline passes while the queue stays full.
    pub fn send(&self, message: &Message, deadline: Option<&TimeSpec>) -> Result<(), SendError> {
        match deadline {
            None => mq_send(self.mqd()?, &message.payload, message.priority)?,
            Some(deadline) => {
                let fd = self.raw_fd()?;
                // nix has no binding for mq_timedsend()
                let res = unsafe {
                    libc::mq_timedsend(
                        fd,
                        message.payload.as_ptr() as *const libc::c_char,
                        message.payload.len(),
                        message.priority,
                        deadline.as_ref(),
                    )
                };
                Errno::result(res)?;
            }
        }
        debug!(
            "Sent {} bytes with priority {} to '{}'",
            message.payload.len(),
            message.priority,
            self.name
        );
        Ok(())
    }

    /// Receive one message into `buf`, returning its priority and length
    pub fn receive(
        &self,
        buf: &mut [u8],
        deadline: Option<&TimeSpec>,
    ) -> Result<(u32, usize), ReceiveError> {
        let mut priority = 0u32;
        let len = match deadline {
            None => mq_receive(self.mqd()?, buf, &mut priority)?,
            Some(deadline) => mq_timedreceive(self.mqd()?, buf, &mut priority, deadline)?,
        };
        debug!(
            "Received {} bytes with priority {} from '{}'",
            len, priority, self.name
        );
        Ok((priority, len))
    }

    /// Receive one message into a buffer of the tool's maximum message size
    pub fn receive_message(&self, deadline: Option<&TimeSpec>) -> Result<Message, ReceiveError> {
        let mut buf = vec![0u8; crate::defaults::MAX_MESSAGE_SIZE];
        let (priority, len) = self.receive(&mut buf, deadline)?;
        buf.truncate(len);
        Ok(Message {
            priority,
            payload: buf,
        })
    }

    /// Close the descriptor, reporting failure
    pub fn close(mut self) -> Result<(), Errno> {
        match self.mqd.take() {
            Some(mqd) => {
                mq_close(mqd)?;
                debug!("Closed message queue '{}'", self.name);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            debug!("Closing message queue '{}' on drop", self.name);
            if let Err(e) = mq_close(mqd) {
                warn!("Failed to close message queue '{}': {}", self.name, e);
            }
        }
    }
}

/// Delete the queue `name`
///
/// Descriptors that are already open stay usable; the queue itself goes away
/// once the last one is closed.
pub fn unlink(name: &str) -> Result<(), UnlinkError> {
    mq_unlink(name)?;
    debug!("Unlinked message queue '{}'", name);
    Ok(())
}

/// Names of all queues, read from the mounted mqueue filesystem
///
/// Names are returned with their leading slash and sorted.
pub fn list_names(dir: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        names.push(format!("/{}", entry.file_name().to_string_lossy()));
    }
    names.sort();
    debug!("Found {} queues in {}", names.len(), dir.display());
    Ok(names)
}
