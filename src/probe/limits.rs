//! Limits of the platform's message queues, found by trial.
//!
//! Binary-searches the highest accepted priority, capacity and message
//! length, and checks whether empty messages, the bare name `/` and names
//! without a leading slash are accepted. Only the priority floor POSIX
//! guarantees (`MQ_PRIO_MAX >= 32`) is checked; everything else is recorded.

use super::{Probe, ProbeConfig, ProbeReport, TempQueue};
use crate::error::UnlinkError;
use crate::mode::{AccessMode, Capacity};
use crate::queue::{self, Message, QueueHandle};
use crate::utils::unique_queue_name;
use crate::OpenModeSpec;
use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, warn};

/// Highest capacity and message length tried
const SEARCH_CEILING: u64 = 1_000_000;

/// Lowest value of `MQ_PRIO_MAX` POSIX allows
const POSIX_PRIORITIES: u32 = 32;

/// Result of searching for the largest accepted value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Not even the smallest value was accepted
    Rejected,
    /// Largest accepted value
    Max(u64),
    /// The ceiling of the search was accepted
    NoLimit,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Rejected => write!(f, "none accepted"),
            Limit::Max(max) => write!(f, "{}", max),
            Limit::NoLimit => write!(f, "no limit"),
        }
    }
}

/// Find the largest value in `floor..=ceiling` that `accepts`
///
/// Assumes every value below an accepted one is accepted too.
pub fn search_limit(floor: u64, ceiling: u64, mut accepts: impl FnMut(u64) -> bool) -> Limit {
    if !accepts(floor) {
        return Limit::Rejected;
    }
    if accepts(ceiling) {
        return Limit::NoLimit;
    }
    // invariant: lo is accepted, hi is not
    let (mut lo, mut hi) = (floor, ceiling);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if accepts(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Limit::Max(lo)
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

pub struct LimitsProbe;

impl Probe for LimitsProbe {
    fn name(&self) -> &'static str {
        "limits"
    }

    fn description(&self) -> &'static str {
        "largest priority, capacity and message length, and accepted names"
    }

    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport> {
        let mut report = ProbeReport::new(self.name());
        let prefix = config.queue_prefix.as_str();

        let queue = TempQueue::new(unique_queue_name(prefix, "limits"));
        let spec: OpenModeSpec = "bcen600".parse()?;
        let mq = QueueHandle::open(queue.name(), &spec)
            .with_context(|| format!("creating {}", queue.name()))?;

        let priority = search_limit(0, u64::from(u32::MAX), |priority| {
            accepts_priority(&mq, priority as u32)
        });
        report.record("max message priority", priority.to_string());
        report.observe(
            format!("priority {} accepted", POSIX_PRIORITIES - 1),
            "yes",
            yes_no(accepts_priority(&mq, POSIX_PRIORITIES - 1)),
        );

        let empty = Message::new(0, Vec::new())?;
        let allows_empty = mq.send(&empty, None).is_ok();
        if allows_empty {
            let _ = mq.receive_message(None);
        }
        report.record("allows empty messages", yes_no(allows_empty));
        mq.close().context("closing")?;

        let scratch = TempQueue::new(unique_queue_name(prefix, "capacity"));
        let capacity = search_limit(1, SEARCH_CEILING, |n| creatable(scratch.name(), n, 1));
        report.record("max queue capacity", capacity.to_string());

        let length = search_limit(1, SEARCH_CEILING, |n| creatable(scratch.name(), 1, n));
        report.record("max message length", length.to_string());

        let equal = search_limit(1, SEARCH_CEILING, |n| creatable(scratch.name(), n, n));
        report.record("max equal capacity and length", equal.to_string());

        report.record("allows just \"/\"", yes_no(opens_and_removes("/")));

        let scoped = unique_queue_name(prefix, "noslash");
        let noslash = scoped.trim_start_matches('/');
        report.record("enforces name rules", yes_no(!opens_and_removes(noslash)));

        Ok(report)
    }
}

/// Whether a message with `priority` can be sent; drains it again
fn accepts_priority(mq: &QueueHandle, priority: u32) -> bool {
    let message = Message {
        priority,
        payload: b"b".to_vec(),
    };
    match mq.send(&message, None) {
        Ok(()) => {
            let _ = mq.receive_message(None);
            true
        }
        Err(_) => false,
    }
}

/// Whether a queue with the given limits can be created
fn creatable(name: &str, max_messages: u64, max_message_size: u64) -> bool {
    let spec = OpenModeSpec {
        access: Some(AccessMode::ReadWrite),
        create: true,
        exclusive: true,
        permissions: 0o600,
        capacity: Some(Capacity {
            max_messages,
            max_message_size,
        }),
        ..Default::default()
    };
    match QueueHandle::open(name, &spec) {
        Ok(mq) => {
            drop(mq);
            remove(name);
            true
        }
        Err(e) => {
            debug!("capacity {},{} rejected: {}", max_messages, max_message_size, e);
            false
        }
    }
}

/// Whether `name` can be created; removes it again if so
fn opens_and_removes(name: &str) -> bool {
    let spec = OpenModeSpec {
        access: Some(AccessMode::ReadWrite),
        create: true,
        permissions: 0o600,
        ..Default::default()
    };
    match QueueHandle::open(name, &spec) {
        Ok(mq) => {
            drop(mq);
            remove(name);
            true
        }
        Err(_) => false,
    }
}

fn remove(name: &str) {
    match queue::unlink(name) {
        Ok(()) | Err(UnlinkError::NotFound) => {}
        Err(e) => warn!("Failed to unlink '{}': {}", name, e),
    }
}
