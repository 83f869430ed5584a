//! Non-blocking receive on an empty queue.

use super::{Probe, ProbeConfig, ProbeReport, TempQueue};
use crate::error::ErrnoCause;
use crate::queue::QueueHandle;
use crate::utils::{deadline_after, unique_queue_name};
use crate::OpenModeSpec;
use anyhow::{Context, Result};

/// Upper bound on the receive, in case `O_NONBLOCK` is ignored.
const GRACE_SECONDS: u64 = 2;

pub struct NonblockProbe;

impl Probe for NonblockProbe {
    fn name(&self) -> &'static str {
        "nonblock"
    }

    fn description(&self) -> &'static str {
        "receiving from an empty non-blocking queue fails with EAGAIN"
    }

    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport> {
        let mut report = ProbeReport::new(self.name());
        let queue = TempQueue::new(unique_queue_name(&config.queue_prefix, self.name()));

        let spec: OpenModeSpec = "rcn600".parse()?;
        let mq = QueueHandle::open(queue.name(), &spec)
            .with_context(|| format!("creating {}", queue.name()))?;

        let deadline = deadline_after(GRACE_SECONDS).context("reading the clock")?;
        let observed = match mq.receive_message(Some(&deadline)) {
            Ok(_) => "received a message".to_string(),
            Err(e) => format!("{:?}", e.errno()),
        };
        report.observe("receive on empty queue", "EAGAIN", observed);

        mq.close().context("closing")?;
        Ok(report)
    }
}
