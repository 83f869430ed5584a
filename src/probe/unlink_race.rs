//! Visibility of a queue right after `mq_unlink()`.
//!
//! While a descriptor for the queue is still open, a new `mq_open()` of the
//! same name without `O_CREAT` must already fail with `ENOENT`.

use super::{Probe, ProbeConfig, ProbeReport, TempQueue};
use crate::error::ErrnoCause;
use crate::queue::{self, QueueHandle};
use crate::utils::unique_queue_name;
use crate::OpenModeSpec;
use anyhow::{Context, Result};

pub struct UnlinkRaceProbe;

impl Probe for UnlinkRaceProbe {
    fn name(&self) -> &'static str {
        "unlink-race"
    }

    fn description(&self) -> &'static str {
        "an unlinked queue can't be opened again"
    }

    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport> {
        let mut report = ProbeReport::new(self.name());
        let queue = TempQueue::new(unique_queue_name(&config.queue_prefix, "unlink"));

        let create: OpenModeSpec = "bc600".parse()?;
        let kept = QueueHandle::open(queue.name(), &create)
            .with_context(|| format!("creating {}", queue.name()))?;
        queue::unlink(queue.name()).context("unlinking")?;

        let reopen: OpenModeSpec = "b".parse()?;
        let observed = match QueueHandle::open(queue.name(), &reopen) {
            Ok(_) => "opened".to_string(),
            Err(e) => format!("{:?}", e.errno()),
        };
        report.observe("open right after unlinking", "ENOENT", observed);

        kept.close().context("closing")?;
        Ok(report)
    }
}
