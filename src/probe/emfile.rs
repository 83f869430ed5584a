//! Repeated open+close of the same queue.
//!
//! On NetBSD every `mq_open()` after the second one fails with `EMFILE`, even
//! though all earlier descriptors have been closed.

use super::{Probe, ProbeConfig, ProbeReport, TempQueue};
use crate::error::{ErrnoCause, UnlinkError};
use crate::queue::{self, QueueHandle};
use crate::utils::unique_queue_name;
use crate::OpenModeSpec;
use anyhow::{Context, Result};

pub struct EmfileProbe;

impl Probe for EmfileProbe {
    fn name(&self) -> &'static str {
        "emfile"
    }

    fn description(&self) -> &'static str {
        "reopening a closed queue doesn't exhaust descriptors"
    }

    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport> {
        let mut report = ProbeReport::new(self.name());
        let queue = TempQueue::new(unique_queue_name(&config.queue_prefix, self.name()));

        match queue::unlink(queue.name()) {
            Ok(()) | Err(UnlinkError::NotFound) => {}
            Err(e) => return Err(e).context("removing a leftover queue"),
        }

        let spec: OpenModeSpec = "bc600".parse()?;
        for cycle in 1..=config.emfile_cycles {
            let step = format!("open+close #{}", cycle);
            let observed = match QueueHandle::open(queue.name(), &spec) {
                Ok(mq) => match mq.close() {
                    Ok(()) => "ok".to_string(),
                    Err(errno) => format!("close failed with {:?}", errno),
                },
                Err(e) => format!("open failed with {:?}", e.errno()),
            };
            let failed = observed != "ok";
            report.observe(step, "ok", observed);
            if failed {
                break;
            }
        }
        Ok(report)
    }
}
