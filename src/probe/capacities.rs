//! Capacity and message size of a queue created without explicit limits.
//!
//! On Linux these come from `/proc/sys/fs/mqueue/msg_default` and
//! `msgsize_default`; other systems hard-code them.

use super::{Probe, ProbeConfig, ProbeReport, TempQueue};
use crate::queue::QueueHandle;
use crate::utils::unique_queue_name;
use crate::OpenModeSpec;
use anyhow::{Context, Result};

pub struct DefaultCapacitiesProbe;

impl Probe for DefaultCapacitiesProbe {
    fn name(&self) -> &'static str {
        "default-capacities"
    }

    fn description(&self) -> &'static str {
        "limits a queue gets when none are requested"
    }

    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport> {
        let mut report = ProbeReport::new(self.name());
        let queue = TempQueue::new(unique_queue_name(&config.queue_prefix, "defaults"));

        let spec: OpenModeSpec = "bce600".parse()?;
        let mq = QueueHandle::open(queue.name(), &spec)
            .with_context(|| format!("creating {}", queue.name()))?;
        let attrs = mq.attributes().context("reading attributes")?;
        mq.close().context("closing")?;

        report.record("default queue capacity", attrs.max_messages.to_string());
        report.record("default maximum message length", attrs.max_message_size.to_string());
        report.observe(
            "defaults allow a message",
            "yes",
            if attrs.max_messages > 0 && attrs.max_message_size > 0 {
                "yes"
            } else {
                "no"
            },
        );
        Ok(report)
    }
}
