use crate::cli::ProbeKind;
use crate::error::UnlinkError;
use crate::queue;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

pub mod capacities;
pub mod cloexec;
pub mod emfile;
pub mod limits;
pub mod nonblock;
pub mod unlink_race;

pub use capacities::DefaultCapacitiesProbe;
pub use cloexec::CloexecProbe;
pub use emfile::EmfileProbe;
pub use limits::LimitsProbe;
pub use nonblock::NonblockProbe;
pub use unlink_race::UnlinkRaceProbe;

/// Settings shared by all probes
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Prefix for the names of the queues the probes create
    pub queue_prefix: String,
    /// Executable run with `inspect-fd` in the cloexec probe's child processes
    pub inspector: PathBuf,
    /// How many times the emfile probe reopens its queue
    pub emfile_cycles: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            queue_prefix: crate::defaults::PROBE_PREFIX.to_string(),
            inspector: PathBuf::from("mq"),
            emfile_cycles: crate::defaults::EMFILE_CYCLES,
        }
    }
}

/// One step of a probe and what came of it
///
/// Steps without an expectation only record a value of the platform, such
/// as a limit, and never fail the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub step: String,
    pub expected: Option<String>,
    pub observed: String,
    pub ok: bool,
}

/// Outcome of running a single probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub probe: &'static str,
    pub passed: bool,
    pub observations: Vec<Observation>,
}

impl ProbeReport {
    pub fn new(probe: &'static str) -> Self {
        Self {
            probe,
            passed: true,
            observations: Vec::new(),
        }
    }

    /// Record a step; the report fails if `observed` differs from `expected`
    pub fn observe(
        &mut self,
        step: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) {
        let expected = expected.into();
        let observed = observed.into();
        let ok = expected == observed;
        self.passed &= ok;
        self.observations.push(Observation {
            step: step.into(),
            expected: Some(expected),
            observed,
            ok,
        });
    }

    /// Record a value that has no expected outcome
    pub fn record(&mut self, step: impl Into<String>, observed: impl Into<String>) {
        self.observations.push(Observation {
            step: step.into(),
            expected: None,
            observed: observed.into(),
            ok: true,
        });
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.probe, if self.passed { "PASS" } else { "FAIL" })?;
        for observation in &self.observations {
            match &observation.expected {
                Some(expected) => write!(
                    f,
                    "  {}: expected {}, observed {}",
                    observation.step, expected, observation.observed
                )?,
                None => write!(f, "  {}: {}", observation.step, observation.observed)?,
            }
            if !observation.ok {
                write!(f, " <--")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A conformance check against the platform's message queues
pub trait Probe {
    /// Short name, as accepted on the command line
    fn name(&self) -> &'static str;

    /// One line about what is checked
    fn description(&self) -> &'static str;

    /// Run the probe
    ///
    /// `Err` means the probe could not be carried out at all (for example a
    /// setup step failed); behavior that differs from the expectation is
    /// reported through a failed [`ProbeReport`] instead.
    fn run(&self, config: &ProbeConfig) -> Result<ProbeReport>;
}

/// Probe factory for creating probe instances
pub struct ProbeFactory;

impl ProbeFactory {
    /// Create a probe based on its kind
    pub fn create(kind: ProbeKind) -> Result<Box<dyn Probe>> {
        match kind {
            ProbeKind::Cloexec => Ok(Box::new(CloexecProbe)),
            ProbeKind::Emfile => Ok(Box::new(EmfileProbe)),
            ProbeKind::UnlinkRace => Ok(Box::new(UnlinkRaceProbe)),
            ProbeKind::Nonblock => Ok(Box::new(NonblockProbe)),
            ProbeKind::DefaultCapacities => Ok(Box::new(DefaultCapacitiesProbe)),
            ProbeKind::Limits => Ok(Box::new(LimitsProbe)),
            ProbeKind::All => Err(anyhow::anyhow!(
                "'All' probe kind should be expanded before probe creation"
            )),
        }
    }
}

/// Unlinks a probe's queue when the probe is done with it
pub(crate) struct TempQueue {
    name: String,
}

impl TempQueue {
    pub(crate) fn new(name: String) -> Self {
        Self { name }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TempQueue {
    fn drop(&mut self) {
        match queue::unlink(&self.name) {
            Ok(()) | Err(UnlinkError::NotFound) => {}
            Err(e) => warn!("Failed to unlink probe queue '{}': {}", self.name, e),
        }
    }
}
