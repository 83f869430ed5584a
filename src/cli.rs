use crate::mode::OpenModeSpec;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// mq - work with POSIX message queues
///
/// Wraps the message queue functions thinly to expose as many error
/// conditions as possible.
#[derive(Parser, Debug)]
#[clap(name = "mq", version, about, long_about = None, after_help = MODE_HELP)]
pub struct Args {
    /// Output format for listings, attributes, received messages and probe reports
    #[clap(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Where the mqueue filesystem is mounted (used by `ls`)
    #[clap(long, global = true, default_value = crate::defaults::MQUEUE_DIR)]
    pub mqueue_dir: PathBuf,

    /// Verbose output
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

const MODE_HELP: &str = "\
openmode format: flags[perms][,capacity,size]
    flags: r=O_RDONLY, w=O_WRONLY, b=O_RDWR, c=O_CREAT, e=O_EXCL
           n=O_NONBLOCK, s=O_CLOEXEC
    If there is only a single number it is used for permissions,
    if there are two they are used for capacity and size limit.
    Examples: 'b' 'wcn8,1024' 'rce700' 'rce733,10,200'";

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List all existing queues
    Ls,

    /// Delete one or more queues (mq_unlink)
    #[clap(alias = "unlink")]
    Rm {
        #[clap(required = true, num_args = 1.., value_name = "NAME")]
        names: Vec<String>,
    },

    /// Print the attributes of one or more queues (mq_getattr)
    #[clap(alias = "getattr")]
    Stat {
        /// Queue names, each followed by its open mode
        #[clap(required = true, num_args = 1.., value_name = "NAME MODE")]
        pairs: Vec<String>,
    },

    /// Receive one message and print its priority followed by its content
    #[clap(alias = "receive")]
    Read {
        name: String,

        #[clap(value_parser = parse_mode)]
        mode: OpenModeSpec,

        /// Give up after this many seconds (mq_timedreceive)
        timeout: Option<u64>,
    },

    /// Send one message
    #[clap(alias = "send")]
    Write {
        name: String,

        #[clap(value_parser = parse_mode)]
        mode: OpenModeSpec,

        priority: u32,

        #[clap(allow_hyphen_values = true, value_parser = clap::value_parser!(OsString))]
        message: OsString,

        /// Give up after this many seconds (mq_timedsend)
        timeout: Option<u64>,
    },

    /// Check how this system's message queues behave in known problem areas
    Probe {
        #[clap(value_enum, num_args = 0.., default_values_t = vec![ProbeKind::All])]
        kinds: Vec<ProbeKind>,

        /// Prefix for the names of the queues the probes create
        #[clap(long, default_value = crate::defaults::PROBE_PREFIX)]
        prefix: String,

        /// How many times the emfile probe reopens its queue
        #[clap(long, default_value_t = crate::defaults::EMFILE_CYCLES)]
        emfile_cycles: usize,
    },

    /// Report on an inherited descriptor (run by the cloexec probe after exec)
    #[clap(hide = true)]
    InspectFd { label: String, fd: RawFd },
}

fn parse_mode(s: &str) -> Result<OpenModeSpec, crate::mode::ParseError> {
    s.parse()
}

/// How results are printed
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Plain text, matching the traditional layout
    #[clap(name = "text")]
    Text,

    /// One JSON document per result
    #[clap(name = "json")]
    Json,
}

/// Available conformance probes
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ProbeKind {
    /// Close-on-exec inheritance across fork+exec, dup and fcntl/ioctl toggles
    #[clap(name = "cloexec")]
    Cloexec,

    /// Repeated open+close of one name must not run out of descriptors
    #[clap(name = "emfile")]
    Emfile,

    /// A queue must be gone for new opens right after it is unlinked
    #[clap(name = "unlink-race")]
    UnlinkRace,

    /// A non-blocking receive on an empty queue must fail immediately
    #[clap(name = "nonblock")]
    Nonblock,

    /// Capacity and message size a queue gets when none are requested
    #[clap(name = "default-capacities")]
    DefaultCapacities,

    /// Search for the largest priority, capacity and message size, and check
    /// which names and message sizes are accepted
    #[clap(name = "limits")]
    Limits,

    /// All available probes
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Cloexec => write!(f, "cloexec"),
            ProbeKind::Emfile => write!(f, "emfile"),
            ProbeKind::UnlinkRace => write!(f, "unlink-race"),
            ProbeKind::Nonblock => write!(f, "nonblock"),
            ProbeKind::DefaultCapacities => write!(f, "default-capacities"),
            ProbeKind::Limits => write!(f, "limits"),
            ProbeKind::All => write!(f, "all"),
        }
    }
}

impl ProbeKind {
    /// Expand the "All" variant to all available probes
    pub fn expand_all(kinds: Vec<ProbeKind>) -> Vec<ProbeKind> {
        if kinds.is_empty() || kinds.contains(&ProbeKind::All) {
            vec![
                ProbeKind::Cloexec,
                ProbeKind::Emfile,
                ProbeKind::UnlinkRace,
                ProbeKind::Nonblock,
                ProbeKind::DefaultCapacities,
                ProbeKind::Limits,
            ]
        } else {
            kinds
        }
    }
}
