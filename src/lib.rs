//! # mqtool
//!
//! A command line tool and library for poking at POSIX message queues.
//!
//! The `mq` binary wraps the message queue functions thinly, so that as many
//! of the error conditions the OS reports as possible reach the user, each
//! decoded through a table specific to the call that failed.
//!
//! ## Architecture Overview
//!
//! - `mode`: parser for the compact open-mode strings (`"wcn8,1024"`)
//! - `queue`: scoped queue handle and the raw queue operations
//! - `error`: per-operation errno cause tables and the command error type
//! - `commands`: dispatcher for `ls`, `rm`, `stat`, `read`, `write` and `probe`
//! - `probe`: conformance probes for known OS quirks
//! - `cli`: command-line interface
//! - `logging`: tracing subscriber setup
//! - `utils`: deadlines, unique queue names and environment checks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use mqtool::{queue, Message, OpenModeSpec, QueueHandle};
//!
//! fn main() -> anyhow::Result<()> {
//!     let spec: OpenModeSpec = "bc600,10,1024".parse()?;
//!     let mq = QueueHandle::open("/example", &spec)?;
//!     mq.send(&Message::new(5, b"hello".to_vec())?, None)?;
//!
//!     let message = mq.receive_message(None)?;
//!     assert_eq!(message.payload, b"hello");
//!
//!     mq.close()?;
//!     queue::unlink("/example")?;
//!     Ok(())
//! }
//! ```

/// Command-line interface
///
/// Argument parsing using clap, including the probe selection with "all"
/// expansion and the global output options.
pub mod cli;

/// Command execution
///
/// Runs one parsed command against the message queue facility and renders
/// its result as text or JSON.
pub mod commands;

/// Error taxonomy
///
/// Separate errno cause tables for open, send, receive and unlink, plus the
/// error type every command returns.
pub mod error;

pub mod logging;

/// Open-mode parsing
pub mod mode;

/// Conformance probes
///
/// Short fixed sequences of queue calls checking behavior that differs
/// between operating systems, such as close-on-exec inheritance or spurious
/// EMFILE on reopen. Two of them only report platform defaults and limits.
pub mod probe;

/// Queue handle and operations
pub mod queue;

pub mod utils;

pub use cli::{Args, Command, OutputFormat, ProbeKind};
pub use commands::Dispatcher;
pub use error::MqError;
pub use mode::{AccessMode, Capacity, OpenModeSpec, ParseError};
pub use queue::{Message, QueueAttributes, QueueHandle};

/// Default configuration values
pub mod defaults {
    /// Largest message the tool sends or receives
    ///
    /// Independent of the capacity of any particular queue; receive buffers
    /// are always this large so that every queue's messages fit.
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Mount point of the mqueue filesystem on Linux
    pub const MQUEUE_DIR: &str = "/dev/mqueue";

    /// Name prefix for queues created by probes
    pub const PROBE_PREFIX: &str = "mqtool_probe";

    /// Number of open+close cycles the emfile probe performs
    ///
    /// The NetBSD bug it looks for shows up on the third open.
    pub const EMFILE_CYCLES: usize = 3;
}
