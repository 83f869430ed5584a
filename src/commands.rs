//! # Command Dispatcher
//!
//! Executes one parsed [`Command`] and renders its result. Every command is a
//! single pass: parse the open modes, open the queues, perform exactly one
//! operation per queue, and close the handles again. The first failure ends
//! the command; nothing is retried.
//!
//! Output goes to the writer the dispatcher was created with (stdout for the
//! binary), either as the traditional text layout or as JSON.

use crate::cli::{Command, OutputFormat, ProbeKind};
use crate::error::MqError;
use crate::mode::{OpenModeSpec, ParseError};
use crate::probe::{ProbeConfig, ProbeFactory, ProbeReport};
use crate::queue::{self, Message, QueueAttributes, QueueHandle};
use crate::utils::deadline_after;
use anyhow::Context;
use nix::sys::time::TimeSpec;
use serde::Serialize;
use std::ffi::OsStr;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Serialize)]
struct QueueList<'a> {
    queues: &'a [String],
}

#[derive(Serialize)]
struct QueueStat<'a> {
    name: &'a str,
    attributes: QueueAttributes,
}

/// `message` is the payload decoded as UTF-8 with invalid sequences replaced;
/// `payload` carries the exact bytes.
#[derive(Serialize)]
struct ReceivedMessage<'a> {
    priority: u32,
    len: usize,
    message: std::borrow::Cow<'a, str>,
    payload: &'a [u8],
}

/// Runs commands against the message queue facility
pub struct Dispatcher<W: Write> {
    out: W,
    format: OutputFormat,
    mqueue_dir: PathBuf,
    inspector: Option<PathBuf>,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(out: W, format: OutputFormat, mqueue_dir: PathBuf) -> Self {
        Self {
            out,
            format,
            mqueue_dir,
            inspector: None,
        }
    }

    /// Executable the cloexec probe runs in its child processes
    ///
    /// Defaults to the current executable.
    pub fn with_inspector(mut self, inspector: PathBuf) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Execute `command`, returning the process exit status on success
    pub fn run(&mut self, command: &Command) -> Result<u8, MqError> {
        match command {
            Command::Ls => self.list()?,
            Command::Rm { names } => self.remove(names)?,
            Command::Stat { pairs } => self.stat(pairs)?,
            Command::Read {
                name,
                mode,
                timeout,
            } => self.read(name, mode, *timeout)?,
            Command::Write {
                name,
                mode,
                priority,
                message,
                timeout,
            } => self.write(name, mode, *priority, message, *timeout)?,
            Command::Probe {
                kinds,
                prefix,
                emfile_cycles,
            } => self.probe(kinds, prefix, *emfile_cycles)?,
            Command::InspectFd { label, fd } => {
                return Ok(crate::probe::cloexec::inspect_fd(label, *fd));
            }
        }
        self.out.flush()?;
        Ok(0)
    }

    fn list(&mut self) -> Result<(), MqError> {
        let names = queue::list_names(&self.mqueue_dir).map_err(|source| MqError::List {
            dir: self.mqueue_dir.clone(),
            source,
        })?;
        match self.format {
            OutputFormat::Text => {
                for name in &names {
                    writeln!(self.out, "{}", name)?;
                }
            }
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &QueueList { queues: &names })?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn remove(&mut self, names: &[String]) -> Result<(), MqError> {
        for name in names {
            queue::unlink(name)?;
            info!("Deleted {}", name);
        }
        Ok(())
    }

    fn stat(&mut self, pairs: &[String]) -> Result<(), MqError> {
        if pairs.len() % 2 != 0 {
            let unpaired = pairs.last().cloned().unwrap_or_default();
            return Err(ParseError::UnpairedStatArgument(unpaired).into());
        }

        for pair in pairs.chunks(2) {
            let (name, mode) = (&pair[0], &pair[1]);
            let spec: OpenModeSpec = mode.parse()?;
            let mq = QueueHandle::open(name, &spec)?;
            let attributes = mq.attributes().map_err(MqError::Attributes)?;
            mq.close().map_err(MqError::Close)?;
            self.render_attributes(name, &attributes)?;
        }
        Ok(())
    }

    fn render_attributes(&mut self, name: &str, attrs: &QueueAttributes) -> Result<(), MqError> {
        match self.format {
            OutputFormat::Text => write!(
                self.out,
                "name: {}\nmaxmsg: {}\nmsgsize: {}\ncurmsgs: {}\nflags: 0x{:x}\n (nonblocking: {})\n",
                name,
                attrs.max_messages,
                attrs.max_message_size,
                attrs.current_messages,
                attrs.flags,
                if attrs.nonblocking { "yes" } else { "no" }
            )?,
            OutputFormat::Json => {
                let stat = QueueStat {
                    name,
                    attributes: *attrs,
                };
                serde_json::to_writer(&mut self.out, &stat)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn read(
        &mut self,
        name: &str,
        spec: &OpenModeSpec,
        timeout: Option<u64>,
    ) -> Result<(), MqError> {
        let mq = QueueHandle::open(name, spec)?;
        let deadline = deadline(timeout)?;
        let message = mq.receive_message(deadline.as_ref())?;
        mq.close().map_err(MqError::Close)?;

        match self.format {
            OutputFormat::Text => {
                write!(self.out, "{:2} ", message.priority)?;
                self.out.write_all(&message.payload)?;
                writeln!(self.out)?;
            }
            OutputFormat::Json => {
                let received = ReceivedMessage {
                    priority: message.priority,
                    len: message.payload.len(),
                    message: String::from_utf8_lossy(&message.payload),
                    payload: &message.payload,
                };
                serde_json::to_writer(&mut self.out, &received)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    fn write(
        &mut self,
        name: &str,
        spec: &OpenModeSpec,
        priority: u32,
        payload: &OsStr,
        timeout: Option<u64>,
    ) -> Result<(), MqError> {
        let message = Message::new(priority, payload.as_bytes().to_vec())?;
        let mq = QueueHandle::open(name, spec)?;
        let deadline = deadline(timeout)?;
        mq.send(&message, deadline.as_ref())?;
        mq.close().map_err(MqError::Close)?;
        Ok(())
    }

    fn probe(
        &mut self,
        kinds: &[ProbeKind],
        prefix: &str,
        emfile_cycles: usize,
    ) -> Result<(), MqError> {
        let inspector = match &self.inspector {
            Some(path) => path.clone(),
            None => std::env::current_exe().context("locating the mq executable")?,
        };
        let config = ProbeConfig {
            queue_prefix: prefix.to_string(),
            inspector,
            emfile_cycles,
        };

        let mut failed = Vec::new();
        for kind in ProbeKind::expand_all(kinds.to_vec()) {
            let probe = ProbeFactory::create(kind)?;
            debug!("Running probe {}: {}", probe.name(), probe.description());
            let report = probe
                .run(&config)
                .with_context(|| format!("probe {} could not run", probe.name()))?;
            self.render_report(&report)?;
            if !report.passed {
                failed.push(report.probe);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(MqError::ProbeFailed(failed.join(", ")))
        }
    }

    fn render_report(&mut self, report: &ProbeReport) -> Result<(), MqError> {
        match self.format {
            OutputFormat::Text => write!(self.out, "{}", report)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, report)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}

fn deadline(timeout: Option<u64>) -> Result<Option<TimeSpec>, MqError> {
    timeout
        .map(deadline_after)
        .transpose()
        .map_err(MqError::Clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(format: OutputFormat, dir: PathBuf) -> Dispatcher<Vec<u8>> {
        Dispatcher::new(Vec::new(), format, dir)
    }

    fn output(d: Dispatcher<Vec<u8>>) -> String {
        String::from_utf8(d.into_inner()).unwrap()
    }

    #[test]
    fn test_ls_text_and_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();

        let mut d = dispatcher(OutputFormat::Text, dir.path().to_path_buf());
        assert_eq!(d.run(&Command::Ls).unwrap(), 0);
        assert_eq!(output(d), "/a\n/b\n");

        let mut d = dispatcher(OutputFormat::Json, dir.path().to_path_buf());
        d.run(&Command::Ls).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output(d)).unwrap();
        assert_eq!(value["queues"], serde_json::json!(["/a", "/b"]));
    }

    #[test]
    fn test_ls_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut d = dispatcher(OutputFormat::Text, missing.clone());
        let err = d.run(&Command::Ls).unwrap_err();
        assert!(matches!(err, MqError::List { ref dir, .. } if *dir == missing));
        assert_eq!(err.errno(), Some(nix::errno::Errno::ENOENT));
    }

    #[test]
    fn test_stat_rejects_unpaired_arguments() {
        let mut d = dispatcher(OutputFormat::Text, PathBuf::from("/dev/mqueue"));
        let err = d
            .run(&Command::Stat {
                pairs: vec!["/a".to_string(), "r".to_string(), "/b".to_string()],
            })
            .unwrap_err();
        assert!(matches!(
            err,
            MqError::Parse(ParseError::UnpairedStatArgument(ref name)) if name == "/b"
        ));
    }

    #[test]
    fn test_stat_rejects_bad_mode_before_opening() {
        let mut d = dispatcher(OutputFormat::Text, PathBuf::from("/dev/mqueue"));
        let err = d
            .run(&Command::Stat {
                pairs: vec!["/never_opened".to_string(), "r1,2,3,4".to_string()],
            })
            .unwrap_err();
        assert!(matches!(err, MqError::Parse(ParseError::TooManyNumbers)));
    }

    #[test]
    fn test_render_attributes_text() {
        let mut d = dispatcher(OutputFormat::Text, PathBuf::new());
        let attrs = QueueAttributes {
            max_messages: 10,
            max_message_size: 8192,
            current_messages: 2,
            flags: 0x800,
            nonblocking: true,
        };
        d.render_attributes("/q", &attrs).unwrap();
        assert_eq!(
            output(d),
            "name: /q\nmaxmsg: 10\nmsgsize: 8192\ncurmsgs: 2\nflags: 0x800\n (nonblocking: yes)\n"
        );
    }

    #[test]
    fn test_write_rejects_oversized_message() {
        let mut d = dispatcher(OutputFormat::Text, PathBuf::new());
        let huge = "x".repeat(crate::defaults::MAX_MESSAGE_SIZE + 1);
        let err = d
            .run(&Command::Write {
                name: "/never_opened".to_string(),
                mode: "w".parse().unwrap(),
                priority: 0,
                message: huge.into(),
                timeout: None,
            })
            .unwrap_err();
        assert!(matches!(err, MqError::Parse(ParseError::MessageTooLarge { .. })));
    }
}
