//! # Open-Mode Parser
//!
//! Parses the compact mode strings accepted for every queue argument:
//!
//! ```text
//! flags[permissions][,capacity,size]
//! ```
//!
//! Flags are single characters (`r` read-only, `w` write-only, `b` read-write,
//! `c` create, `e` exclusive, `n` non-blocking, `s` close-on-exec). Scanning of
//! flags stops at the first character that is not a flag; everything after that
//! point must be a comma-separated list of up to three decimal numbers.
//!
//! | Numbers | Meaning |
//! |---|---|
//! | 0 | default permissions (0640), system default capacity |
//! | 1 | permissions (octal) |
//! | 2 | capacity, maximum message size |
//! | 3 | permissions (octal), capacity, maximum message size |
//!
//! ## Examples
//!
//! ```rust
//! use mqtool::mode::{AccessMode, Capacity, OpenModeSpec};
//!
//! let spec: OpenModeSpec = "wc700,10,1024".parse().unwrap();
//! assert_eq!(spec.access, Some(AccessMode::WriteOnly));
//! assert!(spec.create);
//! assert_eq!(spec.permissions, 0o700);
//! assert_eq!(spec.capacity, Some(Capacity { max_messages: 10, max_message_size: 1024 }));
//! ```

use nix::mqueue::MQ_OFlag;
use nix::sys::stat::Mode;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Permissions used when the mode string carries none.
pub const DEFAULT_PERMISSIONS: u32 = 0o640;

/// Highest value accepted for the permissions field.
const MAX_PERMISSIONS: u32 = 0o7777;

/// Most numeric fields a mode string may contain.
const MAX_NUMBERS: usize = 3;

/// Errors produced while parsing a mode string or the shape of the argument list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid open mode {0}")]
    InvalidModeChar(char),

    #[error("mode flags must come before other open options (found '{0}' after a number)")]
    FlagAfterNumber(char),

    #[error("Empty number in open options (at offset {position})")]
    EmptyNumber { position: usize },

    #[error("Too many numbers in open options (at most {MAX_NUMBERS} are allowed)")]
    TooManyNumbers,

    #[error("conflicting access modes '{first}' and '{second}'")]
    ConflictingAccess { first: char, second: char },

    #[error("invalid permissions '{0}': expected an octal number no larger than 7777")]
    InvalidPermissions(String),

    #[error("invalid number '{0}' in open options")]
    InvalidNumber(String),

    #[error("queue name '{0}' is missing its open mode")]
    UnpairedStatArgument(String),

    #[error("message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge { len: usize, max: usize },
}

/// How the queue is opened for I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    fn flag_char(self) -> char {
        match self {
            AccessMode::ReadOnly => 'r',
            AccessMode::WriteOnly => 'w',
            AccessMode::ReadWrite => 'b',
        }
    }

    fn oflag(self) -> MQ_OFlag {
        match self {
            AccessMode::ReadOnly => MQ_OFlag::O_RDONLY,
            AccessMode::WriteOnly => MQ_OFlag::O_WRONLY,
            AccessMode::ReadWrite => MQ_OFlag::O_RDWR,
        }
    }
}

/// Limits a queue is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capacity {
    pub max_messages: u64,
    pub max_message_size: u64,
}

/// Parsed form of a mode string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenModeSpec {
    /// `None` when the mode string has no access flag; the zero value is passed
    /// to `mq_open()` unchanged in that case.
    pub access: Option<AccessMode>,
    pub create: bool,
    pub exclusive: bool,
    pub nonblocking: bool,
    pub cloexec: bool,
    pub permissions: u32,
    pub capacity: Option<Capacity>,
}

impl Default for OpenModeSpec {
    fn default() -> Self {
        Self {
            access: None,
            create: false,
            exclusive: false,
            nonblocking: false,
            cloexec: false,
            permissions: DEFAULT_PERMISSIONS,
            capacity: None,
        }
    }
}

impl OpenModeSpec {
    /// Flags for `mq_open()`
    pub fn oflag(&self) -> MQ_OFlag {
        let mut flags = self.access.map(AccessMode::oflag).unwrap_or(MQ_OFlag::empty());
        if self.create {
            flags |= MQ_OFlag::O_CREAT;
        }
        if self.exclusive {
            flags |= MQ_OFlag::O_EXCL;
        }
        if self.nonblocking {
            flags |= MQ_OFlag::O_NONBLOCK;
        }
        if self.cloexec {
            flags |= MQ_OFlag::O_CLOEXEC;
        }
        flags
    }

    /// Permission bits for `mq_open()`
    pub fn mode(&self) -> Mode {
        Mode::from_bits_truncate(self.permissions as libc::mode_t)
    }

    /// Set one flag, returning `false` if `c` isn't part of the flag alphabet.
    fn apply_flag(&mut self, c: char) -> Result<bool, ParseError> {
        let access = match c {
            'r' => AccessMode::ReadOnly,
            'w' => AccessMode::WriteOnly,
            'b' => AccessMode::ReadWrite,
            'c' => {
                self.create = true;
                return Ok(true);
            }
            'e' => {
                self.exclusive = true;
                return Ok(true);
            }
            'n' => {
                self.nonblocking = true;
                return Ok(true);
            }
            's' => {
                self.cloexec = true;
                return Ok(true);
            }
            _ => return Ok(false),
        };
        match self.access {
            Some(existing) if existing != access => Err(ParseError::ConflictingAccess {
                first: existing.flag_char(),
                second: c,
            }),
            _ => {
                self.access = Some(access);
                Ok(true)
            }
        }
    }
}

impl FromStr for OpenModeSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = OpenModeSpec::default();

        let mut rest = s;
        for (i, c) in s.char_indices() {
            if !spec.apply_flag(c)? {
                rest = &s[i..];
                break;
            }
            rest = &s[i + c.len_utf8()..];
        }
        let offset = s.len() - rest.len();

        let numbers = split_numbers(rest, offset)?;
        if numbers.len() % 2 == 1 {
            spec.permissions = parse_permissions(numbers[0])?;
        }
        if numbers.len() >= 2 {
            let n = numbers.len();
            spec.capacity = Some(Capacity {
                max_messages: parse_decimal(numbers[n - 2])?,
                max_message_size: parse_decimal(numbers[n - 1])?,
            });
        }
        Ok(spec)
    }
}

/// Split the part after the flags into digit runs.
fn split_numbers(region: &str, offset: usize) -> Result<Vec<&str>, ParseError> {
    let mut numbers: Vec<&str> = Vec::with_capacity(MAX_NUMBERS);
    let mut start: Option<usize> = None;

    for (i, c) in region.char_indices() {
        match c {
            '0'..='9' => {
                if start.is_none() {
                    if numbers.len() == MAX_NUMBERS {
                        return Err(ParseError::TooManyNumbers);
                    }
                    start = Some(i);
                }
            }
            ',' => match start.take() {
                Some(begin) => numbers.push(&region[begin..i]),
                None => return Err(ParseError::EmptyNumber { position: offset + i }),
            },
            other if numbers.is_empty() && start.is_none() => {
                return Err(ParseError::InvalidModeChar(other));
            }
            other => return Err(ParseError::FlagAfterNumber(other)),
        }
    }

    match start {
        Some(begin) => numbers.push(&region[begin..]),
        // a trailing comma leaves an empty last field
        None if region.ends_with(',') => {
            return Err(ParseError::EmptyNumber { position: offset + region.len() });
        }
        None => {}
    }
    Ok(numbers)
}

fn parse_permissions(digits: &str) -> Result<u32, ParseError> {
    match u32::from_str_radix(digits, 8) {
        Ok(perms) if perms <= MAX_PERMISSIONS => Ok(perms),
        _ => Err(ParseError::InvalidPermissions(digits.to_string())),
    }
}

fn parse_decimal(digits: &str) -> Result<u64, ParseError> {
    digits
        .parse()
        .map_err(|_| ParseError::InvalidNumber(digits.to_string()))
}

impl fmt::Display for OpenModeSpec {
    /// Renders the canonical mode string, which parses back to an equal spec.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(access) = self.access {
            write!(f, "{}", access.flag_char())?;
        }
        for (set, c) in [
            (self.create, 'c'),
            (self.exclusive, 'e'),
            (self.nonblocking, 'n'),
            (self.cloexec, 's'),
        ] {
            if set {
                write!(f, "{}", c)?;
            }
        }
        let custom_permissions = self.permissions != DEFAULT_PERMISSIONS;
        if custom_permissions {
            write!(f, "{:o}", self.permissions)?;
        }
        if let Some(capacity) = self.capacity {
            // the separator only follows a number
            if custom_permissions {
                write!(f, ",")?;
            }
            write!(f, "{},{}", capacity.max_messages, capacity.max_message_size)?;
        }
        Ok(())
    }
}
