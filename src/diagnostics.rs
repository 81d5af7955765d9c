//! Severity-tagged diagnostics and operation outcomes.
//!
//! Codec steps report format problems into a [`Diagnostics`] log instead of
//! failing outright, and summarise each step as an [`OperationStatus`]
//! bitmask. Only [`Severity::Critical`] records turn an outcome into a
//! failure.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    fn log_level(self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Critical => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Position in an archive stream a record refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Context {
    /// Element index; 0 for header records.
    pub element: u64,
    /// Component index within the element or header.
    pub component: u8,
}

impl Context {
    pub fn new(element: u64, component: u8) -> Self {
        Self { element, component }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub context: Option<Context>,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(
                f,
                "[{}] element {} component {}: {}",
                self.severity, ctx.element, ctx.component, self.message
            ),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

/// Append-only record log with per-severity counts.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    records: Vec<LogRecord>,
    counts: [usize; 5],
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and forwards it to the `log` facade.
    pub fn push(&mut self, severity: Severity, context: Option<Context>, message: impl Into<String>) {
        let record = LogRecord {
            severity,
            context,
            message: message.into(),
        };
        log::log!(target: "archio::diagnostics", severity.log_level(), "{record}");
        self.counts[severity as usize] += 1;
        self.records.push(record);
    }

    pub fn critical(&mut self, context: Context, message: impl Into<String>) {
        self.push(Severity::Critical, Some(context), message);
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogRecord> {
        self.records.iter()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.counts[severity as usize]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    /// Most recent critical record, if any.
    pub fn last_critical(&self) -> Option<&LogRecord> {
        self.records.iter().rev().find(|r| r.severity == Severity::Critical)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.counts = [0; 5];
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a LogRecord;
    type IntoIter = std::slice::Iter<'a, LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Outcome bitmask of a codec step.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OperationStatus(u8);

impl OperationStatus {
    pub const INCOMPLETE: Self = Self(0x01);
    pub const SUCCESS: Self = Self(0x02);
    pub const FAILURE: Self = Self(0x04);
    pub const RECOVERABLE: Self = Self(0x08);
    pub const FATAL: Self = Self(0x10);
    pub const REQUIRED_CONSTRAINTS_UPDATED: Self = Self(0x20);
    pub const PREFERRED_CONSTRAINTS_UPDATED: Self = Self(0x40);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::INCOMPLETE, "incomplete"),
        (Self::SUCCESS, "success"),
        (Self::FAILURE, "failure"),
        (Self::RECOVERABLE, "recoverable"),
        (Self::FATAL, "fatal"),
        (Self::REQUIRED_CONSTRAINTS_UPDATED, "required-constraints-updated"),
        (Self::PREFERRED_CONSTRAINTS_UPDATED, "preferred-constraints-updated"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x7f)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_success(self) -> bool {
        self.contains(Self::SUCCESS)
    }

    pub fn is_failure(self) -> bool {
        self.contains(Self::FAILURE)
    }

    pub fn is_fatal(self) -> bool {
        self.contains(Self::FATAL)
    }

    pub fn is_incomplete(self) -> bool {
        self.contains(Self::INCOMPLETE)
    }

    /// `FAILURE | FATAL`.
    pub const fn fatal_failure() -> Self {
        Self(Self::FAILURE.0 | Self::FATAL.0)
    }
}

impl BitOr for OperationStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OperationStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationStatus({self})")
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}
