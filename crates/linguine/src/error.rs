use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can fail during registration or execution.
pub type RunResult<T> = Result<T, RunError>;

/// The error taxonomy produced by the core (see §7).
///
/// Uses strum derives for automatic `Display`/`FromStr` the same way the rest of the
/// runtime's name-keyed enums do, rather than hand-rolling a `fmt::Display` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    OutOfMemory,
    BrokenBytecode,
    TypeError,
    DivisionByZero,
    IndexOutOfRange,
    KeyNotFound,
    SymbolNotFound,
    CallError,
    HostError,
}

/// A single runtime failure: its kind, a short message, and the source location that was
/// active (per the most recent `LINEINFO`) when it was raised.
///
/// There is no local recovery path in the core: any helper that can fail returns
/// `RunResult<T>`, and the interpreter's dispatch loop propagates the first error it sees
/// straight out to the host (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: String,
    pub line: u32,
}

impl RunError {
    pub fn new(kind: ErrorKind, file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), file: file.into(), line }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: error: {}", self.file, self.line, self.message)
    }
}

impl std::error::Error for RunError {}
