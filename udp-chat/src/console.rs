//! Operator-visible output.
//!
//! Everything the operator should see goes through a [`Console`] as a
//! [`Notice`]; diagnostics go through `log` instead.  Keeping the two apart
//! lets tests assert on exactly what was displayed.

use std::fmt;
use std::io::Write;

/// One line shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Connection life-cycle and query results.
    Status(String),
    /// Chat traffic and join/leave announcements.
    Chat(String),
    /// Text sent by the coordinator.
    Server(String),
    /// Local input that was refused.
    Warning(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Status(s) => write!(f, "[STATUS] {s}"),
            Notice::Chat(s) => write!(f, "[CHAT] {s}"),
            Notice::Server(s) => write!(f, "[SERVER] {s}"),
            Notice::Warning(s) => write!(f, "[WARNING] {s}"),
        }
    }
}

/// Sink for operator-visible notices.
pub trait Console {
    fn show(&mut self, notice: Notice);
}

/// Writes each notice as one line on stdout.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn show(&mut self, notice: Notice) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not take the session down with it.
        if let Err(e) = writeln!(out, "{notice}").and_then(|()| out.flush()) {
            log::warn!("[console] cannot write to stdout: {e}");
        }
    }
}

/// Records notices in memory.
impl Console for Vec<Notice> {
    fn show(&mut self, notice: Notice) {
        self.push(notice);
    }
}
