//! Status output and heartbeat collaborators.
//!
//! The diagnostic sink receives the human readable status lines of the
//! peripheral ("Starting Peripheral", "Central disconnected", ...). It is
//! separate from the `log`/`defmt` trace and is usually a serial port.
use core::fmt::Write;

/// Longest diagnostic line. Longer lines are cut.
pub const MAX_LINE_LEN: usize = 64;

/// A formatted diagnostic line.
pub type Line = heapless::String<MAX_LINE_LEN>;

/// Line oriented, fire-and-forget status output.
pub trait DiagnosticSink {
    /// Emit one line. Must not block.
    fn write_line(&mut self, line: &str);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &mut T {
    fn write_line(&mut self, line: &str) {
        T::write_line(self, line)
    }
}

/// Discards every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn write_line(&mut self, _line: &str) {}
}

/// Forwards lines to the enabled logger at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn write_line(&mut self, line: &str) {
        info!("{}", line);
    }
}

/// Periodic visual heartbeat, typically an LED toggle.
pub trait Heartbeat {
    /// Called once per tick. Must not block.
    fn beat(&mut self);
}

impl<F: FnMut()> Heartbeat for F {
    fn beat(&mut self) {
        self()
    }
}

pub(crate) fn format_line(args: core::fmt::Arguments<'_>) -> Line {
    let mut line = Line::new();
    // Overflow leaves the part that fit.
    let _ = line.write_fmt(args);
    line
}
