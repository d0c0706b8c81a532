//! Early boot console output
//!
//! The real UART/VGA backend is a machine-dependent concern (see spec.md §1,
//! "OUT OF SCOPE" -- the trap entry stub and register save/restore live on
//! the other side of the same boundary). This module provides the one sink
//! the core itself needs: somewhere for [`crate::log_service`] and the
//! `serial_println!` macro to write early boot trace before the console
//! vnode (spec.md §4.6) is available.
//!
//! On a hosted build (`cfg(not(target_os = "none"))`, used for `cargo test`)
//! this writes to stdout. On a bare-metal build a
//! platform crate is expected to call [`install_sink`]; until then writes
//! are dropped.

use core::fmt;

use spin::Mutex;

/// A destination for early console bytes.
pub trait ConsoleSink: Send {
    fn write_bytes(&mut self, bytes: &[u8]);
}

static SINK: Mutex<Option<&'static mut dyn ConsoleSink>> = Mutex::new(None);

/// Install a platform console sink, replacing the default no-op.
pub fn install_sink(sink: &'static mut dyn ConsoleSink) {
    *SINK.lock() = Some(sink);
}

#[cfg(not(target_os = "none"))]
struct StdoutSink;

#[cfg(not(target_os = "none"))]
impl ConsoleSink for StdoutSink {
    fn write_bytes(&mut self, bytes: &[u8]) {
        use std::io::Write;
        let _ = std::io::stdout().write_all(bytes);
    }
}

/// On hosted builds, route early console output to stdout so `cargo test`
/// output is visible without any platform wiring.
#[cfg(not(target_os = "none"))]
pub fn init_host_sink() {
    static mut STDOUT_SINK: StdoutSink = StdoutSink;
    // SAFETY: `StdoutSink` is a zero-sized marker with no aliasing state;
    // every write goes through the process-wide stdout handle regardless of
    // how many references observe this static.
    let sink: &'static mut StdoutSink = unsafe { &mut *core::ptr::addr_of_mut!(STDOUT_SINK) };
    install_sink(sink);
}

struct SerialWriter;

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(sink) = SINK.lock().as_deref_mut() {
            sink.write_bytes(s.as_bytes());
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _serial_print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _ = SerialWriter.write_fmt(args);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_serial_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial_print!("{}\n", format_args!($($arg)*))
    };
}
