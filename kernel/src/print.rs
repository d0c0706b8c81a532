//! `print!`/`println!` macros
//!
//! Routed through [`crate::serial`] rather than a VGA buffer, since the core
//! has no architecture layer of its own (spec.md §1 treats the real console
//! driver as external). Kept distinct from `serial_print!` so call sites read
//! the same as ordinary Rust code.

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::serial::_serial_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
