// Console front end: print!/println! fan out to the VGA text buffer
// and the serial port under one lock; input is polled from serial.

use crate::{serial, vga_buffer};
use core::fmt;
use core::str;
use spin::Mutex;

static CONSOLE_LOCK: Mutex<()> = Mutex::new(());

pub fn print(args: fmt::Arguments) {
    let _lock = CONSOLE_LOCK.lock();
    vga_buffer::_print(args);
    serial::_print(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*));
    }
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*));
    }
}

/// One pending input byte, or 0 when there is none. The non-blocking
/// contract the cgetc system call exposes.
pub(crate) fn getc() -> u8 {
    serial::serial().getc().unwrap_or(0)
}

fn getc_blocking() -> u8 {
    loop {
        if let Some(c) = serial::serial().getc() {
            return c;
        }
    }
}

/// Read a line into `buf`, echoing as we go. Returns the line without
/// the terminating newline.
pub(crate) fn readline<'a>(prompt: &str, buf: &'a mut [u8]) -> &'a str {
    crate::print!("{}", prompt);

    let mut len = 0;
    loop {
        let c = getc_blocking();
        match c {
            b'\r' | b'\n' => {
                crate::println!();
                break;
            }
            b'\x08' | b'\x7f' => {
                if len > 0 {
                    len -= 1;
                    // Erase on both sinks: backspace, blank, backspace.
                    crate::print!("\x08 \x08");
                }
            }
            0x20..=0x7e if len < buf.len() => {
                buf[len] = c;
                len += 1;
                crate::print!("{}", c as char);
            }
            _ => {}
        }
    }

    str::from_utf8(&buf[..len]).unwrap_or("")
}
