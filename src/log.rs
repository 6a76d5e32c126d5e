//! Lifecycle logging and unbuffered line output.
//!
//! Lines are formatted into a fixed buffer on the caller's stack and handed to
//! a single `write(2)`, so logging neither allocates nor locks and can
//! be used from the quantum signal handler.

use core::fmt::{self, Write};

const LINE_CAPACITY: usize = 256;
const PREFIX: &str = "** ";
const SUFFIX: &str = " **\n";

/// Fixed-capacity line that silently truncates overlong messages.
pub struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub const fn new() -> Self {
        LineBuffer {
            buf: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Append as much of `s` as fits below `limit`, never splitting a char.
    fn push_str(&mut self, s: &str, limit: usize) {
        let room = limit.saturating_sub(self.len);
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
    }

    /// Append `terminator`, overwriting the tail if the line is full.
    fn terminate(&mut self, terminator: &str) {
        let limit = LINE_CAPACITY - terminator.len();
        if self.len > limit {
            self.len = limit;
            // Drop a char whose continuation bytes were cut off.
            while self.len > 0 && self.buf[self.len] & 0xC0 == 0x80 {
                self.len -= 1;
            }
        }
        self.push_str(terminator, LINE_CAPACITY);
    }
}

impl Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s, LINE_CAPACITY);
        Ok(())
    }
}

/// Format one log line and write it to stderr.
pub fn emit(args: fmt::Arguments<'_>) {
    let mut line = LineBuffer::new();
    let _ = line.write_str(PREFIX);
    let _ = line.write_fmt(args);
    line.terminate(SUFFIX);
    write_all(libc::STDERR_FILENO, line.as_bytes());
}

/// Write one line to stdout without going through `std`'s buffered handle,
/// which is unsafe to share between preemptible threads.
pub fn print_line(args: fmt::Arguments<'_>) {
    let mut line = LineBuffer::new();
    let _ = line.write_fmt(args);
    line.terminate("\n");
    write_all(libc::STDOUT_FILENO, line.as_bytes());
}

fn write_all(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let written = unsafe {
            libc::write(
                fd,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
            )
        };
        if written <= 0 {
            // EINTR from a quantum tick mid-write is retried; anything else drops the line.
            if written < 0 && last_errno() == libc::EINTR {
                continue;
            }
            return;
        }
        bytes = &bytes[written as usize..];
    }
}

fn last_errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Log a lifecycle event when `$enabled` is true.
#[macro_export]
macro_rules! ult_log {
    ($enabled:expr, $($arg:tt)*) => {
        if $enabled {
            $crate::log::emit(format_args!($($arg)*));
        }
    };
}

/// `println!` for user-level threads; see [`log::print_line`](crate::log::print_line).
#[macro_export]
macro_rules! ult_println {
    ($($arg:tt)*) => {
        $crate::log::print_line(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_formatting() {
        let mut line = LineBuffer::new();
        let _ = line.write_str(PREFIX);
        let _ = write!(line, "thread {} created", 3);
        line.terminate(SUFFIX);
        assert_eq!(line.as_bytes(), b"** thread 3 created **\n");
    }

    #[test]
    fn test_overlong_line_keeps_terminator() {
        let mut line = LineBuffer::new();
        for _ in 0..100 {
            let _ = line.write_str("abcdefgh");
        }
        line.terminate(SUFFIX);
        let bytes = line.as_bytes();
        assert_eq!(bytes.len(), LINE_CAPACITY);
        assert!(bytes.ends_with(SUFFIX.as_bytes()));
    }

    #[test]
    fn test_truncation_keeps_utf8_intact() {
        // Three-byte chars never line up with the capacity.
        let mut line = LineBuffer::new();
        for _ in 0..100 {
            let _ = line.write_str("€");
        }
        assert!(core::str::from_utf8(line.as_bytes()).is_ok());
        assert_eq!(line.as_bytes().len(), LINE_CAPACITY - LINE_CAPACITY % 3);

        for offset in 0..3 {
            let mut line = LineBuffer::new();
            for _ in 0..offset {
                let _ = line.write_str("a");
            }
            for _ in 0..100 {
                let _ = line.write_str("€");
            }
            line.terminate(SUFFIX);
            let text = core::str::from_utf8(line.as_bytes()).unwrap();
            assert!(text.ends_with(SUFFIX));
            let body = text.trim_end_matches(SUFFIX).trim_start_matches('a');
            assert!(body.chars().all(|c| c == '€'));
        }
    }
}
