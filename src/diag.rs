//! Allocation-free diagnostics.
//!
//! Everything here goes through a single `write(2)` on stderr so it can run
//! from inside the allocator, including its out-of-memory path.

/// Exit status of every fatal path.
pub const FATAL_EXIT_CODE: i32 = 2;

const FALLBACK: &[u8] = b"logging failed\n";

/// Writes `message` to stderr. A failed or short write is fatal.
pub fn log_message(message: &str) {
  let bytes = message.as_bytes();
  let written = unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };

  if written < 0 || written as usize != bytes.len() {
    unsafe { libc::write(libc::STDERR_FILENO, FALLBACK.as_ptr().cast(), FALLBACK.len()) };
    terminate();
  }
}

/// Logs `message` and exits with [`FATAL_EXIT_CODE`].
pub fn fatal(message: &str) -> ! {
  log_message(message);
  terminate()
}

fn terminate() -> ! {
  std::process::exit(FATAL_EXIT_CODE)
}
