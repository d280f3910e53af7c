//! Utilities for command handlers.

use std::io::{self, ErrorKind, Write};

/// Stdout for listings that are often cut short by `head`.
///
/// Once the reader hangs up, the rest of the listing is discarded and the
/// command still exits zero.
pub struct BrokenPipeGuard<W> {
	inner: W,
	reader_gone: bool,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self {
			inner,
			reader_gone: false,
		}
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if self.reader_gone {
			return Ok(buf.len());
		}
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => {
				self.reader_gone = true;
				Ok(buf.len())
			}
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		if self.reader_gone {
			return Ok(());
		}
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => {
				self.reader_gone = true;
				Ok(())
			}
			other => other,
		}
	}
}

/// `-` for cluster scoped resources, like kubectl prints.
pub fn namespace_column(namespace: &str) -> &str {
	if namespace.is_empty() {
		"-"
	} else {
		namespace
	}
}
