//! Common test utilities.

use std::io::{self, ErrorKind, Write};

use chart_manifest::{RenderError, RenderRequest, Renderer};

/// A writer that simulates a broken pipe (SIGPIPE scenario).
///
/// Every write fails with `ErrorKind::BrokenPipe`, the way stdout does once
/// the reading end of a pipe has exited.
pub struct BrokenPipeWriter;

impl Write for BrokenPipeWriter {
	fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}

	fn flush(&mut self) -> io::Result<()> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}
}

/// Renderer returning a fixed stream, for commands that must cope with odd
/// manifests.
pub struct StaticRenderer(pub &'static str);

impl Renderer for StaticRenderer {
	fn render(&self, _request: &RenderRequest) -> Result<String, RenderError> {
		Ok(self.0.to_string())
	}
}
