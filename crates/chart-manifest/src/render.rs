//! Rendering a chart into raw manifest text.
//!
//! [`Renderer`] is the seam between the assertion framework and whatever turns a
//! chart into YAML. [`HelmRenderer`] shells out to `helm template`; tests can
//! substitute an in-process chart.

use std::{
	io::{BufReader, Read},
	path::{Path, PathBuf},
	process::{Command, ExitStatus, Stdio},
	string::FromUtf8Error,
	sync::mpsc::{self, Receiver, RecvTimeoutError},
	thread,
	time::{Duration, Instant},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::manifest::{parse, ParseError, RenderedManifest};

pub const ENV_HELM: &str = "CHART_CHECK_HELM";
pub const ENV_CHART: &str = "CHART_CHECK_CHART";
pub const ENV_TIMEOUT_SECS: &str = "CHART_CHECK_TIMEOUT_SECS";

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to keep reading after the renderer is gone.
const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RenderError {
	#[error("failed to execute {program}")]
	Spawn {
		program: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to capture renderer {0}")]
	Pipe(&'static str),

	#[error("failed to wait for renderer")]
	Wait(#[source] std::io::Error),

	#[error("renderer did not finish within {timeout:?}: {stderr}")]
	Timeout {
		timeout: Duration,
		stdout: String,
		stderr: String,
	},

	#[error("renderer exited with {status}: {stderr}")]
	Failed {
		status: String,
		stdout: String,
		stderr: String,
	},

	#[error("renderer wrote diagnostics: {stderr}")]
	Diagnostics { stdout: String, stderr: String },

	#[error("invalid UTF-8 in renderer output")]
	InvalidUtf8(#[source] FromUtf8Error),

	#[error("invalid override `{0}`, expected key=value")]
	InvalidOverride(String),

	#[error("invalid value `{value}` for {var}")]
	InvalidEnv { var: &'static str, value: String },

	#[error("template error: {message}")]
	Template { message: String },
}

impl RenderError {
	/// Captured stderr, when the renderer got far enough to produce any.
	pub fn stderr(&self) -> Option<&str> {
		match self {
			Self::Timeout { stderr, .. }
			| Self::Failed { stderr, .. }
			| Self::Diagnostics { stderr, .. } => Some(stderr),
			_ => None,
		}
	}
}

/// Parameters of one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderRequest {
	pub namespace: String,
	/// Passed as the installation id value; the chart generates one when unset.
	pub installation_id: Option<String>,
	/// `--set` overrides, applied in order.
	pub set: Vec<(String, String)>,
	pub values_file: Option<PathBuf>,
}

impl RenderRequest {
	pub fn new(namespace: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn installation_id(mut self, id: impl Into<String>) -> Self {
		self.installation_id = Some(id.into());
		self
	}

	#[must_use]
	pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.set.push((key.into(), value.into()));
		self
	}

	#[must_use]
	pub fn values(mut self, path: impl Into<PathBuf>) -> Self {
		self.values_file = Some(path.into());
		self
	}
}

/// Splits a `key=value` override.
pub fn parse_set(raw: &str) -> Result<(String, String), RenderError> {
	match raw.split_once('=') {
		Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
		_ => Err(RenderError::InvalidOverride(raw.to_string())),
	}
}

pub trait Renderer {
	/// Renders the chart, returning the raw multi-document stream.
	fn render(&self, request: &RenderRequest) -> Result<String, RenderError>;
}

impl<R: Renderer + ?Sized> Renderer for &R {
	fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
		(**self).render(request)
	}
}

/// How to invoke `helm template`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
	pub helm: PathBuf,
	pub chart: PathBuf,
	pub release: String,
	pub timeout_secs: u64,
	/// Values key the installation id is written to.
	pub installation_id_key: String,
	/// Tolerate output on stderr, logging it instead of failing.
	pub allow_stderr: bool,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self {
			helm: PathBuf::from("helm"),
			chart: PathBuf::from("."),
			release: "gloo".to_string(),
			timeout_secs: 60,
			installation_id_key: "global.glooInstallationId".to_string(),
			allow_stderr: false,
		}
	}
}

impl RenderConfig {
	/// Applies `CHART_CHECK_*` overrides from the process environment.
	pub fn from_env(self) -> Result<Self, RenderError> {
		self.with_env(|var| std::env::var(var).ok())
	}

	/// Applies overrides from an arbitrary variable lookup.
	pub fn with_env<F>(mut self, lookup: F) -> Result<Self, RenderError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(helm) = lookup(ENV_HELM).filter(|v| !v.is_empty()) {
			self.helm = PathBuf::from(helm);
		}
		if let Some(chart) = lookup(ENV_CHART).filter(|v| !v.is_empty()) {
			self.chart = PathBuf::from(chart);
		}
		if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.is_empty()) {
			self.timeout_secs = raw
				.trim()
				.parse::<u64>()
				.ok()
				.filter(|secs| *secs > 0)
				.ok_or(RenderError::InvalidEnv {
					var: ENV_TIMEOUT_SECS,
					value: raw,
				})?;
		}
		Ok(self)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

/// Renders by running `helm template` as a child process.
#[derive(Debug, Clone)]
pub struct HelmRenderer {
	config: RenderConfig,
	timeout: Duration,
}

impl HelmRenderer {
	pub fn new(config: RenderConfig) -> Self {
		let timeout = config.timeout();
		Self { config, timeout }
	}

	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn config(&self) -> &RenderConfig {
		&self.config
	}

	/// Command line arguments for a request, without the program name.
	pub fn args(&self, request: &RenderRequest) -> Vec<String> {
		let mut args = vec![
			"template".to_string(),
			self.config.release.clone(),
			path_arg(&self.config.chart),
		];
		if !request.namespace.is_empty() {
			args.push("--namespace".to_string());
			args.push(request.namespace.clone());
		}
		if let Some(id) = &request.installation_id {
			args.push("--set".to_string());
			args.push(format!("{}={}", self.config.installation_id_key, id));
		}
		for (key, value) in &request.set {
			args.push("--set".to_string());
			args.push(format!("{key}={value}"));
		}
		if let Some(values) = &request.values_file {
			args.push("--values".to_string());
			args.push(path_arg(values));
		}
		args
	}
}

fn path_arg(path: &Path) -> String {
	path.to_string_lossy().into_owned()
}

/// Forwards everything read from `pipe` in chunks. The channel closes at end
/// of file, which only happens once every process holding the pipe is gone.
fn drain<R: Read + Send + 'static>(pipe: R) -> Receiver<Vec<u8>> {
	let (tx, rx) = mpsc::channel();
	thread::spawn(move || {
		let mut reader = BufReader::new(pipe);
		let mut chunk = [0; 8192];
		loop {
			match reader.read(&mut chunk) {
				Ok(0) | Err(_) => break,
				Ok(n) => {
					if tx.send(chunk[..n].to_vec()).is_err() {
						break;
					}
				}
			}
		}
	});
	rx
}

/// Output gathered from a drained pipe, and whether the pipe was closed
/// before the deadline.
struct Collected {
	buf: Vec<u8>,
	closed: bool,
}

impl Collected {
	fn lossy(self) -> String {
		String::from_utf8_lossy(&self.buf).into_owned()
	}
}

fn collect(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Collected {
	let mut buf = Vec::new();
	loop {
		match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
			Ok(chunk) => buf.extend_from_slice(&chunk),
			Err(RecvTimeoutError::Disconnected) => return Collected { buf, closed: true },
			Err(RecvTimeoutError::Timeout) => return Collected { buf, closed: false },
		}
	}
}

fn describe(status: ExitStatus) -> String {
	status
		.code()
		.map_or_else(|| status.to_string(), |code| format!("exit code {code}"))
}

impl Renderer for HelmRenderer {
	#[instrument(skip_all, fields(release = %self.config.release, namespace = %request.namespace))]
	fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
		let program = path_arg(&self.config.helm);
		let args = self.args(request);
		debug!(%program, ?args, "running renderer");

		let mut child = Command::new(&self.config.helm)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|source| RenderError::Spawn {
				program: program.clone(),
				source,
			})?;

		let stdout = child.stdout.take().ok_or(RenderError::Pipe("stdout"))?;
		let stderr = child.stderr.take().ok_or(RenderError::Pipe("stderr"))?;
		// Drained concurrently so a chatty renderer cannot block on a full pipe.
		let stdout_rx = drain(stdout);
		let stderr_rx = drain(stderr);

		let started = Instant::now();
		let status = loop {
			if let Some(status) = child.try_wait().map_err(RenderError::Wait)? {
				break status;
			}
			if started.elapsed() >= self.timeout {
				warn!(timeout = ?self.timeout, "renderer timed out, killing it");
				child.kill().ok();
				child.wait().map_err(RenderError::Wait)?;
				// Processes the renderer started may still hold the pipes open.
				let deadline = Instant::now() + KILL_GRACE;
				return Err(RenderError::Timeout {
					timeout: self.timeout,
					stdout: collect(&stdout_rx, deadline).lossy(),
					stderr: collect(&stderr_rx, deadline).lossy(),
				});
			}
			thread::sleep(POLL_INTERVAL);
		};

		let deadline = (started + self.timeout).max(Instant::now() + KILL_GRACE);
		let stdout = collect(&stdout_rx, deadline);
		let stderr = collect(&stderr_rx, deadline);
		if !stdout.closed || !stderr.closed {
			warn!(timeout = ?self.timeout, "renderer exited but its output is still open");
			return Err(RenderError::Timeout {
				timeout: self.timeout,
				stdout: stdout.lossy(),
				stderr: stderr.lossy(),
			});
		}
		let stdout_buf = stdout.buf;
		let stderr = stderr.lossy();

		if !status.success() {
			return Err(RenderError::Failed {
				status: describe(status),
				stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
				stderr,
			});
		}

		let stdout = String::from_utf8(stdout_buf).map_err(RenderError::InvalidUtf8)?;
		if !stderr.trim().is_empty() {
			if !self.config.allow_stderr {
				return Err(RenderError::Diagnostics { stdout, stderr });
			}
			warn!(stderr = %stderr.trim(), "renderer wrote to stderr");
		}
		debug!(bytes = stdout.len(), elapsed = ?started.elapsed(), "render finished");
		Ok(stdout)
	}
}

/// A render followed by a parse failed.
#[derive(Debug, Error)]
pub enum ScenarioError {
	#[error("rendering chart")]
	Render(#[from] RenderError),

	#[error("parsing rendered manifest")]
	Parse(#[from] ParseError),
}

/// Renders and parses in one step.
pub fn render_manifest<R: Renderer + ?Sized>(
	renderer: &R,
	request: &RenderRequest,
) -> Result<RenderedManifest, ScenarioError> {
	let raw = renderer.render(request)?;
	Ok(parse(&raw)?)
}
