//! External collaborators: format converter, image codec, image describer.
//!
//! Each collaborator is a narrow trait so the pipeline never depends on how
//! the work is done. The configured implementations spawn a subprocess per
//! call ([`CommandBridge`]): input bytes on stdin, output on stdout.
//! Failures come back as [`NotefoldError::Conversion`] and are recorded by
//! the caller, never propagated past the attachment boundary.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info};

use notefold_shared::{CollaboratorsConfig, NotefoldError, Result};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Office/PDF → markdown, text-in/text-out.
pub trait FormatConverter: Send + Sync {
    fn convert(&self, file_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Image transcoding/optimizing, bytes-in/bytes-out.
pub trait ImageCodec: Send + Sync {
    /// Extension an image with `source_ext` should be stored as, or `None`
    /// to store the original bytes unchanged.
    fn target_extension(&self, source_ext: &str) -> Option<&'static str>;

    fn transcode(&self, bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>>;
}

/// Optional image description generator, bytes-in/text-out.
pub trait ImageDescriber: Send + Sync {
    fn describe(&self, file_name: &str, bytes: &[u8]) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Subprocess bridge
// ---------------------------------------------------------------------------

/// Runs a configured argv once per call, piping bytes through it.
///
/// `{name}`, `{from}` and `{to}` placeholders in the arguments are replaced
/// per call.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    argv: Vec<String>,
}

impl CommandBridge {
    /// `None` when `argv` is empty (collaborator disabled).
    pub fn new(argv: &[String]) -> Option<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return None;
        }
        Some(Self {
            argv: argv.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Spawn the command, write `input` to its stdin and collect stdout.
    pub fn run(&self, input: &[u8], vars: &[(&str, &str)]) -> Result<Vec<u8>> {
        let args: Vec<String> = self.argv[1..]
            .iter()
            .map(|arg| substitute(arg, vars))
            .collect();

        debug!(program = self.program(), ?args, bytes = input.len(), "running collaborator");

        let mut child = Command::new(self.program())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                NotefoldError::Conversion(format!(
                    "failed to spawn `{}`: {e}",
                    self.program()
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            NotefoldError::Conversion("failed to capture collaborator stdin".into())
        })?;

        // Fed from its own thread: the child may fill stdout before draining stdin.
        let payload = input.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&payload));

        let output = child.wait_with_output().map_err(|e| {
            NotefoldError::Conversion(format!("failed to wait for `{}`: {e}", self.program()))
        })?;

        match writer.join() {
            Ok(Ok(())) => {}
            // Commands that ignore their input close the pipe early.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(NotefoldError::Conversion(format!(
                    "failed to write to `{}`: {e}",
                    self.program()
                )));
            }
            Err(_) => {
                return Err(NotefoldError::Conversion(
                    "collaborator stdin writer panicked".into(),
                ));
            }
        }

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(200)
                .collect();
            return Err(NotefoldError::Conversion(format!(
                "`{}` exited with {}: {stderr}",
                self.program(),
                output.status,
            )));
        }

        Ok(output.stdout)
    }
}

fn substitute(arg: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(arg.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

fn utf8_output(program: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| NotefoldError::Conversion(format!("`{program}` produced invalid UTF-8: {e}")))
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// [`FormatConverter`] backed by a subprocess.
#[derive(Debug, Clone)]
pub struct CommandConverter(CommandBridge);

impl FormatConverter for CommandConverter {
    fn convert(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let out = self.0.run(bytes, &[("name", file_name)])?;
        utf8_output(self.0.program(), out)
    }
}

/// [`ImageCodec`] backed by a subprocess.
#[derive(Debug, Clone)]
pub struct CommandCodec {
    bridge: CommandBridge,
    convert_heic: bool,
}

impl ImageCodec for CommandCodec {
    fn target_extension(&self, source_ext: &str) -> Option<&'static str> {
        match source_ext.to_ascii_lowercase().as_str() {
            "heic" | "heif" if self.convert_heic => Some("png"),
            _ => None,
        }
    }

    fn transcode(&self, bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>> {
        let out = self.bridge.run(bytes, &[("from", from), ("to", to)])?;
        if out.is_empty() {
            return Err(NotefoldError::Conversion(format!(
                "`{}` produced no output for {from} → {to}",
                self.bridge.program()
            )));
        }
        Ok(out)
    }
}

/// Default codec: never transcodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl ImageCodec for PassthroughCodec {
    fn target_extension(&self, _source_ext: &str) -> Option<&'static str> {
        None
    }

    fn transcode(&self, bytes: &[u8], _from: &str, _to: &str) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// [`ImageDescriber`] backed by a subprocess.
#[derive(Debug, Clone)]
pub struct CommandDescriber(CommandBridge);

impl ImageDescriber for CommandDescriber {
    fn describe(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let out = self.0.run(bytes, &[("name", file_name)])?;
        let text = utf8_output(self.0.program(), out)?;
        Ok(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Collaborator set
// ---------------------------------------------------------------------------

/// The collaborators handed to the consolidator.
#[derive(Clone)]
pub struct Collaborators {
    pub converter: Option<Arc<dyn FormatConverter>>,
    pub codec: Arc<dyn ImageCodec>,
    pub describer: Option<Arc<dyn ImageDescriber>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            converter: None,
            codec: Arc::new(PassthroughCodec),
            describer: None,
        }
    }
}

impl Collaborators {
    /// Build from the `[collaborators]` config section.
    pub fn from_config(config: &CollaboratorsConfig) -> Self {
        let converter = CommandBridge::new(&config.converter_command)
            .map(|b| Arc::new(CommandConverter(b)) as Arc<dyn FormatConverter>);

        let codec: Arc<dyn ImageCodec> = match CommandBridge::new(&config.image_codec_command) {
            Some(bridge) => Arc::new(CommandCodec {
                bridge,
                convert_heic: config.convert_heic,
            }),
            None => Arc::new(PassthroughCodec),
        };

        let describer = CommandBridge::new(&config.describer_command)
            .map(|b| Arc::new(CommandDescriber(b)) as Arc<dyn ImageDescriber>);

        info!(
            converter = converter.is_some(),
            describer = describer.is_some(),
            codec = !config.image_codec_command.is_empty(),
            "collaborators configured"
        );

        Self {
            converter,
            codec,
            describer,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("converter", &self.converter.is_some())
            .field("describer", &self.describer.is_some())
            .finish()
    }
}
