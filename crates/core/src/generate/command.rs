use anyhow::Context;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::{GenerateRequest, Generator};
use crate::domain::artifact::Artifact;
use crate::time::Clock;

const STDERR_TAIL_BYTES: usize = 2000;

/// Runs an external renderer as `<program> [args..] <kind> <identity> <output-path>`.
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub enum CommandFailure {
    Exit { code: Option<i32>, stderr: String },
    Timeout(Duration),
    MissingOutput(std::path::PathBuf),
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::Exit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "renderer exited with status {code}")?,
                    None => write!(f, "renderer killed by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            CommandFailure::Timeout(after) => write!(f, "renderer timed out after {after:?}"),
            CommandFailure::MissingOutput(path) => {
                write!(f, "renderer succeeded but did not write {}", path.display())
            }
        }
    }
}

impl std::error::Error for CommandFailure {}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            clock,
        }
    }

    /// Splits a command line on whitespace. No shell quoting is interpreted.
    pub fn from_command_line(line: &str, timeout: Duration, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().context("GENERATOR_COMMAND is empty")?;
        Ok(Self::new(program, parts.collect(), timeout, clock))
    }
}

#[async_trait::async_trait]
impl Generator for CommandGenerator {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<Artifact> {
        let started = SystemTime::now();
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(request.key.kind.as_str())
            .arg(&request.key.identity)
            .arg(&request.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn renderer {}", self.program))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.context("failed to wait for renderer")?,
            Err(_) => return Err(CommandFailure::Timeout(self.timeout).into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail_start = (tail_start..stderr.len())
                .find(|i| stderr.is_char_boundary(*i))
                .unwrap_or(stderr.len());
            return Err(CommandFailure::Exit {
                code: output.status.code(),
                stderr: stderr[tail_start..].to_string(),
            }
            .into());
        }

        // The file must exist and have been written by this run.
        let written = std::fs::metadata(&request.path)
            .and_then(|m| m.modified())
            .map(|modified| modified >= started - Duration::from_secs(1))
            .unwrap_or(false);
        if !written {
            return Err(CommandFailure::MissingOutput(request.path.clone()).into());
        }

        tracing::debug!(program = %self.program, kind = %request.key.kind, identity = %request.key.identity, "renderer finished");
        Ok(Artifact {
            identity: request.key.identity.clone(),
            kind: request.key.kind,
            path: request.path.clone(),
            generated_at: self.clock.now(),
        })
    }
}
