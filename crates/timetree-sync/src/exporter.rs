//! Runs the external `timetree-exporter` tool for one mapping and publishes
//! the `.ics` file it produces.
//!
//! The exporter writes to a staging path next to the published file; only
//! after a clean exit is the staging file renamed over `<unit>.ics`, so the
//! HTTP server never serves a half-written calendar.

use crate::config::{Settings, TIMETREE_EMAIL, TIMETREE_PASSWORD};
use async_trait::async_trait;
use shared_types::Mapping;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

/// A fully resolved command line plus extra environment for the child.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

/// Renders the command line only; `envs` may carry credentials.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .finish()
    }
}

/// Captured result of a finished child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes an [`Invocation`] to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// Spawns a real child process and buffers its output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exporter exited with {}: {}", describe_exit(.code), .stderr.trim())]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("exporter exited cleanly but wrote nothing to {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("failed to publish {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Outcome of a successful [`Exporter::sync_one`]
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub unit: String,
    pub path: PathBuf,
    pub output: CommandOutput,
}

#[derive(Clone)]
pub struct Exporter {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
}

impl Exporter {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_runner(settings, Arc::new(ProcessRunner))
    }

    pub fn with_runner(settings: Arc<Settings>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// `timetree-exporter [-e EMAIL] -c CALENDAR_CODE -o OUTPUT`
    ///
    /// The password travels through the child's environment only.
    pub fn invocation(&self, mapping: &Mapping, output: &Path) -> Invocation {
        let mut args = Vec::with_capacity(6);
        let mut envs = Vec::new();

        if let Some(email) = &self.settings.email {
            args.push("-e".to_string());
            args.push(email.clone());
            envs.push((TIMETREE_EMAIL.to_string(), email.clone()));
        }
        if let Some(password) = &self.settings.password {
            envs.push((TIMETREE_PASSWORD.to_string(), password.clone()));
        }

        args.push("-c".to_string());
        args.push(mapping.source_id.clone());
        args.push("-o".to_string());
        args.push(output.to_string_lossy().into_owned());

        Invocation {
            program: self.settings.exporter_bin.clone(),
            args,
            envs,
        }
    }

    /// Export one mapping and publish the result as `<unit>.ics`.
    ///
    /// On any failure the previously published file is left as it was.
    pub async fn sync_one(&self, mapping: &Mapping) -> Result<SyncReport, ExportError> {
        let artifact = self.settings.artifact_path(&mapping.name);
        let staging = self.settings.staging_path(&mapping.name);

        tracing::info!(
            "=== Syncing {} (TimeTree: {}, Google: {}) ===",
            mapping.name,
            mapping.source_id,
            mapping.destination_id
        );

        discard(&staging).await;

        let invocation = self.invocation(mapping, &staging);
        tracing::debug!("Running: {}", invocation);

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|source| ExportError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        if !output.stdout.trim().is_empty() {
            tracing::debug!("[{}] stdout:\n{}", mapping.name, output.stdout.trim_end());
        }

        if !output.success() {
            discard(&staging).await;
            return Err(ExportError::ExitStatus {
                code: output.exit_code,
                stderr: output.stderr,
            });
        }

        if !output.stderr.trim().is_empty() {
            tracing::debug!("[{}] stderr:\n{}", mapping.name, output.stderr.trim_end());
        }

        match tokio::fs::metadata(&staging).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(ExportError::MissingOutput(staging)),
        }

        if let Err(source) = tokio::fs::rename(&staging, &artifact).await {
            discard(&staging).await;
            return Err(ExportError::Publish {
                path: artifact,
                source,
            });
        }

        tracing::info!("[{}] ICS written to {}", mapping.name, artifact.display());

        Ok(SyncReport {
            unit: mapping.name.clone(),
            path: artifact,
            output,
        })
    }
}

/// Best-effort removal of a leftover staging file
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed stale {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
