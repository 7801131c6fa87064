//! The collaborator that changes the working directory between checkpoints.
//!
//! The engine doesn't care how files get written; it only needs something
//! that mutates the tree and reports whether it succeeded.
//! [`ShellMutation`] is the stock implementation: one command run in the
//! user's login shell.

use serde::Serialize;
use std::future::Future;
use std::io;
use std::path::Path;

use crate::error::{CheckpointError, CheckpointResult};
use crate::shell::{build_login_shell_command, CommandExit};

/// What a mutation reported when it finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<CommandExit>,
    pub output: String,
}

impl MutationOutcome {
    /// A mutation that never produced an exit status (e.g. failed to spawn).
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            exit: None,
            output: output.into(),
        }
    }
}

/// Something that mutates a working directory.
pub trait WorkspaceMutation {
    fn apply(
        &self,
        working_dir: &Path,
    ) -> impl Future<Output = CheckpointResult<MutationOutcome>> + Send;
}

/// Runs one command in the login shell, inside the working directory.
#[derive(Debug, Clone)]
pub struct ShellMutation {
    program: String,
    args: Vec<String>,
    shell_prefix: Option<String>,
}

impl ShellMutation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            shell_prefix: None,
        }
    }

    /// Build from a full argv (`["cargo", "fmt"]`). Empty argv is rejected.
    pub fn from_argv(argv: &[String]) -> CheckpointResult<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            CheckpointError::Io(io::Error::new(io::ErrorKind::InvalidInput, "empty command"))
        })?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    /// Use a specific shell invocation instead of `$SHELL -l -c`.
    pub fn with_shell_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shell_prefix = Some(prefix.into());
        self
    }
}

impl WorkspaceMutation for ShellMutation {
    async fn apply(&self, working_dir: &Path) -> CheckpointResult<MutationOutcome> {
        let cmd = build_login_shell_command(
            &self.program,
            &self.args,
            Some(working_dir),
            self.shell_prefix.as_deref(),
        )
        .map_err(|msg| CheckpointError::Io(io::Error::new(io::ErrorKind::InvalidInput, msg)))?;

        log::info!("Running {} in {}", self.program, working_dir.display());
        let output = tokio::process::Command::from(cmd).output().await?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let exit = CommandExit::from(output.status);
        if !output.status.success() {
            log::warn!("{} exited with {:?}", self.program, exit.code);
        }

        Ok(MutationOutcome {
            success: output.status.success(),
            exit: Some(exit),
            output: text,
        })
    }
}
