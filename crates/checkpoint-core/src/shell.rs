//! Shell command construction for workspace mutations.
//!
//! Mutation commands run in the user's login shell so they see the same
//! PATH and environment as an interactive terminal.
//!
//! # Example
//!
//! ```ignore
//! use checkpoint_core::shell::build_login_shell_command;
//!
//! let cmd = build_login_shell_command(
//!     "cargo",
//!     &["fmt".to_string()],
//!     Some(Path::new("/path/to/project")),
//!     None, // Use default shell
//! )?;
//! ```

use serde::Serialize;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Exit status of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl From<ExitStatus> for CommandExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Build a command that runs `program` with `args` in a login shell.
///
/// On Unix the command becomes `<prefix> '<quoted command>'`, where the
/// prefix defaults to `$SHELL -l -c` (with a fallback for non-POSIX shells).
/// On Windows the program is run directly.
#[cfg(unix)]
pub fn build_login_shell_command(
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
    shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let prefix = get_shell_prefix(shell_prefix);

    let prefix_parts: Vec<&str> = prefix.split_whitespace().collect();
    let Some((shell_program, shell_args)) = prefix_parts.split_first() else {
        return Err("Empty shell prefix".to_string());
    };

    let words = std::iter::once(program).chain(args.iter().map(String::as_str));
    let full_command =
        shlex::try_join(words).map_err(|e| format!("Cannot quote command {program}: {e}"))?;

    let mut cmd = Command::new(shell_program);
    cmd.args(shell_args).arg(&full_command);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    Ok(cmd)
}

/// Get the shell prefix to use for command execution.
///
/// A non-empty custom prefix (e.g. "/bin/zsh -l -c") is used as-is.
/// Otherwise `$SHELL -l -c`, falling back to bash or sh for shells that
/// don't take POSIX flags (fish, nu, ...).
#[cfg(unix)]
fn get_shell_prefix(custom_prefix: Option<&str>) -> String {
    if let Some(prefix) = custom_prefix {
        if !prefix.is_empty() {
            return prefix.to_string();
        }
    }

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());

    let shell_name = Path::new(&shell)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let non_posix = ["fish", "nu", "nushell", "elvish", "xonsh", "ion"];

    let effective_shell = if non_posix.iter().any(|&s| shell_name == s) {
        if Path::new("/bin/bash").exists() {
            "/bin/bash"
        } else {
            "/bin/sh"
        }
    } else {
        &shell
    };

    format!("{} -l -c", effective_shell)
}

/// Windows version: runs command directly (no login shell concept).
#[cfg(windows)]
pub fn build_login_shell_command(
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
    _shell_prefix: Option<&str>,
) -> Result<Command, String> {
    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    Ok(cmd)
}

// ============================================================================
// TESTS
// ============================================================================
