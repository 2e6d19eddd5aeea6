//! Helpers for running external tools (ffmpeg) from async code.
//!
//! Child processes never open a console window on Windows, and their stderr is
//! collected line by line so a failed run can be reported with the tool's own
//! last words instead of a bare exit code.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, trace};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Number of stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 16;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with code {code}: {message}")]
    Failed {
        program: String,
        code: i32,
        message: String,
    },
}

/// Result of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub duration_secs: f64,
    /// Last lines the tool wrote to stderr, oldest first.
    pub stderr_tail: Vec<String>,
}

impl ToolOutput {
    /// Most relevant diagnostic line: the last one mentioning an error, else the last line.
    pub fn last_error(&self) -> Option<&str> {
        self.stderr_tail
            .iter()
            .rfind(|l| l.to_ascii_lowercase().contains("error"))
            .or_else(|| self.stderr_tail.last())
            .map(String::as_str)
    }

    /// Convert a non-zero exit into a [`ToolError::Failed`].
    pub fn into_result(self, program: &str) -> Result<Self, ToolError> {
        if self.status.success() {
            return Ok(self);
        }
        Err(ToolError::Failed {
            program: program.to_string(),
            code: self.status.code().unwrap_or(-1),
            message: self
                .last_error()
                .unwrap_or("no diagnostic output")
                .to_string(),
        })
    }
}

/// Run a command to completion, keeping a bounded tail of its stderr.
///
/// Stdout is discarded; stdin is closed so tools never block on a prompt.
pub async fn run_tool(command: &mut tokio::process::Command) -> Result<ToolOutput, ToolError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    let start = Instant::now();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!(program = %program, args = ?command.as_std().get_args().collect::<Vec<_>>(), "Spawning tool");

    let mut child = command.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    let reader = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        })
    });

    let status = child.wait().await.map_err(|source| ToolError::Wait {
        program: program.clone(),
        source,
    })?;

    let stderr_tail = match reader {
        Some(handle) => handle.await.map(Vec::from).unwrap_or_default(),
        None => Vec::new(),
    };

    Ok(ToolOutput {
        status,
        duration_secs: start.elapsed().as_secs_f64(),
        stderr_tail,
    })
}
