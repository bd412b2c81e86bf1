use std::{
    process::{ExitStatus, Output, Stdio},
    time::Duration,
};

use anyhow::Context;
use deskpilot_core::{CommandLine, ExecuteRequest, ExecuteResponse};
use tokio::process::Command;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Runs client supplied commands on this machine with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the request to completion. Launch failures and timeouts become
    /// [`ExecuteResponse::Error`]; a process that ran reports success with
    /// whatever exit code it returned.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecuteResponse {
        match self.run(&request).await {
            Ok(output) => ExecuteResponse::Success {
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                error: String::from_utf8_lossy(&output.stderr).into_owned(),
                returncode: return_code(output.status),
            },
            Err(error) => {
                tracing::warn!("command failed: {error:#}");
                ExecuteResponse::Error {
                    message: format!("{error:#}"),
                }
            }
        }
    }

    async fn run(&self, request: &ExecuteRequest) -> anyhow::Result<Output> {
        let argv = resolve_argv(request)?;
        tracing::info!(shell = request.shell, "running {argv:?}");

        let mut command = build_command(&argv, request.shell)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NO_WINDOW);

        let child = command
            .spawn()
            .with_context(|| format!("failed to launch {:?}", argv[0]))?;

        // dropping the pending wait kills the child
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.context("failed to collect command output"),
            Err(_) => anyhow::bail!(
                "command {argv:?} timed out after {} seconds",
                self.timeout.as_secs_f64()
            ),
        }
    }
}

/// Turns the request into the argument vector to launch, splitting plain
/// strings with shell-word rules and expanding `~/` arguments.
fn resolve_argv(request: &ExecuteRequest) -> anyhow::Result<Vec<String>> {
    let argv = match request.command_line() {
        CommandLine::Shell(script) if request.shell => return Ok(vec![script]),
        CommandLine::Shell(line) => shlex::split(&line)
            .with_context(|| format!("invalid quoting in command: {line}"))?,
        CommandLine::Argv(argv) => argv,
    };

    if argv.is_empty() {
        anyhow::bail!("empty command");
    }

    Ok(argv.into_iter().map(expand_home).collect())
}

fn expand_home(arg: String) -> String {
    if arg.starts_with("~/") {
        shellexpand::tilde(&arg).into_owned()
    } else {
        arg
    }
}

fn build_command(argv: &[String], shell: bool) -> anyhow::Result<Command> {
    let (program, args) = argv.split_first().context("empty command")?;

    if !shell {
        let mut command = Command::new(program);
        command.args(args);
        return Ok(command);
    }

    #[cfg(target_os = "windows")]
    let command = {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(program).args(args);
        command
    };

    // the script's extra arguments become $0, $1, ...
    #[cfg(not(target_os = "windows"))]
    let command = {
        let mut command = Command::new("sh");
        command.arg("-c").arg(program).args(args);
        command
    };

    Ok(command)
}

#[cfg(unix)]
fn return_code(status: ExitStatus) -> i64 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code.into(),
        (None, Some(signal)) => -i64::from(signal),
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn return_code(status: ExitStatus) -> i64 {
    // Windows reports NTSTATUS crash codes such as 0xC0000005 as negative i32
    status.code().map_or(-1, |code| i64::from(code as u32))
}
