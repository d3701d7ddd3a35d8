//! Argv-vs-shell spawn strategy.
//!
//! Commands run as an explicit argument vector whenever that can express them.
//! The system shell is only used when the command line needs it: unquoted
//! shell syntax, text that does not split into shell words, or a program that
//! does not resolve on `PATH` (shell builtins and functions).

use tokio::process::Command;

use crate::error::RunnerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnPlan {
    Argv { program: String, args: Vec<String> },
    Shell { command: String },
}

impl SpawnPlan {
    pub fn for_command(command: &str) -> Result<Self, RunnerError> {
        Self::for_command_with(command, |program| which::which(program).is_ok())
    }

    /// Same as [`SpawnPlan::for_command`] with a caller-supplied resolver.
    pub fn for_command_with<F>(command: &str, resolves: F) -> Result<Self, RunnerError>
    where
        F: Fn(&str) -> bool,
    {
        if command.trim().is_empty() {
            return Err(RunnerError::EmptyCommand);
        }

        let shell = || SpawnPlan::Shell {
            command: command.to_string(),
        };

        if has_shell_syntax(command) {
            return Ok(shell());
        }

        let Some(mut argv) = shlex::split(command) else {
            return Ok(shell());
        };
        if argv.is_empty() {
            return Ok(shell());
        }

        let program = argv.remove(0);
        if !resolves(&program) {
            return Ok(shell());
        }

        Ok(SpawnPlan::Argv {
            program,
            args: argv,
        })
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            SpawnPlan::Argv { .. } => "argv",
            SpawnPlan::Shell { .. } => "shell",
        }
    }

    /// Name reported when the program cannot be started.
    pub fn program(&self) -> &str {
        match self {
            SpawnPlan::Argv { program, .. } => program,
            SpawnPlan::Shell { .. } => SHELL,
        }
    }

    pub fn to_command(&self) -> Command {
        match self {
            SpawnPlan::Argv { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            SpawnPlan::Shell { command } => {
                let mut cmd = Command::new(SHELL);
                cmd.arg(SHELL_FLAG).arg(command);
                cmd
            }
        }
    }
}

#[cfg(unix)]
const SHELL: &str = "sh";
#[cfg(unix)]
const SHELL_FLAG: &str = "-c";

#[cfg(windows)]
const SHELL: &str = "cmd";
#[cfg(windows)]
const SHELL_FLAG: &str = "/C";

/// True if `command` contains shell operators outside of quotes.
pub fn has_shell_syntax(command: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in command.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '\\' => escaped = true,
                // Expansion still happens inside double quotes.
                '$' | '`' => return true,
                _ => {}
            },
            None => match c {
                '\\' => escaped = true,
                '\'' | '"' => quote = Some(c),
                '|' | '&' | ';' | '<' | '>' | '(' | ')' | '$' | '`' | '\n' => return true,
                _ => {}
            },
        }
    }

    false
}
