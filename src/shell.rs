use crate::command::ManageCommand;
use std::process::Command;

/// How a management command is turned into a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// `/bin/sh -c <command line>`
    Posix,
    /// `cmd.exe /s /c "<command line>"`, passed verbatim
    Windows,
    /// No shell, one argv entry per token
    Direct,
}

impl Shell {
    /// The platform shell for the running host.
    pub fn detect() -> Self {
        if cfg!(windows) {
            Shell::Windows
        } else {
            Shell::Posix
        }
    }

    pub fn command(&self, cmd: &ManageCommand) -> Command {
        match self {
            Shell::Posix => {
                let mut c = Command::new("/bin/sh");
                c.arg("-c").arg(cmd.command_line());
                c
            }
            Shell::Windows => {
                let mut c = Command::new("cmd.exe");
                c.args(["/s", "/c"]);
                push_verbatim(&mut c, &format!("\"{}\"", cmd.command_line()));
                c
            }
            Shell::Direct => {
                let argv = cmd.argv();
                let mut c = Command::new(&argv[0]);
                c.args(&argv[1..]);
                c
            }
        }
    }
}

impl std::fmt::Display for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shell::Posix => write!(f, "sh"),
            Shell::Windows => write!(f, "cmd"),
            Shell::Direct => write!(f, "direct"),
        }
    }
}

#[cfg(windows)]
fn push_verbatim(c: &mut Command, arg: &str) {
    use std::os::windows::process::CommandExt;
    c.raw_arg(arg);
}

#[cfg(not(windows))]
fn push_verbatim(c: &mut Command, arg: &str) {
    c.arg(arg);
}
