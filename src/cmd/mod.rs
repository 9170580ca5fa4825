pub mod exec;
pub mod run;

use crate::logging::Logger;
use crate::options::Options;
use crate::runner::{self, ExitGuard, OutputSink, TaskContext};
use crate::shell::Shell;

/// Stops the running child when the host receives SIGINT, SIGTERM or SIGHUP
/// (Ctrl-C/Ctrl-Break on Windows). The interrupted run then reports a
/// failure and the process exits through the normal error path.
fn install_termination_handler(log: &Logger, guard: ExitGuard) {
    if let Err(e) = ctrlc::set_handler(move || {
        guard.terminate();
    }) {
        log.warn(
            "could not install termination handler",
            &[("error", &e.to_string())],
        );
    }
}

/// Runs one management command built from `options` overlaid with `data`.
/// A failed command is an error so the caller can fail the build.
pub fn execute(
    log: &Logger,
    label: &str,
    options: &Options,
    data: &Options,
    workdir: &str,
    dry_run: bool,
) -> Result<(), String> {
    let (cmd, shell) = runner::prepare(options, data).map_err(|e| e.to_string())?;
    if shell != Shell::Direct {
        if let Some(arg) = cmd.args.iter().find(|a| a.contains(char::is_whitespace)) {
            log.warn(
                "argument contains whitespace and will be split by the shell",
                &[("arg", arg.as_str()), ("hint", "set shell: false to pass it intact")],
            );
        }
    }
    if dry_run {
        log.acknowledge(&cmd.command_line());
        log.info("dry run, command not executed", &[("task", label)]);
        return Ok(());
    }
    let mut ctx = TaskContext::new();
    if !workdir.is_empty() {
        ctx = ctx.with_workdir(workdir);
    }
    install_termination_handler(log, ctx.guard());
    log.debug("starting management command", &[("task", label), ("launcher", &shell.to_string())]);
    let done = ctx.run(shell, &cmd, log).map_err(|e| e.to_string())?;
    if !done.success {
        return Err(format!("task {} failed with {}", label, done.exit));
    }
    log.info("management command completed successfully", &[("task", label)]);
    Ok(())
}
