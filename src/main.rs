mod cmd;
mod command;
mod logging;
mod options;
mod runner;
mod shell;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "django-manage",
    version,
    about = "Run Django manage.py commands as build tasks"
)]
#[command(
    long_about = "django-manage runs Django management commands from a build pipeline.\nIt builds the manage.py command line from a task file or flags, runs it\nin the platform shell, relays its output through structured logging,\nand fails the build when the command exits non-zero."
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "DJANGO_MANAGE_JSON",
        help = "Enable JSON log output"
    )]
    json: bool,

    #[arg(
        long,
        global = true,
        default_value = "info",
        env = "DJANGO_MANAGE_LOG_LEVEL",
        help = "Minimum log level (debug, info, warn, error)"
    )]
    log_level: String,

    #[arg(
        long,
        global = true,
        env = "DJANGO_MANAGE_DRY_RUN",
        help = "Log the command without running it"
    )]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a target (and optional task) from a task file
    Run {
        #[arg(
            long,
            default_value = "django-manage.yaml",
            env = "DJANGO_MANAGE_CONFIG",
            help = "Task file (YAML, or JSON when ending in .json)"
        )]
        config: String,
        #[arg(
            long,
            default_value = "",
            env = "DJANGO_MANAGE_WORKDIR",
            help = "Working directory for the command"
        )]
        workdir: String,
        #[arg(long, help = "List targets and tasks, then exit")]
        list: bool,
        #[arg(help = "Target name, or target:task")]
        target: Option<String>,
        #[arg(help = "Task within the target")]
        task: Option<String>,
    },

    /// Run a single management command described by flags
    Exec {
        #[arg(
            long,
            default_value = "",
            env = "DJANGO_MANAGE_COMMAND",
            help = "Management command (e.g. migrate, collectstatic)"
        )]
        command: String,
        #[arg(
            long,
            default_value = "",
            env = "DJANGO_MANAGE_PATH",
            help = "Directory containing manage.py"
        )]
        manage_path: String,
        #[arg(
            long,
            default_value = "",
            env = "DJANGO_MANAGE_APP",
            help = "Application package holding the settings modules"
        )]
        app: String,
        #[arg(
            long,
            default_value = "",
            env = "DJANGO_MANAGE_SETTINGS",
            help = "Settings module suffix (<app>.settings.<settings>)"
        )]
        settings: String,
        #[arg(
            long,
            default_value = "python",
            env = "DJANGO_MANAGE_PYTHON",
            help = "Python interpreter"
        )]
        python: String,
        #[arg(
            long,
            env = "DJANGO_MANAGE_NO_SHELL",
            help = "Run the interpreter directly instead of through the shell"
        )]
        no_shell: bool,
        #[arg(
            long,
            default_value = "",
            env = "DJANGO_MANAGE_WORKDIR",
            help = "Working directory for the command"
        )]
        workdir: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let log = logging::Logger::default_logger();
    if cli.json {
        log.set_json(true);
    }
    match cli.log_level.parse::<logging::Level>() {
        Ok(level) => log.set_level(level),
        Err(e) => {
            log.error(&e, &[]);
            std::process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Run {
            config,
            workdir,
            list,
            target,
            task,
        } => cmd::run::run(
            &log,
            &cmd::run::Config {
                config,
                target,
                task,
                workdir,
                list,
                dry_run: cli.dry_run,
            },
        ),
        Commands::Exec {
            command,
            manage_path,
            app,
            settings,
            python,
            no_shell,
            workdir,
            args,
        } => cmd::exec::run(
            &log,
            &cmd::exec::Config {
                command,
                manage_path,
                app,
                settings,
                python,
                no_shell,
                workdir,
                args,
                dry_run: cli.dry_run,
            },
        ),
    };

    if let Err(e) = result {
        log.error(&e, &[]);
        std::process::exit(1);
    }
}
