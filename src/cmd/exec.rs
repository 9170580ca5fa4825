use crate::logging::Logger;
use crate::options::Options;

pub struct Config {
    pub command: String,
    pub manage_path: String,
    pub app: String,
    pub settings: String,
    pub python: String,
    pub no_shell: bool,
    pub workdir: String,
    pub args: Vec<String>,
    pub dry_run: bool,
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl Config {
    pub fn options(&self) -> Options {
        Options {
            command: non_empty(&self.command),
            manage_path: non_empty(&self.manage_path),
            args: Some(self.args.clone()),
            app: non_empty(&self.app),
            settings: non_empty(&self.settings),
            python: non_empty(&self.python),
            shell: Some(!self.no_shell),
        }
    }
}

pub fn run(log: &Logger, cfg: &Config) -> Result<(), String> {
    if cfg.command.is_empty() {
        return Err("--command is required".into());
    }
    super::execute(
        log,
        &cfg.command,
        &cfg.options(),
        &Options::default(),
        &cfg.workdir,
        cfg.dry_run,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            command: "migrate".into(),
            manage_path: String::new(),
            app: "mysite".into(),
            settings: String::new(),
            python: "python3".into(),
            no_shell: true,
            workdir: String::new(),
            args: vec!["--noinput".into()],
            dry_run: false,
        }
    }

    #[test]
    fn test_options_from_flags() {
        let opts = config().options();
        assert_eq!(opts.command.as_deref(), Some("migrate"));
        assert_eq!(opts.manage_path, None);
        assert_eq!(opts.settings, None);
        assert_eq!(opts.python.as_deref(), Some("python3"));
        assert_eq!(opts.shell, Some(false));
        assert_eq!(opts.args, Some(vec!["--noinput".to_string()]));
    }

    #[test]
    fn test_command_required() {
        let mut cfg = config();
        cfg.command.clear();
        let log = Logger::new(Box::new(std::io::sink()), false, crate::logging::Level::Info);
        assert_eq!(run(&log, &cfg).unwrap_err(), "--command is required");
    }
}
