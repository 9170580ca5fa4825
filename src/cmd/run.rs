use crate::logging::Logger;
use crate::options;
use std::path::Path;

pub struct Config {
    pub config: String,
    pub target: Option<String>,
    pub task: Option<String>,
    pub workdir: String,
    pub list: bool,
    pub dry_run: bool,
}

/// Splits `dev:migrate` into target and task; an explicit task wins.
fn split_target<'a>(target: &'a str, task: Option<&'a str>) -> (&'a str, Option<&'a str>) {
    match (target.split_once(':'), task) {
        (Some((t, k)), None) if !k.is_empty() => (t, Some(k)),
        (Some((t, _)), Some(k)) => (t, Some(k)),
        _ => (target, task),
    }
}

pub fn run(log: &Logger, cfg: &Config) -> Result<(), String> {
    let file = options::load(Path::new(&cfg.config)).map_err(|e| e.to_string())?;
    if cfg.list {
        for name in file.names() {
            println!("{}", name);
        }
        return Ok(());
    }
    let target = cfg
        .target
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or("a target is required (see --list)")?;
    let (target, task) = split_target(target, cfg.task.as_deref());
    let (base, data) = file.layers(target, task).map_err(|e| e.to_string())?;
    if let Some(k) = task {
        if !file.has_task(target, k) {
            log.warn(
                "target has no such task, running with target options",
                &[("target", target), ("task", k)],
            );
        }
    }
    let label = match task {
        Some(k) => format!("{}:{}", target, k),
        None => target.to_string(),
    };
    log.debug("loaded task file", &[("config", &cfg.config), ("task", &label)]);
    super::execute(log, &label, &base, &data, &cfg.workdir, cfg.dry_run)
}
