use crate::options::{Options, OptionsError};
use std::path::{Path, PathBuf};

pub const DEFAULT_INTERPRETER: &str = "python";
pub const ENTRY_FILE: &str = "manage.py";

/// A management command, kept as its structured parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageCommand {
    pub interpreter: String,
    pub entry: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    pub settings: Option<String>,
}

impl ManageCommand {
    pub fn from_options(opts: &Options) -> Result<Self, OptionsError> {
        let command = opts
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(OptionsError::MissingCommand)?;
        let manage_path = opts.manage_path.as_deref().unwrap_or("");
        let settings = match opts.settings.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => {
                let app = opts
                    .app
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| OptionsError::SettingsWithoutApp(s.into()))?;
                Some(format!("--settings={}.settings.{}", app, s))
            }
            None => None,
        };
        Ok(Self {
            interpreter: opts
                .python
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_INTERPRETER.into()),
            entry: Path::new(manage_path).join(ENTRY_FILE),
            command: command.into(),
            args: opts.args.clone().unwrap_or_default(),
            settings,
        })
    }

    /// Every token as its own argv entry, for launching without a shell.
    pub fn argv(&self) -> Vec<String> {
        let mut out = vec![
            self.interpreter.clone(),
            self.entry.to_string_lossy().into_owned(),
            self.command.clone(),
        ];
        out.extend(self.args.iter().cloned());
        out.extend(self.settings.iter().cloned());
        out
    }

    /// Single-line form handed to a shell. Arguments are not escaped, so a
    /// shell re-splits and interprets them.
    pub fn command_line(&self) -> String {
        let mut parts = vec![
            self.interpreter.clone(),
            self.entry.to_string_lossy().into_owned(),
            self.command.clone(),
        ];
        if !self.args.is_empty() {
            parts.push(self.args.join(" "));
        }
        if let Some(s) = &self.settings {
            parts.push(s.clone());
        }
        parts.join(" ")
    }
}

impl std::fmt::Display for ManageCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}
