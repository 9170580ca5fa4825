use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("reading task file {path:?}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("rendering task file: {0}")]
    Template(String),
    #[error("parsing task file: {0}")]
    Parse(String),
    #[error("unknown target {0:?}")]
    UnknownTarget(String),
    #[error("no management command configured (set \"command\")")]
    MissingCommand,
    #[error("\"settings\" is set to {0:?} but \"app\" is not")]
    SettingsWithoutApp(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Options {
    #[serde(deserialize_with = "scalar")]
    pub command: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub manage_path: Option<String>,
    #[serde(deserialize_with = "scalar_list")]
    pub args: Option<Vec<String>>,
    #[serde(deserialize_with = "scalar")]
    pub app: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub settings: Option<String>,
    /// Interpreter used to run `manage.py`, `python` when unset.
    #[serde(deserialize_with = "scalar")]
    pub python: Option<String>,
    /// Launch through the platform shell (default) or directly.
    pub shell: Option<bool>,
}

// Task data sits behind `#[serde(flatten)]`, which buffers values before
// typing them, so plain YAML scalars such as `4` or `true` have to be turned
// into strings here instead of by serde_yaml.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Str(v) => v,
            Scalar::Int(v) => v.to_string(),
            Scalar::Uint(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Bool(v) => v.to_string(),
        }
    }
}

fn scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(String::from))
}

fn scalar_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(Option::<Vec<Scalar>>::deserialize(d)?
        .map(|v| v.into_iter().map(String::from).collect()))
}

impl Options {
    /// Overlays every key set in `data` onto `self`.
    pub fn merge(&mut self, data: &Options) {
        fn overlay<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }
        overlay(&mut self.command, &data.command);
        overlay(&mut self.manage_path, &data.manage_path);
        overlay(&mut self.args, &data.args);
        overlay(&mut self.app, &data.app);
        overlay(&mut self.settings, &data.settings);
        overlay(&mut self.python, &data.python);
        overlay(&mut self.shell, &data.shell);
    }

    pub fn merged(mut self, data: &Options) -> Options {
        self.merge(data);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub options: Options,
    #[serde(flatten)]
    pub tasks: BTreeMap<String, Options>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskFile {
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

impl TaskFile {
    pub fn from_yaml(content: &str) -> Result<Self, OptionsError> {
        serde_yaml::from_str(content).map_err(|e| OptionsError::Parse(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self, OptionsError> {
        serde_json::from_str(content).map_err(|e| OptionsError::Parse(e.to_string()))
    }

    /// The options and the task data for one invocation, not yet merged:
    /// task-wide options overlaid with the target's, and the task's own data.
    /// A task the target does not define contributes no data.
    pub fn layers(&self, target: &str, task: Option<&str>) -> Result<(Options, Options), OptionsError> {
        let t = self
            .targets
            .get(target)
            .ok_or_else(|| OptionsError::UnknownTarget(target.into()))?;
        let base = self.options.clone().merged(&t.options);
        let data = task
            .and_then(|name| t.tasks.get(name))
            .cloned()
            .unwrap_or_default();
        Ok((base, data))
    }

    pub fn has_task(&self, target: &str, task: &str) -> bool {
        self.targets
            .get(target)
            .is_some_and(|t| t.tasks.contains_key(task))
    }

    /// Effective options for `target`, overlaid with `task`'s data when given.
    pub fn resolve(&self, target: &str, task: Option<&str>) -> Result<Options, OptionsError> {
        let (base, data) = self.layers(target, task)?;
        Ok(base.merged(&data))
    }

    /// `target` and `target:task` names, in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, t) in &self.targets {
            out.push(name.clone());
            for task in t.tasks.keys() {
                out.push(format!("{}:{}", name, task));
            }
        }
        out
    }
}

fn render_template(content: &str) -> Result<String, OptionsError> {
    let env_map: BTreeMap<String, String> = std::env::vars().collect();
    let mut jinja_env = minijinja::Environment::new();
    jinja_env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
    jinja_env
        .add_template("tasks", content)
        .map_err(|e| OptionsError::Template(e.to_string()))?;
    let tmpl = jinja_env
        .get_template("tasks")
        .map_err(|e| OptionsError::Template(e.to_string()))?;
    tmpl.render(minijinja::context!(env => env_map))
        .map_err(|e| OptionsError::Template(e.to_string()))
}

/// Reads, renders and parses a task file. `.json` files are parsed as JSON,
/// everything else as YAML.
pub fn load(path: &Path) -> Result<TaskFile, OptionsError> {
    let content = std::fs::read_to_string(path).map_err(|source| OptionsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let rendered = render_template(&content)?;
    if path.extension().is_some_and(|ext| ext == "json") {
        TaskFile::from_json(&rendered)
    } else {
        TaskFile::from_yaml(&rendered)
    }
}
