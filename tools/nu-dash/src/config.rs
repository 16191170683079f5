use crate::errors::DashError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "nu-dash.yaml";
pub const DEFAULT_LOG_PATH: &str = ".cache/nu-dash/run.jsonl";
pub const TEMPLATE_SLOT: &str = "%s";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<String>,
}

/// Everything a reload needs besides the file contents. Computed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub config_path: PathBuf,
    pub working_dir: PathBuf,
    pub process_env: Vec<(String, String)>,
    pub cli_env: Vec<(String, String)>,
}

impl ConfigSource {
    pub fn resolve(
        overrides: &CliOverrides,
        process_cwd: &Path,
        process_env: Vec<(String, String)>,
    ) -> Result<Self, DashError> {
        let working_dir = match &overrides.working_dir {
            Some(dir) => absolutize_path(process_cwd, dir),
            None => process_cwd.to_path_buf(),
        };
        let config_path = match &overrides.config_path {
            Some(path) => absolutize_path(&working_dir, path),
            None => working_dir.join(DEFAULT_CONFIG_FILE),
        };
        let cli_env = overrides
            .env
            .iter()
            .map(|entry| parse_env_entry(entry).map_err(DashError::Cli))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config_path,
            working_dir,
            process_env,
            cli_env,
        })
    }

    /// Raw `$EDITOR`, run through `sh -c` so quoting and arguments work.
    pub fn editor(&self) -> String {
        self.process_env
            .iter()
            .find(|(key, value)| key == "EDITOR" && !value.trim().is_empty())
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| "vi".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiBackend {
    Ollama,
    Gemini,
}

impl AiBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2",
            Self::Gemini => "gemini-1.5-flash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiConfig {
    pub backend: AiBackend,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskSpec {
    pub name: String,
    pub command: String,
    pub message_format: String,
    pub error_if: String,
    pub expect_json: bool,
    pub ignore_stderr: bool,
    pub isolated_env: bool,
    pub workdir: String,
    pub actions: Vec<String>,
    pub prompt_source: String,
    pub prompt_template: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashConfig {
    pub tasks: Vec<TaskSpec>,
    pub template: String,
    pub env: Vec<String>,
    pub ignore_stderr: bool,
    pub shell: Vec<String>,
    pub stdin_shell: Vec<String>,
    pub parallelism: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub log_path: PathBuf,
    pub ai: AiConfig,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            template: TEMPLATE_SLOT.to_string(),
            env: Vec::new(),
            ignore_stderr: false,
            shell: vec!["nu".to_string(), "-c".to_string()],
            stdin_shell: vec!["nu".to_string(), "--stdin".to_string(), "-c".to_string()],
            parallelism: None,
            timeout_secs: None,
            interval_secs: None,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            ai: AiConfig {
                backend: AiBackend::Ollama,
                model: AiBackend::Ollama.default_model().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialDashConfig {
    #[serde(alias = "checkList")]
    tasks: Option<Vec<PartialTaskSpec>>,
    template: Option<String>,
    env: Option<Vec<String>>,
    ignore_stderr: Option<bool>,
    shell: Option<Vec<String>>,
    stdin_shell: Option<Vec<String>>,
    parallelism: Option<usize>,
    timeout_secs: Option<u64>,
    #[serde(alias = "refresh")]
    interval: Option<u64>,
    log_path: Option<PathBuf>,
    ai: Option<PartialAiConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialTaskSpec {
    #[serde(alias = "title")]
    name: Option<String>,
    #[serde(alias = "cmd")]
    command: Option<String>,
    message_format: Option<String>,
    error_if: Option<String>,
    expect_json: Option<bool>,
    ignore_stderr: Option<bool>,
    isolated_env: Option<bool>,
    workdir: Option<String>,
    actions: Option<Vec<String>>,
    prompt_source: Option<String>,
    prompt_template: Option<String>,
    timeout_secs: Option<u64>,
    /// Legacy single remediation command; becomes the last action.
    #[serde(alias = "Fix")]
    fix: Option<String>,
    /// Legacy follow-up command; used as the prompt source when none is set.
    #[serde(alias = "More")]
    more: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAiConfig {
    backend: Option<AiBackend>,
    model: Option<String>,
}

pub fn load_config(source: &ConfigSource, fs: &dyn FileSystem) -> Result<DashConfig, DashError> {
    let contents = fs.read_to_string(&source.config_path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<DashConfig, DashError> {
    // An empty document deserializes as unit, not as an empty mapping.
    let blank = contents.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    });
    let partial: PartialDashConfig = if blank {
        PartialDashConfig::default()
    } else {
        serde_yaml::from_str(contents).map_err(|e| DashError::ConfigParse(e.to_string()))?
    };
    let mut cfg = DashConfig::default();
    merge_partial_config(&mut cfg, partial);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut DashConfig, partial: PartialDashConfig) {
    if let Some(template) = partial.template {
        cfg.template = template;
    }
    if let Some(env) = partial.env {
        cfg.env = env;
    }
    if let Some(ignore_stderr) = partial.ignore_stderr {
        cfg.ignore_stderr = ignore_stderr;
    }
    if let Some(shell) = partial.shell {
        cfg.shell = shell;
    }
    if let Some(stdin_shell) = partial.stdin_shell {
        cfg.stdin_shell = stdin_shell;
    }
    if let Some(parallelism) = partial.parallelism {
        cfg.parallelism = Some(parallelism);
    }
    if let Some(timeout) = partial.timeout_secs {
        cfg.timeout_secs = Some(timeout);
    }
    if let Some(interval) = partial.interval {
        cfg.interval_secs = Some(interval);
    }
    if let Some(log_path) = partial.log_path {
        cfg.log_path = log_path;
    }

    if let Some(ai) = partial.ai {
        if let Some(backend) = ai.backend {
            cfg.ai.backend = backend;
            cfg.ai.model = backend.default_model().to_string();
        }
        if let Some(model) = ai.model {
            cfg.ai.model = model;
        }
    }

    // Runs after the global flag is known so every task inherits it.
    if let Some(tasks) = partial.tasks {
        cfg.tasks = tasks
            .into_iter()
            .map(|task| merge_task(task, cfg.ignore_stderr))
            .collect();
    }
}

fn merge_task(partial: PartialTaskSpec, ignore_stderr_default: bool) -> TaskSpec {
    let mut actions = partial.actions.unwrap_or_default();
    if let Some(fix) = partial.fix.filter(|fix| !fix.trim().is_empty()) {
        actions.push(fix);
    }
    let prompt_source = partial
        .prompt_source
        .filter(|source| !source.is_empty())
        .or(partial.more.filter(|more| !more.trim().is_empty()))
        .unwrap_or_default();
    TaskSpec {
        name: partial.name.unwrap_or_default(),
        command: partial.command.unwrap_or_default(),
        message_format: partial.message_format.unwrap_or_default(),
        error_if: partial.error_if.unwrap_or_default(),
        expect_json: partial.expect_json.unwrap_or(false),
        ignore_stderr: partial.ignore_stderr.unwrap_or(ignore_stderr_default),
        isolated_env: partial.isolated_env.unwrap_or(false),
        workdir: partial.workdir.unwrap_or_default(),
        actions,
        prompt_source,
        prompt_template: partial.prompt_template.unwrap_or_default(),
        timeout_secs: partial.timeout_secs,
    }
}

fn validate_config(cfg: &DashConfig) -> Result<(), DashError> {
    let slots = cfg.template.matches(TEMPLATE_SLOT).count();
    if slots != 1 {
        return Err(DashError::InvalidConfig(format!(
            "template must contain exactly one {TEMPLATE_SLOT} slot, found {slots}"
        )));
    }

    if cfg.shell.is_empty() || cfg.stdin_shell.is_empty() {
        return Err(DashError::InvalidConfig(
            "shell and stdin_shell must name a program".to_string(),
        ));
    }

    if cfg.parallelism == Some(0) {
        return Err(DashError::InvalidConfig(
            "parallelism must be greater than zero".to_string(),
        ));
    }
    if cfg.timeout_secs == Some(0) {
        return Err(DashError::InvalidConfig(
            "timeout_secs must be greater than zero".to_string(),
        ));
    }
    if cfg.interval_secs == Some(0) {
        return Err(DashError::InvalidConfig(
            "interval must be greater than zero".to_string(),
        ));
    }

    for entry in &cfg.env {
        parse_env_entry(entry).map_err(DashError::InvalidConfig)?;
    }

    for (idx, task) in cfg.tasks.iter().enumerate() {
        if task.command.trim().is_empty() {
            return Err(DashError::InvalidConfig(format!(
                "tasks[{idx}] ({}) has an empty command",
                task.name
            )));
        }
        if task.timeout_secs == Some(0) {
            return Err(DashError::InvalidConfig(format!(
                "tasks[{idx}].timeout_secs must be greater than zero"
            )));
        }
    }

    Ok(())
}

pub fn parse_env_entry(entry: &str) -> Result<(String, String), String> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("environment entry `{entry}` must look like KEY=VALUE")),
    }
}

/// Layers are applied in order; a later layer replaces an existing key in place.
pub fn resolve_environment(layers: &[&[(String, String)]]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            match merged.iter_mut().find(|(existing, _)| existing == key) {
                Some(slot) => slot.1 = value.clone(),
                None => merged.push((key.clone(), value.clone())),
            }
        }
    }
    merged
}

/// Process env, then config `env`, then `--env`.
pub fn effective_environment(
    cfg: &DashConfig,
    source: &ConfigSource,
) -> Result<Vec<(String, String)>, DashError> {
    let config_env = cfg
        .env
        .iter()
        .map(|entry| parse_env_entry(entry).map_err(DashError::InvalidConfig))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(resolve_environment(&[
        &source.process_env,
        &config_env,
        &source.cli_env,
    ]))
}

pub fn expand_template(template: &str, value: &str) -> String {
    template.replacen(TEMPLATE_SLOT, value, 1)
}

pub fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}
