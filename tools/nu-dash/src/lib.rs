pub mod ai;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod hotkeys;
pub mod log_retention;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod tui;
pub mod types;
pub mod worker_pool;

use ai::factory::GeneratorFactory;
use clap::{error::ErrorKind, Parser};
use config::{absolutize_path, load_config, CliOverrides, ConfigSource};
use errors::DashError;
use logging::{structured_fallback_line, JsonlLogger};
use runtime::ProductionRuntime;
use session::{run_dashboard, Executor};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "nu-dash")]
#[command(about = "Terminal dashboard for shell health checks")]
pub struct Cli {
    /// Config file, relative to the working directory.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Directory to load the config from and run every check in.
    #[arg(short = 'w', long)]
    pub workdir: Option<PathBuf>,
    /// KEY=VALUE override applied on top of the process and config environment.
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            working_dir: self.workdir.clone(),
            env: self.env.clone(),
        }
    }
}

pub fn run() -> Result<i32, DashError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| DashError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[OsString],
    env: &[(OsString, OsString)],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, DashError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(DashError::Cli(error.to_string())),
        },
    };

    let process_env = env
        .iter()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect::<Vec<_>>();
    let source = ConfigSource::resolve(&cli.overrides(), cwd, process_env)?;
    let config = load_config(&source, runtime.file_system.as_ref())?;

    let logger = JsonlLogger::new(absolutize_path(&source.working_dir, &config.log_path));
    let generators =
        GeneratorFactory::with_defaults(runtime.process_runner.clone(), &source.process_env);
    let executor = Executor::new(runtime, source, logger, generators);
    let results = executor.run_batch(&config)?;

    if !runtime.terminal.stdin_is_tty() {
        for (task, result) in config.tasks.iter().zip(&results) {
            runtime.terminal.write_line(&structured_fallback_line(
                &task.name,
                result.level.as_str(),
                &result.message,
            ))?;
        }
        return Ok(0);
    }

    run_dashboard(&executor, config, results)?;
    Ok(0)
}
