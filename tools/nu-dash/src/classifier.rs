use crate::config::{
    absolutize_path, effective_environment, expand_template, ConfigSource, DashConfig, TaskSpec,
};
use crate::errors::DashError;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::types::ExecutionResult;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable inputs shared by every task of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub shell: Vec<String>,
    pub stdin_shell: Vec<String>,
    pub template: String,
    pub environment: Vec<(String, String)>,
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
}

impl ExecutionContext {
    pub fn new(cfg: &DashConfig, source: &ConfigSource) -> Result<Self, DashError> {
        Ok(Self {
            shell: cfg.shell.clone(),
            stdin_shell: cfg.stdin_shell.clone(),
            template: cfg.template.clone(),
            environment: effective_environment(cfg, source)?,
            working_dir: source.working_dir.clone(),
            timeout: cfg.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn task_workdir(&self, task: &TaskSpec) -> PathBuf {
        if task.workdir.trim().is_empty() {
            self.working_dir.clone()
        } else {
            absolutize_path(&self.working_dir, std::path::Path::new(task.workdir.trim()))
        }
    }

    /// The primary check: template applied, no stdin.
    pub fn check_request(&self, task: &TaskSpec) -> ProcessRequest {
        let command = expand_template(&self.template, &task.command);
        self.request(task, &self.shell, command, None)
    }

    /// Formatter and condition commands read the check's stdout on stdin.
    pub fn filter_request(&self, task: &TaskSpec, command: &str, input: &str) -> ProcessRequest {
        self.request(
            task,
            &self.stdin_shell,
            command.to_string(),
            Some(input.to_string()),
        )
    }

    /// Follow-up actions and prompt sources run untemplated.
    pub fn plain_request(&self, task: &TaskSpec, command: &str) -> ProcessRequest {
        self.request(task, &self.shell, command.to_string(), None)
    }

    fn request(
        &self,
        task: &TaskSpec,
        shell: &[String],
        command: String,
        stdin: Option<String>,
    ) -> ProcessRequest {
        let workdir = self.task_workdir(task);
        let mut argv = Vec::with_capacity(shell.len() + 4);
        if task.isolated_env {
            argv.push("direnv".to_string());
            argv.push("exec".to_string());
            argv.push(workdir.display().to_string());
        }
        argv.extend(shell.iter().cloned());
        argv.push(command);

        // `argv` is never empty: `command` was pushed last.
        let program = argv.remove(0);
        ProcessRequest {
            program,
            args: argv,
            cwd: Some(workdir),
            env: Some(self.environment.clone()),
            stdin,
            timeout: task.timeout_secs.map(Duration::from_secs).or(self.timeout),
        }
    }
}

struct AuxOutcome {
    stdout: String,
    stderr: String,
    failure: Option<String>,
}

impl AuxOutcome {
    fn from_run(result: Result<ProcessOutput, DashError>) -> Self {
        match result {
            Ok(output) => Self {
                failure: output.failure(),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(err) => Self {
                stdout: String::new(),
                stderr: String::new(),
                failure: Some(err.to_string()),
            },
        }
    }

    fn report(&self) -> String {
        let mut text = format!("{}{}", self.stdout, self.stderr);
        if let Some(failure) = &self.failure {
            append_section(&mut text, failure);
        }
        text
    }
}

fn append_section(details: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !details.is_empty() && !details.ends_with('\n') {
        details.push('\n');
    }
    details.push_str(text);
}

pub fn classify(
    task: &TaskSpec,
    ctx: &ExecutionContext,
    runner: &dyn ProcessRunner,
) -> ExecutionResult {
    let output = match runner.run(ctx.check_request(task)) {
        Ok(output) => output,
        Err(err) => {
            let text = err.to_string();
            return ExecutionResult::critical(text.clone(), text);
        }
    };

    // Primary failure stops the pipeline before any auxiliary command runs.
    if let Some(failure) = output.failure() {
        let mut details = output.combined();
        append_section(&mut details, &failure);
        return ExecutionResult::critical(failure, details);
    }

    let stdout = output.stdout;
    let stderr = if task.ignore_stderr {
        String::new()
    } else {
        output.stderr
    };

    if task.expect_json {
        return match serde_json::from_str::<ExecutionResult>(&stdout) {
            Ok(parsed) => parsed,
            Err(err) => ExecutionResult::critical(err.to_string(), stdout),
        };
    }

    let mut message = stdout.clone();
    let mut details = format!("{stdout}{stderr}");

    if !task.message_format.trim().is_empty() {
        let formatted = AuxOutcome::from_run(
            runner.run(ctx.filter_request(task, &task.message_format, &stdout)),
        );
        if formatted.failure.is_none() {
            message = formatted.stdout;
        } else {
            append_section(&mut details, &formatted.report());
        }
    }

    if task.error_if.trim().is_empty() {
        return ExecutionResult::info(message, details);
    }

    let condition =
        AuxOutcome::from_run(runner.run(ctx.filter_request(task, &task.error_if, &stdout)));
    if condition.stdout.to_lowercase().contains("true") {
        append_section(&mut details, &condition.report());
        return ExecutionResult::error(message, details);
    }
    if condition.failure.is_some() {
        append_section(&mut details, &condition.report());
        return ExecutionResult::critical(message, details);
    }
    ExecutionResult::info(message, details)
}
