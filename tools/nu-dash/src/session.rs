use crate::ai::factory::GeneratorFactory;
use crate::ai::build_prompt;
use crate::classifier::ExecutionContext;
use crate::config::{load_config, ConfigSource, DashConfig};
use crate::dashboard::{update, DashboardState, Effect, Event, ReloadOutcome};
use crate::errors::DashError;
use crate::hotkeys::action_for_key_event;
use crate::logging::JsonlLogger;
use crate::runtime::{FileSystem, ProcessRequest, ProcessRunner, ProductionRuntime, Terminal};
use crate::tui::draw_dashboard;
use crate::types::{ExecutionResult, Viewport};
use crate::worker_pool::{log_batch, run_task_batch};
use crossterm::event::{self, Event as TermEvent};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use serde_json::json;
use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ACTION_PAUSE_PROMPT: &str = "Press enter to return to the dashboard...";

/// `$EDITOR` is a POSIX shell fragment; the config path arrives as `$1`.
const EDITOR_SHELL: [&str; 2] = ["sh", "-c"];

const TICK_RATE: Duration = Duration::from_millis(500);

/// Performs the side effects the state machine asks for.
pub struct Executor {
    file_system: Arc<dyn FileSystem>,
    process_runner: Arc<dyn ProcessRunner>,
    terminal: Arc<dyn Terminal>,
    source: ConfigSource,
    logger: JsonlLogger,
    generators: GeneratorFactory,
}

impl Executor {
    pub fn new(
        runtime: &ProductionRuntime,
        source: ConfigSource,
        logger: JsonlLogger,
        generators: GeneratorFactory,
    ) -> Self {
        Self {
            file_system: runtime.file_system.clone(),
            process_runner: runtime.process_runner.clone(),
            terminal: runtime.terminal.clone(),
            source,
            logger,
            generators,
        }
    }

    /// Runs every task of `config` once and logs the outcomes.
    pub fn run_batch(&self, config: &DashConfig) -> Result<Vec<ExecutionResult>, DashError> {
        let ctx = ExecutionContext::new(config, &self.source)?;
        let results = run_task_batch(
            &config.tasks,
            &ctx,
            self.process_runner.as_ref(),
            config.parallelism,
        );
        log_batch(&self.logger, &config.tasks, &results);
        Ok(results)
    }

    pub fn load_and_run(&self) -> Result<(DashConfig, Vec<ExecutionResult>), DashError> {
        let config = load_config(&self.source, self.file_system.as_ref())?;
        let results = self.run_batch(&config)?;
        Ok((config, results))
    }

    pub fn reload(&self) -> ReloadOutcome {
        match self.load_and_run() {
            Ok((config, results)) => ReloadOutcome::Replaced { config, results },
            Err(err) => {
                self.logger.record(
                    "warn",
                    "config.reload_rejected",
                    json!({
                        "config_path": self.source.config_path.display().to_string(),
                        "error": err.to_string(),
                    }),
                );
                ReloadOutcome::ConfigRejected(err.to_string())
            }
        }
    }

    /// Hands the terminal to `actions[action]` of `tasks[task]`, then pauses
    /// until the operator presses enter.
    pub fn run_action(
        &self,
        config: &DashConfig,
        task: usize,
        action: usize,
    ) -> Result<(), String> {
        let Some(spec) = config.tasks.get(task) else {
            return Err(format!("no task at index {task}"));
        };
        let Some(command) = spec.actions.get(action) else {
            return Err(format!("task `{}` has no action {action}", spec.name));
        };

        let outcome = ExecutionContext::new(config, &self.source)
            .map(|ctx| {
                let mut request = ctx.plain_request(spec, command);
                request.timeout = None;
                request
            })
            .and_then(|request| self.process_runner.run_interactive(request))
            .map_err(|e| e.to_string())
            .and_then(|code| match code {
                0 => Ok(()),
                code => Err(format!("action `{command}` exited with status {code}")),
            });
        if let Err(err) = self.terminal.wait_for_enter(ACTION_PAUSE_PROMPT) {
            self.logger.record(
                "warn",
                "action.pause_failed",
                json!({
                    "task": spec.name,
                    "action": command,
                    "error": err.to_string(),
                }),
            );
        }

        if let Err(message) = &outcome {
            self.logger.record(
                "warn",
                "action.failed",
                json!({
                    "task": spec.name,
                    "action": command,
                    "error": message,
                }),
            );
        }
        outcome
    }

    pub fn open_editor(&self) -> Result<(), String> {
        let editor = self.source.editor();
        let request = ProcessRequest {
            program: EDITOR_SHELL[0].to_string(),
            args: vec![
                EDITOR_SHELL[1].to_string(),
                format!("{editor} \"$@\""),
                "editor".to_string(),
                self.source.config_path.display().to_string(),
            ],
            cwd: Some(self.source.working_dir.clone()),
            ..ProcessRequest::default()
        };

        let outcome = self
            .process_runner
            .run_interactive(request)
            .map_err(|e| e.to_string())
            .and_then(|code| match code {
                0 => Ok(()),
                code => Err(format!("editor `{editor}` exited with status {code}")),
            });

        if let Err(message) = &outcome {
            self.logger.record(
                "warn",
                "editor.failed",
                json!({ "editor": editor, "error": message }),
            );
        }
        outcome
    }

    /// The inner result is shown to the operator either way; only client
    /// construction failures escape as `Err`.
    pub fn explain(
        &self,
        config: &DashConfig,
        results: &[ExecutionResult],
        task: usize,
    ) -> Result<Result<String, String>, DashError> {
        let Some(spec) = config.tasks.get(task) else {
            return Ok(Err(format!("no task at index {task}")));
        };
        let source_text = if spec.prompt_source.trim().is_empty() {
            results
                .get(task)
                .map(|result| result.details.clone())
                .unwrap_or_default()
        } else {
            let output = ExecutionContext::new(config, &self.source).and_then(|ctx| {
                self.process_runner
                    .run(ctx.plain_request(spec, &spec.prompt_source))
            });
            match output {
                Ok(output) => output.combined(),
                Err(err) => return Ok(Err(err.to_string())),
            }
        };

        let Some(generator) = self.generators.get(config.ai.backend) else {
            return Ok(Err(format!(
                "no text generator registered for {}",
                config.ai.backend.as_str()
            )));
        };
        let prompt = build_prompt(&spec.prompt_template, &source_text);
        let outcome = generator.generate(&prompt, &config.ai.model);

        self.logger.record(
            if outcome.is_ok() { "info" } else { "warn" },
            "ai.explain",
            json!({
                "task": spec.name,
                "backend": config.ai.backend.as_str(),
                "model": config.ai.model,
                "ok": outcome.is_ok(),
            }),
        );

        match outcome {
            Ok(text) => Ok(Ok(text)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => Ok(Err(err.to_string())),
        }
    }
}

type DashTerminal = ratatui::Terminal<CrosstermBackend<Stdout>>;

fn terminal_error(err: io::Error) -> DashError {
    DashError::Terminal(err.to_string())
}

pub fn run_dashboard(
    executor: &Executor,
    config: DashConfig,
    results: Vec<ExecutionResult>,
) -> Result<(), DashError> {
    enable_raw_mode().map_err(terminal_error)?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(terminal_error)?;
    let mut terminal =
        ratatui::Terminal::new(CrosstermBackend::new(stdout)).map_err(terminal_error)?;

    let run_result = run_loop(&mut terminal, executor, config, results);

    disable_raw_mode().map_err(terminal_error)?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).map_err(terminal_error)?;
    terminal.show_cursor().map_err(terminal_error)?;

    run_result
}

fn suspend(terminal: &mut DashTerminal) -> Result<(), DashError> {
    disable_raw_mode().map_err(terminal_error)?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).map_err(terminal_error)?;
    terminal.show_cursor().map_err(terminal_error)
}

fn resume(terminal: &mut DashTerminal) -> Result<(), DashError> {
    enable_raw_mode().map_err(terminal_error)?;
    execute!(terminal.backend_mut(), EnterAlternateScreen).map_err(terminal_error)?;
    terminal.hide_cursor().map_err(terminal_error)?;
    terminal.clear().map_err(terminal_error)
}

fn run_loop(
    terminal: &mut DashTerminal,
    executor: &Executor,
    config: DashConfig,
    results: Vec<ExecutionResult>,
) -> Result<(), DashError> {
    let size = terminal.size().map_err(terminal_error)?;
    let mut state = DashboardState::new(
        config,
        results,
        Viewport {
            width: size.width,
            height: size.height,
        },
    );
    let mut output = String::new();
    let mut pending = VecDeque::new();
    let mut last_tick = Instant::now();

    loop {
        terminal
            .draw(|frame| draw_dashboard(frame, &state, &output))
            .map_err(terminal_error)?;

        let event = match pending.pop_front() {
            Some(event) => event,
            None => next_event(&mut last_tick)?,
        };
        let (next, effects) = update(state, event);
        state = next;

        for effect in effects {
            match effect {
                Effect::Quit => return Ok(()),
                Effect::Reload => {
                    terminal
                        .draw(|frame| draw_dashboard(frame, &state, &output))
                        .map_err(terminal_error)?;
                    pending.push_back(Event::ReloadFinished(executor.reload()));
                    last_tick = Instant::now();
                }
                Effect::RunAction { task, action } => {
                    suspend(terminal)?;
                    let outcome = executor.run_action(&state.config, task, action);
                    resume(terminal)?;
                    pending.push_back(Event::ActionFinished(outcome));
                    last_tick = Instant::now();
                }
                Effect::OpenEditor => {
                    suspend(terminal)?;
                    let outcome = executor.open_editor();
                    resume(terminal)?;
                    pending.push_back(Event::EditorFinished(outcome));
                    last_tick = Instant::now();
                }
                Effect::Explain { task } => {
                    let outcome = executor.explain(&state.config, &state.results, task)?;
                    pending.push_back(Event::ExplainFinished(outcome));
                }
                Effect::Print(text) => output = text,
                Effect::ClearScreen => terminal.clear().map_err(terminal_error)?,
            }
        }
    }
}

fn next_event(last_tick: &mut Instant) -> Result<Event, DashError> {
    loop {
        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).map_err(terminal_error)? {
            match event::read().map_err(terminal_error)? {
                TermEvent::Key(key) => {
                    if let Some(action) = action_for_key_event(&key) {
                        return Ok(Event::Key(action));
                    }
                }
                TermEvent::Resize(width, height) => {
                    return Ok(Event::Resize(Viewport { width, height }));
                }
                _ => {}
            }
        }
        if last_tick.elapsed() >= TICK_RATE {
            let delta = last_tick.elapsed();
            *last_tick = Instant::now();
            return Ok(Event::Tick(delta));
        }
    }
}
