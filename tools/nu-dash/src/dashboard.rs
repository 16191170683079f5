use crate::config::DashConfig;
use crate::hotkeys::HotkeyAction;
use crate::types::{ExecutionResult, Phase, Viewport};
use std::time::Duration;

const LEVEL_COLUMN_WIDTH: u16 = 10;
const NAME_COLUMN_WIDTH: u16 = 30;

/// Level, Name, Message, Details. The two free columns split what the fixed
/// label columns leave over.
pub fn column_widths(width: u16) -> [u16; 4] {
    let free = width.saturating_sub(LEVEL_COLUMN_WIDTH + NAME_COLUMN_WIDTH + 10) / 2;
    [LEVEL_COLUMN_WIDTH, NAME_COLUMN_WIDTH, free, free]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Replaced {
        config: DashConfig,
        results: Vec<ExecutionResult>,
    },
    ConfigRejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(HotkeyAction),
    Resize(Viewport),
    Tick(Duration),
    ReloadFinished(ReloadOutcome),
    ActionFinished(Result<(), String>),
    EditorFinished(Result<(), String>),
    ExplainFinished(Result<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Reload,
    RunAction { task: usize, action: usize },
    OpenEditor,
    Explain { task: usize },
    Print(String),
    ClearScreen,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardState {
    pub config: DashConfig,
    pub results: Vec<ExecutionResult>,
    pub selected: usize,
    pub focused: bool,
    pub elapsed: Duration,
    pub viewport: Viewport,
    pub columns: [u16; 4],
    pub phase: Phase,
    pub status: Option<String>,
}

impl DashboardState {
    pub fn new(config: DashConfig, results: Vec<ExecutionResult>, viewport: Viewport) -> Self {
        Self {
            config,
            results,
            selected: 0,
            focused: true,
            elapsed: Duration::ZERO,
            viewport,
            columns: column_widths(viewport.width),
            phase: Phase::Idle,
            status: None,
        }
    }

    pub fn selected_result(&self) -> Option<&ExecutionResult> {
        self.results.get(self.selected)
    }

    fn refresh_interval(&self) -> Option<Duration> {
        self.config
            .interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.config.tasks.len().saturating_sub(1));
    }
}

pub fn update(mut state: DashboardState, event: Event) -> (DashboardState, Vec<Effect>) {
    let mut effects = Vec::new();
    match event {
        Event::Key(action) => {
            if state.phase != Phase::Idle {
                if action == HotkeyAction::Quit && state.phase != Phase::Exiting {
                    state.phase = Phase::Exiting;
                    effects.push(Effect::Quit);
                }
                return (state, effects);
            }
            state.status = None;
            handle_key(&mut state, action, &mut effects);
        }
        Event::Resize(viewport) => {
            state.viewport = viewport;
            state.columns = column_widths(viewport.width);
        }
        Event::Tick(delta) => {
            state.elapsed = state.elapsed.saturating_add(delta);
            if state.phase == Phase::Idle
                && state
                    .refresh_interval()
                    .is_some_and(|interval| state.elapsed >= interval)
            {
                state.phase = Phase::Reloading;
                effects.push(Effect::Reload);
            }
        }
        Event::ReloadFinished(outcome) => {
            if let ReloadOutcome::Replaced { config, results } = outcome {
                state.config = config;
                state.results = results;
                state.clamp_selection();
            }
            state.elapsed = Duration::ZERO;
            leave_handoff(&mut state);
        }
        Event::ActionFinished(outcome) => {
            if let Err(message) = outcome {
                state.status = Some(message);
            }
            leave_handoff(&mut state);
            effects.push(Effect::ClearScreen);
        }
        Event::EditorFinished(outcome) => {
            if let Err(message) = outcome {
                state.status = Some(message);
            }
            effects.push(Effect::ClearScreen);
            if state.phase != Phase::Exiting {
                state.phase = Phase::Reloading;
                effects.push(Effect::Reload);
            }
        }
        Event::ExplainFinished(outcome) => match outcome {
            Ok(text) => effects.push(Effect::Print(text)),
            Err(message) => {
                state.status = Some(format!("explain failed: {message}"));
                effects.push(Effect::Print(message));
            }
        },
    }
    (state, effects)
}

fn leave_handoff(state: &mut DashboardState) {
    if state.phase != Phase::Exiting {
        state.phase = Phase::Idle;
    }
}

fn handle_key(state: &mut DashboardState, action: HotkeyAction, effects: &mut Vec<Effect>) {
    let task_count = state.config.tasks.len();
    match action {
        HotkeyAction::Quit => {
            state.phase = Phase::Exiting;
            effects.push(Effect::Quit);
        }
        HotkeyAction::Reload => {
            state.phase = Phase::Reloading;
            effects.push(Effect::Reload);
        }
        HotkeyAction::OpenEditor => {
            state.phase = Phase::ActionRunning;
            effects.push(Effect::OpenEditor);
        }
        HotkeyAction::Explain => {
            if state.selected < task_count {
                effects.push(Effect::Explain {
                    task: state.selected,
                });
            }
        }
        HotkeyAction::RunAction(action) => {
            let has_action = state
                .config
                .tasks
                .get(state.selected)
                .is_some_and(|task| action < task.actions.len());
            if has_action {
                state.phase = Phase::ActionRunning;
                effects.push(Effect::RunAction {
                    task: state.selected,
                    action,
                });
            }
        }
        HotkeyAction::ShowDetails => {
            if let Some(result) = state.selected_result() {
                effects.push(Effect::Print(format!(
                    "{}\n{}",
                    result.message.trim_end(),
                    result.details.trim_end()
                )));
            }
        }
        HotkeyAction::ToggleFocus => state.focused = !state.focused,
        HotkeyAction::SelectNext if state.focused => {
            if state.selected + 1 < task_count {
                state.selected += 1;
            }
        }
        HotkeyAction::SelectPrev if state.focused => {
            state.selected = state.selected.saturating_sub(1);
        }
        HotkeyAction::SelectFirst if state.focused => state.selected = 0,
        HotkeyAction::SelectLast if state.focused => {
            state.selected = task_count.saturating_sub(1);
        }
        HotkeyAction::SelectNext
        | HotkeyAction::SelectPrev
        | HotkeyAction::SelectFirst
        | HotkeyAction::SelectLast => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{column_widths, update, DashboardState, Effect, Event, ReloadOutcome};
    use crate::config::{DashConfig, TaskSpec};
    use crate::hotkeys::HotkeyAction;
    use crate::types::{ExecutionResult, Phase, Viewport};
    use std::time::Duration;

    fn task(name: &str, actions: &[&str]) -> TaskSpec {
        TaskSpec {
            name: name.to_string(),
            command: format!("echo {name}"),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            ..TaskSpec::default()
        }
    }

    fn state() -> DashboardState {
        let config = DashConfig {
            tasks: vec![task("disk", &["df -h"]), task("load", &[]), task("net", &[])],
            ..DashConfig::default()
        };
        let results = vec![
            ExecutionResult::info("ok\n", "ok\n"),
            ExecutionResult::error("high", "load 9"),
            ExecutionResult::critical("exit status 1", "boom\nexit status 1"),
        ];
        DashboardState::new(config, results, Viewport::default())
    }

    fn key(s: DashboardState, action: HotkeyAction) -> (DashboardState, Vec<Effect>) {
        update(s, Event::Key(action))
    }

    #[test]
    fn column_widths_saturate_on_narrow_terminals() {
        assert_eq!(column_widths(80), [10, 30, 15, 15]);
        assert_eq!(column_widths(151), [10, 30, 50, 50]);
        assert_eq!(column_widths(20), [10, 30, 0, 0]);
    }

    #[test]
    fn resize_recomputes_columns_without_changing_phase() {
        let (s, effects) = update(state(), Event::Resize(Viewport { width: 120, height: 40 }));
        assert!(effects.is_empty());
        assert_eq!(s.columns, [10, 30, 35, 35]);
        assert_eq!(s.viewport.height, 40);
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn navigation_stays_in_bounds_and_requires_focus() {
        let (s, _) = key(state(), HotkeyAction::SelectLast);
        assert_eq!(s.selected, 2);
        let (s, _) = key(s, HotkeyAction::SelectNext);
        assert_eq!(s.selected, 2);
        let (s, _) = key(s, HotkeyAction::SelectFirst);
        let (s, _) = key(s, HotkeyAction::SelectPrev);
        assert_eq!(s.selected, 0);

        let (s, _) = key(s, HotkeyAction::ToggleFocus);
        assert!(!s.focused);
        let (s, _) = key(s, HotkeyAction::SelectNext);
        assert_eq!(s.selected, 0);
    }

    #[test]
    fn reload_replaces_config_and_results_atomically() {
        let (s, effects) = key(state(), HotkeyAction::SelectLast);
        assert!(effects.is_empty());
        let (s, effects) = key(s, HotkeyAction::Reload);
        assert_eq!(effects, vec![Effect::Reload]);
        assert_eq!(s.phase, Phase::Reloading);

        let config = DashConfig {
            tasks: vec![task("only", &[])],
            ..DashConfig::default()
        };
        let (s, effects) = update(
            s,
            Event::ReloadFinished(ReloadOutcome::Replaced {
                config: config.clone(),
                results: vec![ExecutionResult::info("fine", "fine")],
            }),
        );
        assert!(effects.is_empty());
        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.config, config);
        assert_eq!(s.results.len(), 1);
        assert_eq!(s.selected, 0);
    }

    #[test]
    fn rejected_reload_keeps_previous_config_and_results() {
        let before = state();
        let (s, _) = key(before.clone(), HotkeyAction::Reload);
        let (s, _) = update(
            s,
            Event::ReloadFinished(ReloadOutcome::ConfigRejected("bad yaml".to_string())),
        );
        assert_eq!(s.config, before.config);
        assert_eq!(s.results, before.results);
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn input_is_ignored_while_busy_except_quit() {
        let (s, _) = key(state(), HotkeyAction::Reload);
        let (s, effects) = key(s, HotkeyAction::SelectNext);
        assert!(effects.is_empty());
        assert_eq!(s.selected, 0);
        let (s, effects) = key(s, HotkeyAction::Reload);
        assert!(effects.is_empty());
        let (s, effects) = key(s, HotkeyAction::Quit);
        assert_eq!(effects, vec![Effect::Quit]);
        assert_eq!(s.phase, Phase::Exiting);

        let (s, _) = update(
            s,
            Event::ReloadFinished(ReloadOutcome::ConfigRejected("late".to_string())),
        );
        assert_eq!(s.phase, Phase::Exiting);
    }

    #[test]
    fn numeric_key_runs_existing_action_only() {
        let (s, effects) = key(state(), HotkeyAction::RunAction(0));
        assert_eq!(effects, vec![Effect::RunAction { task: 0, action: 0 }]);
        assert_eq!(s.phase, Phase::ActionRunning);

        let (s, effects) = update(s, Event::ActionFinished(Err("exit status 2".to_string())));
        assert_eq!(effects, vec![Effect::ClearScreen]);
        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.status.as_deref(), Some("exit status 2"));

        let (s, effects) = key(s, HotkeyAction::RunAction(1));
        assert!(effects.is_empty());
        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.status, None);
    }

    #[test]
    fn editor_exit_always_triggers_reload() {
        let (s, effects) = key(state(), HotkeyAction::OpenEditor);
        assert_eq!(effects, vec![Effect::OpenEditor]);
        assert_eq!(s.phase, Phase::ActionRunning);
        let (s, effects) = update(s, Event::EditorFinished(Ok(())));
        assert_eq!(effects, vec![Effect::ClearScreen, Effect::Reload]);
        assert_eq!(s.phase, Phase::Reloading);

        let (s, _) = update(
            s,
            Event::ReloadFinished(ReloadOutcome::ConfigRejected("x".to_string())),
        );
        let (s, _) = key(s, HotkeyAction::OpenEditor);
        let (s, effects) = update(s, Event::EditorFinished(Err("vi: not found".to_string())));
        assert_eq!(effects, vec![Effect::ClearScreen, Effect::Reload]);
        assert_eq!(s.status.as_deref(), Some("vi: not found"));
    }

    #[test]
    fn details_and_explain_do_not_change_table_state() {
        let (s, _) = key(state(), HotkeyAction::SelectNext);
        let before = s.clone();
        let (s, effects) = key(s, HotkeyAction::ShowDetails);
        assert_eq!(effects, vec![Effect::Print("high\nload 9".to_string())]);
        let (s, effects) = key(s, HotkeyAction::Explain);
        assert_eq!(effects, vec![Effect::Explain { task: 1 }]);
        let (s, effects) = update(s, Event::ExplainFinished(Ok("\nLoad is high.\n".to_string())));
        assert_eq!(effects, vec![Effect::Print("\nLoad is high.\n".to_string())]);
        assert_eq!(s, before);

        let (s, effects) = update(s, Event::ExplainFinished(Err("timeout".to_string())));
        assert_eq!(effects, vec![Effect::Print("timeout".to_string())]);
        assert_eq!(s.status.as_deref(), Some("explain failed: timeout"));
    }

    #[test]
    fn ticks_fire_reload_once_interval_elapses() {
        let mut base = state();
        base.config.interval_secs = Some(5);
        let (s, effects) = update(base, Event::Tick(Duration::from_secs(3)));
        assert!(effects.is_empty());
        let (s, effects) = update(s, Event::Tick(Duration::from_secs(2)));
        assert_eq!(effects, vec![Effect::Reload]);
        assert_eq!(s.phase, Phase::Reloading);
        let (s, effects) = update(s, Event::Tick(Duration::from_secs(10)));
        assert!(effects.is_empty());

        let (s, _) = update(
            s,
            Event::ReloadFinished(ReloadOutcome::ConfigRejected("x".to_string())),
        );
        assert_eq!(s.elapsed, Duration::ZERO);
    }

    #[test]
    fn ticks_without_interval_only_advance_elapsed() {
        let (s, effects) = update(state(), Event::Tick(Duration::from_secs(3600)));
        assert!(effects.is_empty());
        assert_eq!(s.elapsed, Duration::from_secs(3600));
    }

    #[test]
    fn empty_task_list_is_inert() {
        let s = DashboardState::new(DashConfig::default(), Vec::new(), Viewport::default());
        let (s, effects) = key(s, HotkeyAction::ShowDetails);
        assert!(effects.is_empty());
        let (s, effects) = key(s, HotkeyAction::Explain);
        assert!(effects.is_empty());
        let (s, _) = key(s, HotkeyAction::SelectLast);
        assert_eq!(s.selected, 0);
    }
}
