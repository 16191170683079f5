use crate::dashboard::DashboardState;
use crate::errors::DashError;
use crate::hotkeys::dashboard_controls_legend;
use crate::types::{Level, LevelCounts};
use ratatui::backend::TestBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap};
use ratatui::{Frame, Terminal};

const OUTPUT_PANE_HEIGHT: u16 = 8;

fn level_style(level: Level) -> Style {
    match level {
        Level::Info => Style::default().fg(Color::Green),
        Level::Error => Style::default().fg(Color::Yellow),
        Level::Critical => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim_end()
}

fn header_line(state: &DashboardState) -> Line<'static> {
    let counts = LevelCounts::tally(&state.results);
    Line::from(vec![
        Span::raw(format!("tasks={} ", state.config.tasks.len())),
        Span::styled(format!("info={} ", counts.info), level_style(Level::Info)),
        Span::styled(format!("error={} ", counts.error), level_style(Level::Error)),
        Span::styled(
            format!("critical={}", counts.critical),
            level_style(Level::Critical),
        ),
        Span::raw(format!(
            " | refreshed {}s ago | {}",
            state.elapsed.as_secs(),
            state.phase.as_str()
        )),
    ])
}

pub fn draw_dashboard(frame: &mut Frame, state: &DashboardState, output: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(OUTPUT_PANE_HEIGHT),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(
        Paragraph::new(header_line(state))
            .block(Block::default().borders(Borders::ALL).title("nu-dash")),
        chunks[0],
    );

    let rows = state
        .config
        .tasks
        .iter()
        .zip(&state.results)
        .map(|(task, result)| {
            Row::new(vec![
                Cell::from(format!("{} {}", result.level.icon(), result.level.as_str()))
                    .style(level_style(result.level)),
                Cell::from(task.name.clone()),
                Cell::from(first_line(&result.message).to_string()),
                Cell::from(first_line(&result.details).to_string()),
            ])
        })
        .collect::<Vec<_>>();
    let widths = state.columns.map(Constraint::Length);
    let highlight = if state.focused {
        Style::default().bg(Color::Blue).fg(Color::White)
    } else {
        Style::default()
    };
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec!["Level", "Name", "Message", "Details"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .row_highlight_style(highlight)
        .block(Block::default().borders(Borders::ALL).title("Checks"));
    let mut table_state = TableState::default();
    if !state.results.is_empty() {
        table_state.select(Some(state.selected));
    }
    frame.render_stateful_widget(table, chunks[1], &mut table_state);

    frame.render_widget(
        Paragraph::new(output.to_string())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Output")),
        chunks[2],
    );

    let footer = match &state.status {
        Some(status) => Paragraph::new(status.clone()).style(level_style(Level::Error)),
        None => Paragraph::new(dashboard_controls_legend()),
    };
    frame.render_widget(footer, chunks[3]);
}

/// Renders one frame off-screen and returns it as text, one line per row.
pub fn render_dashboard(
    state: &DashboardState,
    output: &str,
    width: u16,
    height: u16,
) -> Result<String, DashError> {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).map_err(|e| DashError::Terminal(e.to_string()))?;
    terminal
        .draw(|frame| draw_dashboard(frame, state, output))
        .map_err(|e| DashError::Terminal(e.to_string()))?;

    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in 0..height {
        for x in 0..width {
            out.push_str(buffer[(x, y)].symbol());
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{first_line, render_dashboard};
    use crate::config::{DashConfig, TaskSpec};
    use crate::dashboard::DashboardState;
    use crate::types::{ExecutionResult, Phase, Viewport};

    fn state() -> DashboardState {
        let config = DashConfig {
            tasks: vec![
                TaskSpec {
                    name: "disk space".to_string(),
                    command: "df".to_string(),
                    ..TaskSpec::default()
                },
                TaskSpec {
                    name: "ntp drift".to_string(),
                    command: "chronyc".to_string(),
                    ..TaskSpec::default()
                },
            ],
            ..DashConfig::default()
        };
        DashboardState::new(
            config,
            vec![
                ExecutionResult::info("\n42% used\n", "42% used"),
                ExecutionResult::critical("exit status 1", "chronyc: not found"),
            ],
            Viewport {
                width: 100,
                height: 24,
            },
        )
    }

    #[test]
    fn first_line_skips_blank_leading_lines() {
        assert_eq!(first_line("\n  \nhello\nworld"), "hello");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn frame_shows_counts_rows_and_legend() {
        let frame = render_dashboard(&state(), "", 100, 24).expect("render");
        assert!(frame.contains("tasks=2"));
        assert!(frame.contains("critical=1"));
        assert!(frame.contains("disk space"));
        assert!(frame.contains("42% used"));
        assert!(frame.contains("chronyc: not found"));
        assert!(frame.contains("Keys: q quit"));
        assert!(frame.contains("idle"));
    }

    #[test]
    fn status_replaces_legend_and_output_is_shown() {
        let mut s = state();
        s.status = Some("action failed: exit status 3".to_string());
        s.phase = Phase::Reloading;
        let frame = render_dashboard(&s, "explained text", 100, 24).expect("render");
        assert!(frame.contains("action failed: exit status 3"));
        assert!(!frame.contains("Keys: q quit"));
        assert!(frame.contains("explained text"));
        assert!(frame.contains("reloading"));
    }

    #[test]
    fn narrow_terminals_render_without_panicking() {
        let frame = render_dashboard(&state(), "", 20, 12).expect("render");
        assert_eq!(frame.lines().count(), 12);
    }
}
