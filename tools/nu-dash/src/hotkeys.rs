use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub key: &'static str,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    Quit,
    Reload,
    OpenEditor,
    Explain,
    RunAction(usize),
    ShowDetails,
    ToggleFocus,
    SelectNext,
    SelectPrev,
    SelectFirst,
    SelectLast,
}

pub const DASHBOARD_BINDINGS: [HotkeyBinding; 8] = [
    HotkeyBinding {
        key: "q",
        action: "quit",
    },
    HotkeyBinding {
        key: "r",
        action: "reload",
    },
    HotkeyBinding {
        key: "e",
        action: "edit config",
    },
    HotkeyBinding {
        key: "a",
        action: "explain",
    },
    HotkeyBinding {
        key: "0-9",
        action: "run action",
    },
    HotkeyBinding {
        key: "enter",
        action: "details",
    },
    HotkeyBinding {
        key: "j/k",
        action: "move",
    },
    HotkeyBinding {
        key: "esc",
        action: "focus",
    },
];

pub fn dashboard_controls_legend() -> String {
    format_bindings("Keys: ", &DASHBOARD_BINDINGS)
}

pub fn action_for_key(key: char) -> Option<HotkeyAction> {
    match key {
        'q' => Some(HotkeyAction::Quit),
        'r' => Some(HotkeyAction::Reload),
        'e' => Some(HotkeyAction::OpenEditor),
        'a' => Some(HotkeyAction::Explain),
        'j' => Some(HotkeyAction::SelectNext),
        'k' => Some(HotkeyAction::SelectPrev),
        'g' => Some(HotkeyAction::SelectFirst),
        'G' => Some(HotkeyAction::SelectLast),
        digit @ '0'..='9' => digit
            .to_digit(10)
            .map(|n| HotkeyAction::RunAction(n as usize)),
        _ => None,
    }
}

/// Maps a terminal key event, including the non-character keys, to an action.
/// Key releases are ignored so Windows terminals do not double-fire.
pub fn action_for_key_event(event: &KeyEvent) -> Option<HotkeyAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(HotkeyAction::Quit)
        }
        KeyCode::Char(_) if event.modifiers.contains(KeyModifiers::CONTROL) => None,
        KeyCode::Char(key) => action_for_key(key),
        KeyCode::Enter => Some(HotkeyAction::ShowDetails),
        KeyCode::Esc => Some(HotkeyAction::ToggleFocus),
        KeyCode::Down => Some(HotkeyAction::SelectNext),
        KeyCode::Up => Some(HotkeyAction::SelectPrev),
        KeyCode::Home => Some(HotkeyAction::SelectFirst),
        KeyCode::End => Some(HotkeyAction::SelectLast),
        _ => None,
    }
}

fn format_bindings(prefix: &str, bindings: &[HotkeyBinding]) -> String {
    let parts = bindings
        .iter()
        .map(|binding| format!("{} {}", binding.key, binding.action))
        .collect::<Vec<_>>();
    format!("{prefix}{}", parts.join("  "))
}

#[cfg(test)]
mod tests {
    use super::{action_for_key, action_for_key_event, dashboard_controls_legend, HotkeyAction};
    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

    #[test]
    fn digits_select_zero_based_actions() {
        assert_eq!(action_for_key('0'), Some(HotkeyAction::RunAction(0)));
        assert_eq!(action_for_key('9'), Some(HotkeyAction::RunAction(9)));
        assert_eq!(action_for_key('x'), None);
    }

    #[test]
    fn control_c_quits_but_other_control_chords_do_not_map() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(action_for_key_event(&ctrl_c), Some(HotkeyAction::Quit));
        let ctrl_r = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert_eq!(action_for_key_event(&ctrl_r), None);
    }

    #[test]
    fn releases_are_ignored() {
        let mut release = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(action_for_key_event(&release), None);
    }

    #[test]
    fn legend_lists_core_keys() {
        let legend = dashboard_controls_legend();
        assert!(legend.starts_with("Keys: "));
        assert!(legend.contains("q quit"));
        assert!(legend.contains("0-9 run action"));
    }
}
