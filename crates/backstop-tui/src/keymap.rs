use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub(crate) fn is_back(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Esc)
}

pub(crate) fn is_confirm(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Enter)
}

pub(crate) fn is_up(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Up | KeyCode::Char('k'))
}

pub(crate) fn is_down(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Down | KeyCode::Char('j'))
}

pub(crate) fn is_toggle(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char(' '))
}

pub(crate) fn is_quit(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q'))
}

pub(crate) fn is_switch_side(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Tab | KeyCode::BackTab)
}

pub(crate) fn is_filter(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('/'))
}

/// A bare letter shortcut; modified presses never match.
pub(crate) fn is_char(key: KeyEvent, letter: char) -> bool {
    key.code == KeyCode::Char(letter)
        && !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

pub(crate) fn is_ctrl_c(key: KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::{
        is_back, is_char, is_confirm, is_ctrl_c, is_down, is_filter, is_quit, is_switch_side,
        is_toggle, is_up,
    };

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn movement_matches_arrows_and_vim() {
        assert!(is_up(key(KeyCode::Up)));
        assert!(is_up(key(KeyCode::Char('k'))));
        assert!(is_down(key(KeyCode::Down)));
        assert!(is_down(key(KeyCode::Char('j'))));
        assert!(!is_up(key(KeyCode::Char('j'))));
    }

    #[test]
    fn confirm_back_toggle_and_quit_keys() {
        assert!(is_confirm(key(KeyCode::Enter)));
        assert!(is_back(key(KeyCode::Esc)));
        assert!(is_toggle(key(KeyCode::Char(' '))));
        assert!(is_quit(key(KeyCode::Char('q'))));
        assert!(!is_back(key(KeyCode::Enter)));
    }

    #[test]
    fn side_switch_and_filter_keys() {
        assert!(is_switch_side(key(KeyCode::Tab)));
        assert!(is_switch_side(key(KeyCode::BackTab)));
        assert!(is_filter(key(KeyCode::Char('/'))));
        assert!(!is_filter(key(KeyCode::Char('f'))));
    }

    #[test]
    fn letter_shortcuts_ignore_control_presses() {
        assert!(is_char(key(KeyCode::Char('s')), 's'));
        assert!(!is_char(
            KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL),
            's'
        ));
        assert!(is_ctrl_c(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL
        )));
        assert!(!is_ctrl_c(key(KeyCode::Char('c'))));
    }
}
