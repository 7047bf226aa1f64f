use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::Screen;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    Select,
    Back,
    // Viewer actions
    NextImage,
    PreviousImage,
    ToggleAutoPlay,
    StepFrame(isize),
    ToggleScrub,
    ToggleSlideshow,
    FetchDetails,
    // Library actions
    TogglePostViewed,
    ToggleArtistViewed,
    ToggleUnviewedFilter,
    CycleSortKey,
    ToggleSortOrder,
    CyclePlatform,
    OpenExternal,
    ShowHelp,
    HideHelp,
}

pub fn handle_key_event(key: KeyEvent, screen: Screen, show_help: bool) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    if screen == Screen::Viewer {
        let action = match key.code {
            KeyCode::Char('l') | KeyCode::Right => Some(AppAction::NextImage),
            KeyCode::Char('h') | KeyCode::Left => Some(AppAction::PreviousImage),
            KeyCode::Char(' ') => Some(AppAction::ToggleAutoPlay),
            KeyCode::Char(']') => Some(AppAction::StepFrame(1)),
            KeyCode::Char('[') => Some(AppAction::StepFrame(-1)),
            KeyCode::Char('g') => Some(AppAction::ToggleScrub),
            KeyCode::Char('s') => Some(AppAction::ToggleSlideshow),
            KeyCode::Char('c') if key.modifiers != KeyModifiers::CONTROL => {
                Some(AppAction::FetchDetails)
            }
            _ => None,
        };
        if action.is_some() {
            return action;
        }
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),
        (KeyCode::Enter, _) => Some(AppAction::Select),
        (KeyCode::Esc, _) => Some(AppAction::Back),

        (KeyCode::Char('m'), _) => Some(AppAction::TogglePostViewed),
        (KeyCode::Char('M'), _) => Some(AppAction::ToggleArtistViewed),
        (KeyCode::Char('f'), _) => Some(AppAction::ToggleUnviewedFilter),
        (KeyCode::Char('o'), _) => Some(AppAction::CycleSortKey),
        (KeyCode::Char('O'), _) => Some(AppAction::ToggleSortOrder),
        (KeyCode::Tab, _) => Some(AppAction::CyclePlatform),
        (KeyCode::Char('x'), _) => Some(AppAction::OpenExternal),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}
