//! Key input decoded into session commands.

use crate::codec::View;

/// Action requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    RateUp,
    RateDown,
    SelectView(View),
    Quit,
}

impl Command {
    /// Decode a key press. Unmapped keys yield `None`.
    pub fn from_key(key: char) -> Option<Self> {
        let command = match key {
            '\u{1b}' | 'q' | 'Q' => Command::Quit,
            'p' | 'P' | ' ' => Command::TogglePause,
            '+' | '=' => Command::RateUp,
            '-' | '_' => Command::RateDown,
            '1' => Command::SelectView(View::Source),
            '2' => Command::SelectView(View::Output),
            '3' => Command::SelectView(View::BlockTable),
            '4' => Command::SelectView(View::QuantTable),
            '5' => Command::SelectView(View::MotionTable),
            '6' => Command::SelectView(View::Variance),
            '7' => Command::SelectView(View::Prediction),
            _ => return None,
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_map() {
        assert_eq!(Command::from_key('\u{1b}'), Some(Command::Quit));
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('p'), Some(Command::TogglePause));
        assert_eq!(Command::from_key('='), Some(Command::RateUp));
        assert_eq!(Command::from_key('-'), Some(Command::RateDown));
        assert_eq!(
            Command::from_key('2'),
            Some(Command::SelectView(View::Output))
        );
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn test_every_view_has_a_key() {
        let selected: Vec<View> = ('1'..='7')
            .filter_map(Command::from_key)
            .filter_map(|c| match c {
                Command::SelectView(view) => Some(view),
                _ => None,
            })
            .collect();
        for view in View::ALL {
            assert!(selected.contains(&view), "{view} has no key");
        }
    }
}
