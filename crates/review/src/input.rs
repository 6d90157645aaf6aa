//! Keyboard shortcuts, resolved once at the top of the input path.
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
    };
    pub const SHIFT: Self = Self {
        shift: true,
        ctrl: false,
        alt: false,
    };
    pub const CTRL: Self = Self {
        shift: false,
        ctrl: true,
        alt: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    // Playback
    TogglePlay,
    StepBackward,
    StepForward,
    FastForward,
    Rewind,

    // Annotation
    CommitAnnotation,
    ClearHighlight,

    // Navigation
    NextObservation,
    PrevObservation,
}

#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: HashMap<(Modifiers, Key), Command>,
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut map = Self {
            bindings: HashMap::new(),
        };
        map.bind(Modifiers::NONE, Key::Space, Command::TogglePlay);
        map.bind(Modifiers::NONE, Key::ArrowLeft, Command::StepBackward);
        map.bind(Modifiers::NONE, Key::ArrowRight, Command::StepForward);
        map.bind(Modifiers::SHIFT, Key::ArrowRight, Command::FastForward);
        map.bind(Modifiers::SHIFT, Key::ArrowLeft, Command::Rewind);
        map.bind(Modifiers::CTRL, Key::Char('s'), Command::CommitAnnotation);
        map.bind(Modifiers::NONE, Key::Escape, Command::ClearHighlight);
        map.bind(Modifiers::NONE, Key::Char('n'), Command::NextObservation);
        map.bind(Modifiers::NONE, Key::Char('p'), Command::PrevObservation);
        map
    }
}

impl KeyMap {
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Letter keys are case-insensitive.
    pub fn bind(&mut self, modifiers: Modifiers, key: Key, command: Command) -> Option<Command> {
        self.bindings.insert((modifiers, normalize(key)), command)
    }

    pub fn lookup(&self, modifiers: Modifiers, key: Key) -> Option<Command> {
        self.bindings.get(&(modifiers, normalize(key))).copied()
    }
}

fn normalize(key: Key) -> Key {
    match key {
        Key::Char(c) => Key::Char(c.to_ascii_lowercase()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let map = KeyMap::default();
        assert_eq!(map.lookup(Modifiers::NONE, Key::Space), Some(Command::TogglePlay));
        assert_eq!(
            map.lookup(Modifiers::SHIFT, Key::ArrowRight),
            Some(Command::FastForward)
        );
        assert_eq!(
            map.lookup(Modifiers::NONE, Key::ArrowRight),
            Some(Command::StepForward)
        );
        assert_eq!(
            map.lookup(Modifiers::CTRL, Key::Char('S')),
            Some(Command::CommitAnnotation)
        );
        assert_eq!(map.lookup(Modifiers::NONE, Key::Char('s')), None);
    }

    #[test]
    fn rebinding_replaces() {
        let mut map = KeyMap::empty();
        assert_eq!(map.bind(Modifiers::NONE, Key::Char('k'), Command::TogglePlay), None);
        assert_eq!(
            map.bind(Modifiers::NONE, Key::Char('K'), Command::Rewind),
            Some(Command::TogglePlay)
        );
        assert_eq!(map.lookup(Modifiers::NONE, Key::Char('k')), Some(Command::Rewind));
    }
}
