use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::camera::CameraPreset;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            Some(Self::Character(ch.to_ascii_uppercase()))
        } else if ch.is_ascii_digit() {
            Some(Self::Digit(ch as u8 - b'0'))
        } else if ch.is_ascii_punctuation() {
            Some(Self::Character(ch))
        } else {
            None
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Escape" | "Esc" => Escape,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Named keys the flyover controls care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Escape,
    LeftShift,
    RightShift,
}

/// Logical commands understood by the motion controller and the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Up,
    Forward,
    Left,
    Back,
    Right,
    Down,
    RollLeft,
    RollRight,
    ToggleLook,
    ResetToOrigin,
    Preset(CameraPreset),
    SpeedDown,
    SpeedUp,
    ToggleDepthView,
}

impl Action {
    /// Parses the names accepted on the command line, e.g. `forward` or `roll-left`.
    pub fn from_name(name: &str) -> Option<Self> {
        let action = match name.to_ascii_lowercase().as_str() {
            "up" => Self::Up,
            "forward" => Self::Forward,
            "left" => Self::Left,
            "back" => Self::Back,
            "right" => Self::Right,
            "down" => Self::Down,
            "roll-left" => Self::RollLeft,
            "roll-right" => Self::RollRight,
            "toggle-look" => Self::ToggleLook,
            "reset" => Self::ResetToOrigin,
            "front" => Self::Preset(CameraPreset::Front),
            "from-right" => Self::Preset(CameraPreset::Right),
            "rear" => Self::Preset(CameraPreset::Rear),
            "from-left" => Self::Preset(CameraPreset::Left),
            "slower" => Self::SpeedDown,
            "faster" => Self::SpeedUp,
            "depth-view" => Self::ToggleDepthView,
            _ => return None,
        };
        Some(action)
    }

    /// Actions that fire once per press rather than while held.
    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            Self::ToggleLook
                | Self::ResetToOrigin
                | Self::Preset(_)
                | Self::SpeedDown
                | Self::SpeedUp
                | Self::ToggleDepthView
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Forward => "forward",
            Self::Left => "left",
            Self::Back => "back",
            Self::Right => "right",
            Self::Down => "down",
            Self::RollLeft => "roll-left",
            Self::RollRight => "roll-right",
            Self::ToggleLook => "toggle-look",
            Self::ResetToOrigin => "reset",
            Self::Preset(CameraPreset::Front) => "front",
            Self::Preset(CameraPreset::Right) => "from-right",
            Self::Preset(CameraPreset::Rear) => "rear",
            Self::Preset(CameraPreset::Left) => "from-left",
            Self::SpeedDown => "slower",
            Self::SpeedUp => "faster",
            Self::ToggleDepthView => "depth-view",
        };
        f.write_str(name)
    }
}

/// Maps keys onto actions one-to-one.
#[derive(Debug, Clone)]
pub struct ActionBindings {
    keys: HashMap<KeyCode, Action>,
}

impl Default for ActionBindings {
    fn default() -> Self {
        let mut bindings = Self {
            keys: HashMap::new(),
        };
        let defaults = [
            ("Space", Action::Up),
            ("W", Action::Forward),
            ("A", Action::Left),
            ("S", Action::Back),
            ("D", Action::Right),
            ("Z", Action::Down),
            (",", Action::RollLeft),
            (".", Action::RollRight),
            ("F", Action::ToggleLook),
            ("R", Action::ResetToOrigin),
            ("O", Action::SpeedDown),
            ("P", Action::SpeedUp),
            ("Q", Action::ToggleDepthView),
        ];
        for (name, action) in defaults {
            if let Some(key) = KeyCode::from_name(name) {
                bindings.bind(key, action);
            }
        }
        // Number row 1-4 jumps to the presets in order.
        for (digit, preset) in (1..).zip(CameraPreset::ALL) {
            bindings.bind(KeyCode::Digit(digit), Action::Preset(preset));
        }
        bindings
    }
}

impl ActionBindings {
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Binds `key` to `action`, replacing any previous binding for the key.
    pub fn bind(&mut self, key: KeyCode, action: Action) -> Option<Action> {
        self.keys.insert(key, action)
    }

    pub fn action_for(&self, key: KeyCode) -> Option<Action> {
        self.keys.get(&key).copied()
    }

    /// Keys currently bound to `action`, in no particular order.
    pub fn keys_for(&self, action: Action) -> impl Iterator<Item = KeyCode> + '_ {
        self.keys
            .iter()
            .filter(move |(_, bound)| **bound == action)
            .map(|(key, _)| *key)
    }
}
