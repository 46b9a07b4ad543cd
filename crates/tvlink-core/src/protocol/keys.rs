//! Android key codes and press directions.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// An Android key code.
///
/// Parsed from a name (`HOME`, `dpad_up`, `KEYCODE_BACK`) or a raw number.
///
/// # Examples
///
/// ```
/// use tvlink_core::protocol::KeyCode;
///
/// assert_eq!("home".parse::<KeyCode>().unwrap(), KeyCode::HOME);
/// assert_eq!("KEYCODE_DPAD_UP".parse::<KeyCode>().unwrap(), KeyCode::DPAD_UP);
/// assert_eq!("85".parse::<KeyCode>().unwrap(), KeyCode::MEDIA_PLAY_PAUSE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

#[allow(missing_docs)]
impl KeyCode {
    pub const HOME: Self = Self(3);
    pub const BACK: Self = Self(4);
    pub const DPAD_UP: Self = Self(19);
    pub const DPAD_DOWN: Self = Self(20);
    pub const DPAD_LEFT: Self = Self(21);
    pub const DPAD_RIGHT: Self = Self(22);
    pub const DPAD_CENTER: Self = Self(23);
    pub const VOLUME_UP: Self = Self(24);
    pub const VOLUME_DOWN: Self = Self(25);
    pub const POWER: Self = Self(26);
    pub const SPACE: Self = Self(62);
    pub const ENTER: Self = Self(66);
    pub const DEL: Self = Self(67);
    pub const MENU: Self = Self(82);
    pub const SEARCH: Self = Self(84);
    pub const MEDIA_PLAY_PAUSE: Self = Self(85);
    pub const MEDIA_STOP: Self = Self(86);
    pub const MEDIA_NEXT: Self = Self(87);
    pub const MEDIA_PREVIOUS: Self = Self(88);
    pub const MEDIA_REWIND: Self = Self(89);
    pub const MEDIA_FAST_FORWARD: Self = Self(90);
    pub const MUTE: Self = Self(91);
    pub const PAGE_UP: Self = Self(92);
    pub const PAGE_DOWN: Self = Self(93);
    pub const MOVE_HOME: Self = Self(122);
    pub const MOVE_END: Self = Self(123);
    pub const MEDIA_PLAY: Self = Self(126);
    pub const MEDIA_PAUSE: Self = Self(127);
    pub const VOLUME_MUTE: Self = Self(164);
    pub const INFO: Self = Self(165);
    pub const CHANNEL_UP: Self = Self(166);
    pub const CHANNEL_DOWN: Self = Self(167);
    pub const GUIDE: Self = Self(172);
    pub const SETTINGS: Self = Self(176);
    pub const TV_INPUT: Self = Self(178);
    pub const CAPTIONS: Self = Self(175);
    pub const ASSIST: Self = Self(219);
    pub const SLEEP: Self = Self(223);
    pub const WAKEUP: Self = Self(224);
    pub const MEDIA_AUDIO_TRACK: Self = Self(222);
}

const NAMES: &[(&str, KeyCode)] = &[
    ("HOME", KeyCode::HOME),
    ("BACK", KeyCode::BACK),
    ("DPAD_UP", KeyCode::DPAD_UP),
    ("DPAD_DOWN", KeyCode::DPAD_DOWN),
    ("DPAD_LEFT", KeyCode::DPAD_LEFT),
    ("DPAD_RIGHT", KeyCode::DPAD_RIGHT),
    ("DPAD_CENTER", KeyCode::DPAD_CENTER),
    ("VOLUME_UP", KeyCode::VOLUME_UP),
    ("VOLUME_DOWN", KeyCode::VOLUME_DOWN),
    ("POWER", KeyCode::POWER),
    ("SPACE", KeyCode::SPACE),
    ("ENTER", KeyCode::ENTER),
    ("DEL", KeyCode::DEL),
    ("MENU", KeyCode::MENU),
    ("SEARCH", KeyCode::SEARCH),
    ("MEDIA_PLAY_PAUSE", KeyCode::MEDIA_PLAY_PAUSE),
    ("MEDIA_STOP", KeyCode::MEDIA_STOP),
    ("MEDIA_NEXT", KeyCode::MEDIA_NEXT),
    ("MEDIA_PREVIOUS", KeyCode::MEDIA_PREVIOUS),
    ("MEDIA_REWIND", KeyCode::MEDIA_REWIND),
    ("MEDIA_FAST_FORWARD", KeyCode::MEDIA_FAST_FORWARD),
    ("MUTE", KeyCode::MUTE),
    ("PAGE_UP", KeyCode::PAGE_UP),
    ("PAGE_DOWN", KeyCode::PAGE_DOWN),
    ("MOVE_HOME", KeyCode::MOVE_HOME),
    ("MOVE_END", KeyCode::MOVE_END),
    ("MEDIA_PLAY", KeyCode::MEDIA_PLAY),
    ("MEDIA_PAUSE", KeyCode::MEDIA_PAUSE),
    ("VOLUME_MUTE", KeyCode::VOLUME_MUTE),
    ("INFO", KeyCode::INFO),
    ("CHANNEL_UP", KeyCode::CHANNEL_UP),
    ("CHANNEL_DOWN", KeyCode::CHANNEL_DOWN),
    ("GUIDE", KeyCode::GUIDE),
    ("CAPTIONS", KeyCode::CAPTIONS),
    ("SETTINGS", KeyCode::SETTINGS),
    ("TV_INPUT", KeyCode::TV_INPUT),
    ("ASSIST", KeyCode::ASSIST),
    ("MEDIA_AUDIO_TRACK", KeyCode::MEDIA_AUDIO_TRACK),
    ("SLEEP", KeyCode::SLEEP),
    ("WAKEUP", KeyCode::WAKEUP),
];

impl KeyCode {
    /// Raw numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }

    /// Symbolic name, if the code is in the name table.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        NAMES.iter().find(|(_, k)| *k == self).map(|(n, _)| *n)
    }

    /// All named keys.
    pub fn named() -> impl Iterator<Item = (&'static str, Self)> {
        NAMES.iter().copied()
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "KEYCODE_{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for KeyCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(raw) = trimmed.parse::<u32>() {
            return Ok(Self(raw));
        }

        let upper = trimmed.to_uppercase();
        let name = upper.strip_prefix("KEYCODE_").unwrap_or(&upper);

        // KEYCODE_0..KEYCODE_9 are 7..16
        if let [digit @ b'0'..=b'9'] = name.as_bytes() {
            return Ok(Self(7 + u32::from(digit - b'0')));
        }

        NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, k)| *k)
            .ok_or_else(|| Error::InvalidKey(format!("unknown key '{trimmed}'")))
    }
}

/// How a key is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyDirection {
    /// Press and release
    #[default]
    Short,
    /// Begin a long press
    StartLong,
    /// End a long press
    EndLong,
}

impl KeyDirection {
    /// Protocol enum value.
    #[must_use]
    pub const fn wire_value(self) -> i64 {
        match self {
            Self::StartLong => 1,
            Self::EndLong => 2,
            Self::Short => 3,
        }
    }

    /// Decode a protocol enum value.
    #[must_use]
    pub const fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::StartLong),
            2 => Some(Self::EndLong),
            3 => Some(Self::Short),
            _ => None,
        }
    }
}

impl fmt::Display for KeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Short => "SHORT",
            Self::StartLong => "START_LONG",
            Self::EndLong => "END_LONG",
        })
    }
}

impl FromStr for KeyDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "SHORT" => Ok(Self::Short),
            "START_LONG" | "LONG" => Ok(Self::StartLong),
            "END_LONG" => Ok(Self::EndLong),
            other => Err(Error::InvalidKey(format!("unknown direction '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_prefixes() {
        assert_eq!("HOME".parse::<KeyCode>().unwrap(), KeyCode::HOME);
        assert_eq!("keycode_back".parse::<KeyCode>().unwrap(), KeyCode::BACK);
        assert_eq!(" DPAD_CENTER ".parse::<KeyCode>().unwrap(), KeyCode::DPAD_CENTER);
    }

    #[test]
    fn test_parse_digits_and_raw_codes() {
        assert_eq!("KEYCODE_0".parse::<KeyCode>().unwrap(), KeyCode(7));
        assert_eq!("9".parse::<KeyCode>().unwrap(), KeyCode(9));
        assert_eq!("KEYCODE_9".parse::<KeyCode>().unwrap(), KeyCode(16));
        assert_eq!("300".parse::<KeyCode>().unwrap(), KeyCode(300));
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            "TELEPORT".parse::<KeyCode>(),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(KeyCode::VOLUME_UP.to_string(), "KEYCODE_VOLUME_UP");
        assert_eq!(KeyCode(999).to_string(), "999");
    }

    #[test]
    fn test_direction_parse_and_wire() {
        assert_eq!("short".parse::<KeyDirection>().unwrap(), KeyDirection::Short);
        assert_eq!("long".parse::<KeyDirection>().unwrap(), KeyDirection::StartLong);
        assert_eq!(KeyDirection::Short.wire_value(), 3);
        assert_eq!(KeyDirection::from_wire(2), Some(KeyDirection::EndLong));
        assert!("sideways".parse::<KeyDirection>().is_err());
    }
}
