//! Host-facing state definitions
//!
//! The surrounding widget owns media-session detection and window chrome. It
//! hands the visualizer a playback state, a track identifier, a visibility
//! flag and an accent color through [`HostInputs`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Playback state reported by the host media session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing is playing
    #[default]
    Idle,
    /// Media is playing
    Playing,
    /// Media is paused
    Paused,
    /// The user is scrubbing through the track
    Seeking,
}

impl PlaybackState {
    /// Whether bars should move as if audio were playing
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Seeking)
    }

    /// Target opacity of the bar strip in this state
    pub fn target_opacity(self) -> f32 {
        match self {
            PlaybackState::Idle => 0.2,
            PlaybackState::Paused => 0.5,
            PlaybackState::Playing | PlaybackState::Seeking => 1.0,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Seeking => "seeking",
        };
        f.write_str(name)
    }
}

impl FromStr for PlaybackState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idle" | "stopped" => Ok(PlaybackState::Idle),
            "playing" | "play" => Ok(PlaybackState::Playing),
            "paused" | "pause" => Ok(PlaybackState::Paused),
            "seeking" | "seek" => Ok(PlaybackState::Seeking),
            other => Err(format!("unknown playback state: {other}")),
        }
    }
}

/// RGBA accent color used by the renderer when drawing bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccentColor {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    pub a: u8,
}

impl AccentColor {
    /// Opaque color from RGB components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a: channel(6)?,
            }),
            _ => None,
        }
    }

    /// Alpha channel scaled by a strip opacity in [0, 1]
    pub fn alpha_with_opacity(self, opacity: f32) -> u8 {
        (self.a as f32 * opacity.clamp(0.0, 1.0)).round() as u8
    }
}

impl Default for AccentColor {
    fn default() -> Self {
        Self::rgb(255, 255, 255)
    }
}

/// Everything the host supplies to the visualizer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostInputs {
    /// Media session state
    pub state: PlaybackState,
    /// Opaque identifier of the active track; empty means nothing is loaded
    pub track_id: String,
    /// Whether the island is currently shown
    pub visible: bool,
    /// Bar color
    pub accent: AccentColor,
}

impl HostInputs {
    /// Playback state after applying the "empty track means Idle" rule
    pub fn effective_state(&self) -> PlaybackState {
        if self.track_id.is_empty() {
            PlaybackState::Idle
        } else {
            self.state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_track_forces_idle() {
        let inputs = HostInputs {
            state: PlaybackState::Playing,
            track_id: String::new(),
            visible: true,
            accent: AccentColor::default(),
        };
        assert_eq!(inputs.effective_state(), PlaybackState::Idle);
    }

    #[test]
    fn test_playback_state_parse() {
        assert_eq!("Playing".parse::<PlaybackState>(), Ok(PlaybackState::Playing));
        assert_eq!("seek".parse::<PlaybackState>(), Ok(PlaybackState::Seeking));
        assert!("rewinding".parse::<PlaybackState>().is_err());
    }

    #[test]
    fn test_accent_from_hex() {
        assert_eq!(
            AccentColor::from_hex("#ff8000"),
            Some(AccentColor::rgb(255, 128, 0))
        );
        assert_eq!(
            AccentColor::from_hex("10203040"),
            Some(AccentColor {
                r: 0x10,
                g: 0x20,
                b: 0x30,
                a: 0x40
            })
        );
        assert_eq!(AccentColor::from_hex("#fff"), None);
        assert_eq!(AccentColor::from_hex("#gg0000"), None);
    }

    #[test]
    fn test_alpha_with_opacity() {
        let color = AccentColor::rgb(0, 0, 0);
        assert_eq!(color.alpha_with_opacity(0.5), 128);
        assert_eq!(color.alpha_with_opacity(2.0), 255);
    }
}
