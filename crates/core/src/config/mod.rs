use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, Result};

/// Top-level configuration for one sound button. Everything except the clip
/// identity is fixed for the lifetime of a coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    pub clip: ClipIdentity,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl ButtonConfig {
    /// Builds a configuration for `clip` using default appearance and timing.
    pub fn new(clip: ClipIdentity) -> Self {
        Self {
            clip,
            appearance: Appearance::default(),
            timing: TimingConfig::default(),
        }
    }

    /// Parses a JSON document into a configuration and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the animation loops cannot work with.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        self.clip.validate()?;
        self.appearance.validate()?;
        self.timing.validate()
    }
}

/// The (url, format) pair identifying an audio resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipIdentity {
    pub url: String,
    pub format: String,
}

impl ClipIdentity {
    pub fn new(url: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: format.into(),
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::EmptyUrl);
        }
        if self.format.trim().is_empty() {
            return Err(ConfigurationError::EmptyFormat);
        }
        Ok(())
    }
}

impl fmt::Display for ClipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.format)
    }
}

/// Numeric visual parameters the core needs to derive geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    /// Outer diameter of the button.
    pub size: f32,
    /// Stroke width of the progress circle.
    pub progress_circle_width: f32,
    pub palette: Palette,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            size: 60.0,
            progress_circle_width: 4.0,
            palette: Palette::default(),
        }
    }
}

impl Appearance {
    fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(ConfigurationError::InvalidSize(self.size));
        }
        let width = self.progress_circle_width;
        if !width.is_finite() || width < 0.0 || width * 2.0 >= self.size {
            return Err(ConfigurationError::InvalidStrokeWidth {
                width,
                size: self.size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub icon: Color,
    pub progress: Color,
    pub progress_track: Color,
    pub background: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            icon: Color::rgb(0xff, 0xff, 0xff),
            progress: Color::rgb(0x1d, 0xb9, 0x54),
            progress_track: Color::rgb(0x3a, 0x3a, 0x3a),
            background: Color::rgb(0x12, 0x12, 0x12),
        }
    }
}

/// RGBA color stored as 8-bit channels and serialised as a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    /// Formats the color as `#rrggbb`, or `#rrggbbaa` when translucent.
    pub fn to_hex(&self) -> String {
        if self.a == 0xff {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidColor(value.to_string());
        let hex = value.strip_prefix('#').ok_or_else(invalid)?;
        if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |index: usize| {
            u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).map_err(|_| invalid())
        };
        let a = if hex.len() == 8 { channel(3)? } else { 0xff };
        Ok(Self {
            r: channel(0)?,
            g: channel(1)?,
            b: channel(2)?,
            a,
        })
    }
}

impl TryFrom<String> for Color {
    type Error = ConfigurationError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}

/// Durations in milliseconds, kept as plain numbers so that negative or
/// non-finite input reaches [`ButtonConfig::validate`] instead of failing
/// inside the deserialiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub icon_animation_ms: f64,
    pub fade_in_ms: f64,
    pub fade_out_ms: f64,
    /// How long a load may stay pending before the clip is reported as
    /// unavailable. `None` waits forever.
    pub load_timeout_ms: Option<f64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            icon_animation_ms: 450.0,
            fade_in_ms: 0.0,
            fade_out_ms: 300.0,
            load_timeout_ms: Some(10_000.0),
        }
    }
}

impl TimingConfig {
    pub fn icon_animation(&self) -> Duration {
        millis(self.icon_animation_ms)
    }

    pub fn fade_in(&self) -> Duration {
        millis(self.fade_in_ms)
    }

    pub fn fade_out(&self) -> Duration {
        millis(self.fade_out_ms)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(millis)
    }

    fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let mut fields = vec![
            ("icon_animation_ms", self.icon_animation_ms),
            ("fade_in_ms", self.fade_in_ms),
            ("fade_out_ms", self.fade_out_ms),
        ];
        if let Some(timeout) = self.load_timeout_ms {
            fields.push(("load_timeout_ms", timeout));
        }
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidDuration { field, value });
            }
        }
        Ok(())
    }
}

fn millis(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}
