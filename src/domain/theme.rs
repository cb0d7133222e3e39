//! Closed set of document themes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

const DARK_BACKGROUND: &str = "#282c34";
const LIGHT_BACKGROUND: &str = "#ffffff";

/// A registered theme. Each theme maps to a stylesheet pair under the assets
/// `style/` directory and a dark/light classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Vue,
    #[default]
    Atom,
    Light,
    Github,
    Monokai,
    Solarized,
}

impl Theme {
    pub const ALL: [Theme; 6] = [
        Theme::Vue,
        Theme::Atom,
        Theme::Light,
        Theme::Github,
        Theme::Monokai,
        Theme::Solarized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Vue => "vue",
            Theme::Atom => "atom",
            Theme::Light => "light",
            Theme::Github => "github",
            Theme::Monokai => "monokai",
            Theme::Solarized => "solarized",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Theme::Vue => "Vue, light",
            Theme::Atom => "Atom One, dark",
            Theme::Light => "Plain light",
            Theme::Github => "GitHub, light",
            Theme::Monokai => "Monokai, dark",
            Theme::Solarized => "Solarized, dark",
        }
    }

    /// Document stylesheet file name.
    pub fn stylesheet(self) -> String {
        format!("{}.css", self.as_str())
    }

    /// Code highlighting stylesheet file name.
    pub fn highlight_stylesheet(self) -> String {
        format!("{}.min.css", self.as_str())
    }

    pub fn is_dark(self) -> bool {
        matches!(self, Theme::Atom | Theme::Monokai | Theme::Solarized)
    }

    pub fn background(self) -> &'static str {
        if self.is_dark() {
            DARK_BACKGROUND
        } else {
            LIGHT_BACKGROUND
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Theme::ALL
            .into_iter()
            .find(|theme| theme.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::validation(
                    "theme",
                    format!(
                        "unknown theme `{}`; expected one of: {}",
                        value.trim(),
                        Theme::ALL.map(Theme::as_str).join(", ")
                    ),
                )
            })
    }
}
