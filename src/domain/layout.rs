//! Page geometry: viewport presets, paging policies and unit conversion.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Millimetres per CSS pixel at 96 DPI.
pub const PX_TO_MM: f64 = 0.264583;
pub const MM_PER_INCH: f64 = 25.4;

pub const DEFAULT_PAGE_WIDTH_MM: f64 = 580.0;
pub const DEFAULT_MARGIN_MM: f64 = 10.0;
pub const DEFAULT_DEVICE_SCALE: f64 = 2.0;

static CUSTOM_RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*[xX×]\s*(\d+)$").expect("resolution pattern is valid"));

/// Convert a measured CSS pixel extent into whole millimetres, rounding up so
/// content is never clipped.
pub fn px_to_mm(px: f64) -> u32 {
    let mm = (px.max(0.0) * PX_TO_MM).ceil();
    mm.min(f64::from(u32::MAX)) as u32
}

/// Viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Resolution = Resolution::new(1920, 1080);
    pub const QHD: Resolution = Resolution::new(2560, 1440);
    pub const UHD: Resolution = Resolution::new(3840, 2160);

    pub const PRESETS: [(&'static str, Resolution); 3] =
        [("1K", Self::HD), ("2K", Self::QHD), ("4K", Self::UHD)];

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn preset(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::PRESETS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, resolution)| *resolution)
    }

    /// Build a resolution from explicit dimensions, rejecting zero sizes.
    pub fn custom(width: u32, height: u32) -> Result<Self, DomainError> {
        if width == 0 || height == 0 {
            return Err(DomainError::validation(
                "resolution",
                "width and height must be greater than zero",
            ));
        }
        Ok(Self::new(width, height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = DomainError;

    /// Accepts a preset key (`1K`, `2K`, `4K`) or a custom `WIDTHxHEIGHT`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(preset) = Self::preset(value) {
            return Ok(preset);
        }

        let trimmed = value.trim();
        let captures = CUSTOM_RESOLUTION.captures(trimmed).ok_or_else(|| {
            DomainError::validation(
                "resolution",
                format!("`{trimmed}` is neither a preset (1K, 2K, 4K) nor WIDTHxHEIGHT"),
            )
        })?;

        let parse = |index: usize| -> Result<u32, DomainError> {
            captures[index].parse::<u32>().map_err(|err| {
                DomainError::validation("resolution", format!("`{trimmed}`: {err}"))
            })
        };
        Self::custom(parse(1)?, parse(2)?)
    }
}

/// Named paper sizes understood by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
}

impl PaperFormat {
    pub const ALL: [PaperFormat; 11] = [
        PaperFormat::Letter,
        PaperFormat::Legal,
        PaperFormat::Tabloid,
        PaperFormat::Ledger,
        PaperFormat::A0,
        PaperFormat::A1,
        PaperFormat::A2,
        PaperFormat::A3,
        PaperFormat::A4,
        PaperFormat::A5,
        PaperFormat::A6,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaperFormat::Letter => "Letter",
            PaperFormat::Legal => "Legal",
            PaperFormat::Tabloid => "Tabloid",
            PaperFormat::Ledger => "Ledger",
            PaperFormat::A0 => "A0",
            PaperFormat::A1 => "A1",
            PaperFormat::A2 => "A2",
            PaperFormat::A3 => "A3",
            PaperFormat::A4 => "A4",
            PaperFormat::A5 => "A5",
            PaperFormat::A6 => "A6",
        }
    }

    /// Width and height in inches.
    pub fn size_in(self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::A6 => (4.13, 5.83),
        }
    }
}

impl fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperFormat {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        PaperFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                DomainError::validation("format", format!("unknown paper format `{trimmed}`"))
            })
    }
}

/// How rendered content is split into pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PagingMode {
    /// One page whose height follows the measured content height.
    SinglePageFit { page_width_mm: f64 },
    /// Standard paper size with the engine's CSS pagination.
    FixedFormat(PaperFormat),
}

impl PagingMode {
    pub fn single_page(page_width_mm: f64) -> Result<Self, DomainError> {
        if !page_width_mm.is_finite() || page_width_mm <= 0.0 {
            return Err(DomainError::validation(
                "pageWidth",
                "page width must be a positive number of millimetres",
            ));
        }
        Ok(Self::SinglePageFit { page_width_mm })
    }

    /// Width used to constrain the content column while measuring.
    pub fn content_width_mm(&self) -> f64 {
        match self {
            PagingMode::SinglePageFit { page_width_mm } => *page_width_mm,
            PagingMode::FixedFormat(_) => DEFAULT_PAGE_WIDTH_MM,
        }
    }
}

impl Default for PagingMode {
    fn default() -> Self {
        PagingMode::FixedFormat(PaperFormat::A4)
    }
}
