//! Reader settings and theme palettes

use core::fmt;

/// Smallest selectable font size in px
pub const MIN_FONT_SIZE: u8 = 12;
/// Largest selectable font size in px
pub const MAX_FONT_SIZE: u8 = 24;
/// Smallest line height multiplier
pub const MIN_LINE_HEIGHT: f32 = 1.2;
/// Largest line height multiplier
pub const MAX_LINE_HEIGHT: f32 = 2.0;

/// Colour theme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Theme {
    /// Dark text on white
    #[default]
    Light,
    /// Light text on near-black
    Dark,
    /// Brown text on paper
    Sepia,
    /// White on black
    HighContrast,
    /// Follows the system colour scheme (light or dark)
    Auto,
}

/// Body font family
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FontFamily {
    /// Generic serif
    #[default]
    Serif,
    /// Generic sans-serif
    SansSerif,
    /// Generic monospace
    Monospace,
}

/// Two-page spread mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SpreadMode {
    /// Always a single page
    #[default]
    None,
    /// Two pages side by side when the viewport is wide enough
    Auto,
}

/// Page flow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ViewMode {
    /// Discrete pages
    #[default]
    Paginated,
    /// One continuous page per section
    Scrolled,
}

/// Background and text colour pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    /// CSS background colour
    pub background: &'static str,
    /// CSS text colour
    pub foreground: &'static str,
}

impl Theme {
    /// Concrete theme after resolving `Auto` against the system preference
    pub fn effective(self, system_dark: bool) -> Theme {
        match self {
            Theme::Auto if system_dark => Theme::Dark,
            Theme::Auto => Theme::Light,
            other => other,
        }
    }

    /// Colours applied to the page body
    pub fn palette(self, system_dark: bool) -> Palette {
        let (background, foreground) = match self.effective(system_dark) {
            Theme::Dark => ("#1a1a1a", "#e5e5e5"),
            Theme::Sepia => ("#f4ecd8", "#5c4b37"),
            Theme::HighContrast => ("#000000", "#ffffff"),
            _ => ("#ffffff", "#1a1a1a"),
        };
        Palette {
            background,
            foreground,
        }
    }
}

impl FontFamily {
    /// CSS generic family name
    pub fn css_name(self) -> &'static str {
        match self {
            FontFamily::Serif => "serif",
            FontFamily::SansSerif => "sans-serif",
            FontFamily::Monospace => "monospace",
        }
    }

    /// Average glyph advance as a fraction of the font size
    pub(crate) fn advance_ratio(self) -> f32 {
        match self {
            FontFamily::Serif => 0.5,
            FontFamily::SansSerif => 0.52,
            FontFamily::Monospace => 0.6,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Sepia => "sepia",
            Theme::HighContrast => "high-contrast",
            Theme::Auto => "auto",
        })
    }
}

/// Visual and typographic settings applied to the live render
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderSettings {
    /// Colour theme
    pub theme: Theme,
    /// Font size in px, within `MIN_FONT_SIZE..=MAX_FONT_SIZE`
    pub font_size: u8,
    /// Body font
    pub font_family: FontFamily,
    /// Line height multiplier, within `MIN_LINE_HEIGHT..=MAX_LINE_HEIGHT`
    pub line_height: f32,
    /// Two-page spread mode
    pub spread: SpreadMode,
    /// Paginated or scrolled flow
    pub view_mode: ViewMode,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size: 16,
            font_family: FontFamily::Serif,
            line_height: 1.6,
            spread: SpreadMode::None,
            view_mode: ViewMode::Paginated,
        }
    }
}

/// Partial settings update; `None` fields keep their current value
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SettingsPatch {
    /// New theme
    pub theme: Option<Theme>,
    /// New font size (clamped)
    pub font_size: Option<u8>,
    /// New font family
    pub font_family: Option<FontFamily>,
    /// New line height (clamped, rounded to one decimal)
    pub line_height: Option<f32>,
    /// New spread mode
    pub spread: Option<SpreadMode>,
    /// New view mode
    pub view_mode: Option<ViewMode>,
}

impl ReaderSettings {
    /// Settings with `patch` applied and numeric fields brought into range
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let line_height = patch.line_height.unwrap_or(self.line_height);
        let line_height = if line_height.is_finite() {
            ((line_height * 10.0).round() / 10.0).clamp(MIN_LINE_HEIGHT, MAX_LINE_HEIGHT)
        } else {
            self.line_height
        };
        Self {
            theme: patch.theme.unwrap_or(self.theme),
            font_size: patch
                .font_size
                .unwrap_or(self.font_size)
                .clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
            font_family: patch.font_family.unwrap_or(self.font_family),
            line_height,
            spread: patch.spread.unwrap_or(self.spread),
            view_mode: patch.view_mode.unwrap_or(self.view_mode),
        }
    }

    /// Body style rules as `(property, value)` pairs
    pub fn body_rules(&self, system_dark: bool) -> Vec<(&'static str, String)> {
        let palette = self.theme.palette(system_dark);
        vec![
            ("background", palette.background.to_string()),
            ("color", palette.foreground.to_string()),
            ("font-size", format!("{}px", self.font_size)),
            ("font-family", self.font_family.css_name().to_string()),
            ("line-height", format!("{}", self.line_height)),
        ]
    }
}
