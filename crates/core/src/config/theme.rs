use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{render::Color, AuraluxError, Result};

/// Key under which the theme preference is stored.
pub const THEME_KEY: &str = "auralux_theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    /// Surface colour painted behind every frame.
    pub fn background(self) -> Color {
        match self {
            Theme::Dark => Color::rgb(0x0b, 0x0f, 0x17),
            Theme::Light => Color::rgb(0xe8, 0xec, 0xf2),
        }
    }

    /// The other palette.
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl FromStr for Theme {
    type Err = AuraluxError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(AuraluxError::invalid(format!("unknown theme `{other}`"))),
        }
    }
}

/// Durable key-value store holding the theme preference across sessions.
///
/// The backing file is a flat JSON object so unrelated keys written by other
/// tools survive a theme update.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    path: PathBuf,
}

impl ThemeStore {
    /// Store backed by the JSON file at `path`; nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored theme, or [`Theme::Dark`] when nothing usable is stored.
    pub fn load(&self) -> Theme {
        match self.read_entries() {
            Ok(entries) => entries
                .get(THEME_KEY)
                .and_then(|value| value.parse().ok())
                .unwrap_or_default(),
            Err(err) => {
                tracing::debug!(path = ?self.path, %err, "theme store unreadable, using dark");
                Theme::default()
            }
        }
    }

    /// Persists `theme`, keeping any other keys already in the file.
    pub fn store(&self, theme: Theme) -> Result<()> {
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(THEME_KEY.to_string(), theme.as_str().to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        tracing::info!(theme = theme.as_str(), "theme preference saved");
        Ok(())
    }

    /// Flips the stored theme and returns the new value.
    pub fn toggle(&self) -> Result<Theme> {
        let next = self.load().toggled();
        self.store(next)?;
        Ok(next)
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
