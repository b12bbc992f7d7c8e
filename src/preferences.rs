//! User preferences consulted by the frame manager.
//!
//! [`Preferences`] is a plain value with builder-style setters. The manager
//! never caches it: every operation asks its [`PreferenceStore`] for the
//! current value, so toggling haptics or the album setting takes effect on
//! the next call.
//!
//! # Example
//!
//! ```
//! use framemark::{MemoryPreferences, PreferenceStore, Preferences};
//!
//! let store = MemoryPreferences::new(
//!     Preferences::new()
//!         .with_haptics(false)
//!         .with_custom_album("  Holiday  "),
//! );
//! let current = store.preferences();
//! assert!(!current.haptics_enabled);
//! assert_eq!(current.album(), Some("Holiday"));
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::error::FrameMarkError;

/// Album used when custom albums are enabled but no usable name is set.
pub const DEFAULT_ALBUM_NAME: &str = "Frame Extractor";

/// User settings that influence the manager.
///
/// Serialized with the historical key names (`hapticFeedback`,
/// `useCustomAlbum`, `customAlbumName`, `hasSeenOnboarding`); absent keys
/// take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Fire haptic signals. Defaults to `true`.
    #[serde(rename = "hapticFeedback")]
    pub haptics_enabled: bool,
    /// Save extracted frames into a named album. Defaults to `false`.
    #[serde(rename = "useCustomAlbum")]
    pub use_custom_album: bool,
    /// Album name used when `use_custom_album` is set.
    #[serde(rename = "customAlbumName")]
    pub custom_album_name: String,
    /// Whether the first-run tutorial has been dismissed.
    #[serde(rename = "hasSeenOnboarding")]
    pub has_seen_onboarding: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            haptics_enabled: true,
            use_custom_album: false,
            custom_album_name: DEFAULT_ALBUM_NAME.to_string(),
            has_seen_onboarding: false,
        }
    }
}

impl Preferences {
    /// Preferences with every setting at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable haptic signals.
    #[must_use]
    pub fn with_haptics(mut self, enabled: bool) -> Self {
        self.haptics_enabled = enabled;
        self
    }

    /// Save into the named album. Blank names fall back to
    /// [`DEFAULT_ALBUM_NAME`].
    #[must_use]
    pub fn with_custom_album(mut self, name: impl AsRef<str>) -> Self {
        self.use_custom_album = true;
        self.custom_album_name = normalize_album_name(name.as_ref());
        self
    }

    /// Save into the default library instead of an album. The stored album
    /// name is kept for when albums are re-enabled.
    #[must_use]
    pub fn without_custom_album(mut self) -> Self {
        self.use_custom_album = false;
        self
    }

    /// Record that the tutorial has been seen.
    #[must_use]
    pub fn with_onboarding_seen(mut self, seen: bool) -> Self {
        self.has_seen_onboarding = seen;
        self
    }

    /// The album new assets should go into, or `None` for the default
    /// library.
    pub fn album(&self) -> Option<&str> {
        if !self.use_custom_album {
            return None;
        }
        let trimmed = self.custom_album_name.trim();
        Some(if trimmed.is_empty() {
            DEFAULT_ALBUM_NAME
        } else {
            trimmed
        })
    }
}

/// Trim an album name, substituting [`DEFAULT_ALBUM_NAME`] for blank input.
pub fn normalize_album_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_ALBUM_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Source of the current [`Preferences`].
///
/// Implementations must be [`Send`] and [`Sync`]; the manager reads them
/// from whichever task drives it.
pub trait PreferenceStore: Send + Sync {
    /// The current preferences. Read failures fall back to defaults.
    fn preferences(&self) -> Preferences;

    /// Replace the stored preferences.
    fn store(&self, preferences: &Preferences) -> Result<(), FrameMarkError>;
}

/// Process-local preferences.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    current: RwLock<Preferences>,
}

impl MemoryPreferences {
    /// Start from the given preferences.
    pub fn new(preferences: Preferences) -> Self {
        Self {
            current: RwLock::new(preferences),
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn preferences(&self) -> Preferences {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, preferences: &Preferences) -> Result<(), FrameMarkError> {
        match self.current.write() {
            Ok(mut guard) => *guard = preferences.clone(),
            Err(poisoned) => *poisoned.into_inner() = preferences.clone(),
        }
        Ok(())
    }
}

/// Preferences persisted as a JSON object on disk.
///
/// The file is read on every [`preferences`](PreferenceStore::preferences)
/// call. A missing file reads as defaults; writes go through a sibling
/// temporary file and a rename.
#[derive(Debug, Clone)]
pub struct JsonPreferenceFile {
    path: PathBuf,
}

impl JsonPreferenceFile {
    /// Use the file at `path`. Nothing is read or created yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file, distinguishing a missing file (defaults) from a
    /// corrupt one (error).
    pub fn load(&self) -> Result<Preferences, FrameMarkError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Preferences::default()),
            Err(error) => Err(error.into()),
        }
    }
}

impl PreferenceStore for JsonPreferenceFile {
    fn preferences(&self) -> Preferences {
        self.load().unwrap_or_else(|error| {
            log::warn!(
                "Falling back to default preferences, could not read {}: {error}",
                self.path.display()
            );
            Preferences::default()
        })
    }

    fn store(&self, preferences: &Preferences) -> Result<(), FrameMarkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(preferences)?;
        let temporary = self.path.with_extension("json.tmp");
        fs::write(&temporary, payload)?;
        fs::rename(&temporary, &self.path)?;
        log::debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }
}
