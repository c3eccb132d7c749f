use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// The subset of `package.toml` the resolver cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Entry file, relative to the package folder.
    pub main: Option<String>,
}

impl PackageManifest {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads the descriptor at `path`.
    ///
    /// Returns `None` when there is no descriptor. An unreadable or malformed
    /// descriptor is reported and treated as declaring nothing, so the
    /// package still falls back to its index file.
    pub fn read(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("failed to read {}: {err}", path.display());
                return Some(Self::default());
            }
        };

        match Self::parse(&text) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!("ignoring malformed {}: {err}", path.display());
                Some(Self::default())
            }
        }
    }

    /// The declared entry, ignoring blank values.
    pub fn entry(&self) -> Option<&str> {
        self.main
            .as_deref()
            .map(str::trim)
            .filter(|main| !main.is_empty())
    }
}
