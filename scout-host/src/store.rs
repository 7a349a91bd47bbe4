//! Named Wi-Fi credential store.
//!
//! A JSON map of ssid → password on disk, addressable by index so the
//! operator can `join -i 2` instead of retyping credentials. Ordering is
//! stable (sorted by ssid) so indices mean the same thing across runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WifiStore {
    #[serde(flatten)]
    networks: BTreeMap<String, String>,

    #[serde(skip)]
    path: PathBuf,
}

impl WifiStore {
    /// Load the store, treating a missing or unreadable file as empty.
    pub fn load(path: &Path) -> Self {
        let mut store: WifiStore = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        store.path = path.to_path_buf();
        store
    }

    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing credential store {}", self.path.display()))
    }

    /// Insert or update a network. Returns `true` when anything changed.
    pub fn upsert(&mut self, ssid: &str, password: &str) -> bool {
        match self.networks.get(ssid) {
            Some(existing) if existing == password => false,
            _ => {
                self.networks
                    .insert(ssid.to_string(), password.to_string());
                true
            }
        }
    }

    /// Look a network up by its position in the sorted listing.
    pub fn by_index(&self, index: usize) -> Option<(&str, &str)> {
        self.networks
            .iter()
            .nth(index)
            .map(|(ssid, password)| (ssid.as_str(), password.as_str()))
    }

    /// Saved ssids in index order.
    pub fn ssids(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
