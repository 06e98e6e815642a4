//! User settings entities
//!
//! The backend stores settings as free-form key/value pairs. The client keeps
//! them as a map and offers a typed view over the well-known keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settings keyed by name
pub type SettingsMap = BTreeMap<String, Value>;

/// Longest key the backend accepts
pub const MAX_KEY_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: Value,
}

/// Body of `GET /api/settings`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsResponse {
    #[serde(default)]
    pub settings: Vec<SettingEntry>,
}

impl SettingsResponse {
    /// Convert `[{key, value}]` into a map. Later duplicates win.
    pub fn into_map(self) -> SettingsMap {
        self.settings
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect()
    }
}

/// Body of `POST /api/settings`
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSettingRequest {
    pub key: String,
    pub value: Value,
}

impl UpdateSettingRequest {
    pub fn new(key: impl Into<String>, value: Value) -> Result<Self, String> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self { key, value })
    }
}

/// Keys must be 1..=255 characters.
pub fn validate_key(key: &str) -> Result<(), String> {
    let len = key.chars().count();
    if len == 0 || len > MAX_KEY_LEN {
        return Err(format!("Key must be 1-{} characters", MAX_KEY_LEN));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessibility {
    #[serde(default)]
    pub reduced_motion: bool,
    #[serde(default)]
    pub high_contrast: bool,
    #[serde(default)]
    pub large_text: bool,
}

/// Typed view of the well-known settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSettings {
    pub theme: Theme,
    pub accessibility: Accessibility,
    pub notifications_enabled: bool,
}

impl ServerSettings {
    pub const THEME: &'static str = "theme";
    pub const ACCESSIBILITY: &'static str = "accessibility";
    pub const NOTIFICATIONS: &'static str = "notificationsEnabled";

    /// Missing or malformed values fall back to defaults.
    pub fn from_map(map: &SettingsMap) -> Self {
        fn read<T: serde::de::DeserializeOwned + Default>(map: &SettingsMap, key: &str) -> T {
            map.get(key)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        }

        Self {
            theme: read(map, Self::THEME),
            accessibility: read(map, Self::ACCESSIBILITY),
            notifications_enabled: read(map, Self::NOTIFICATIONS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_entry_list() {
        let resp: SettingsResponse = serde_json::from_value(json!({
            "settings": [
                {"key": "theme", "value": "dark"},
                {"key": "volume", "value": 7},
                {"key": "theme", "value": "light"}
            ]
        }))
        .unwrap();
        let map = resp.into_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["theme"], json!("light"));
        assert_eq!(map["volume"], json!(7));
    }

    #[test]
    fn missing_settings_field_is_empty() {
        let resp: SettingsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.into_map().is_empty());
    }

    #[test]
    fn typed_view_defaults() {
        let settings = ServerSettings::from_map(&SettingsMap::new());
        assert_eq!(settings.theme, Theme::System);
        assert_eq!(settings.accessibility, Accessibility::default());
        assert!(!settings.notifications_enabled);
    }

    #[test]
    fn typed_view_reads_known_keys() {
        let mut map = SettingsMap::new();
        map.insert("theme".into(), json!("dark"));
        map.insert(
            "accessibility".into(),
            json!({"reducedMotion": true, "largeText": true}),
        );
        map.insert("notificationsEnabled".into(), json!(true));

        let settings = ServerSettings::from_map(&map);
        assert_eq!(settings.theme, Theme::Dark);
        assert!(settings.accessibility.reduced_motion);
        assert!(!settings.accessibility.high_contrast);
        assert!(settings.accessibility.large_text);
        assert!(settings.notifications_enabled);
    }

    #[test]
    fn malformed_theme_falls_back() {
        let mut map = SettingsMap::new();
        map.insert("theme".into(), json!("sepia"));
        assert_eq!(ServerSettings::from_map(&map).theme, Theme::System);
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("theme").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(&"k".repeat(255)).is_ok());
        assert!(validate_key(&"k".repeat(256)).is_err());
        assert!(UpdateSettingRequest::new("", json!(1)).is_err());
    }
}
