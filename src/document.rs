//! Per-community configuration documents.
//!
//! An [`AutomodConfig`] describes everything the moderation front end needs
//! for one community: which filters run, which sanctions apply on a match,
//! who is exempt, and where to post log notices.
//!
//! # Decoding is total
//!
//! Dashboards write these documents over HTTP and older dashboards write
//! older shapes, so decoding never rejects a document. Every optional
//! feature decodes through [`Feature`]: a missing sub-document, an
//! `enabled: false` flag, a wrong-typed value, or malformed parameters all
//! come out as [`Feature::Disabled`]. Downstream code matches on the variant
//! and never re-checks field presence.
//!
//! ```json
//! {
//!   "enabled": true,
//!   "filters": {
//!     "links": { "enabled": true },
//!     "caps": { "enabled": true, "minLength": 10, "percent": 70 }
//!   },
//!   "actions": {
//!     "delete": true,
//!     "timeout": { "enabled": true, "duration": 600 }
//!   },
//!   "exceptions": { "users": [], "channels": [], "roles": ["mod"] },
//!   "logs": { "channelId": "123" }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A feature that is either switched off or carries its parameters.
///
/// `Disabled` is the decode result for *anything* that is not an object with
/// a truthy `enabled` flag (or a bare `true`, the shorthand older dashboards
/// send for parameterless actions).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Feature<T> {
    #[default]
    Disabled,
    Enabled(T),
}

impl<T> Feature<T> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Feature::Enabled(_))
    }

    /// Parameters when enabled, `None` otherwise.
    pub fn params(&self) -> Option<&T> {
        match self {
            Feature::Disabled => None,
            Feature::Enabled(params) => Some(params),
        }
    }
}

impl<T: DeserializeOwned> Feature<T> {
    /// Decode from raw JSON. Never fails; see the module docs.
    pub fn from_value(value: &Value) -> Self {
        let object = match value {
            // Bare `true` means enabled with default parameters.
            Value::Bool(true) => Value::Object(Map::new()),
            Value::Object(_) => {
                let enabled = value
                    .get("enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if !enabled {
                    return Feature::Disabled;
                }
                value.clone()
            }
            _ => return Feature::Disabled,
        };

        match serde_json::from_value(object) {
            Ok(params) => Feature::Enabled(params),
            Err(_) => Feature::Disabled,
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Feature<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Feature::from_value(&value))
    }
}

impl<T: Serialize> Serialize for Feature<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Feature::Disabled => {
                let mut map = Map::new();
                map.insert("enabled".to_string(), Value::Bool(false));
                Value::Object(map).serialize(serializer)
            }
            Feature::Enabled(params) => {
                let mut value =
                    serde_json::to_value(params).map_err(serde::ser::Error::custom)?;
                if let Value::Object(map) = &mut value {
                    map.insert("enabled".to_string(), Value::Bool(true));
                }
                value.serialize(serializer)
            }
        }
    }
}

/// The full per-community moderation document.
///
/// The default document is fully disabled; reading an unconfigured community
/// returns this rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomodConfig {
    pub enabled: bool,
    pub filters: Filters,
    pub actions: Actions,
    pub exceptions: Exceptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogSink>,
}

impl AutomodConfig {
    /// Decode from raw JSON without ever rejecting the document.
    ///
    /// Sections that fail to decode fall back to their (disabled) defaults.
    pub fn from_value(value: &Value) -> Self {
        Self {
            enabled: value.get("enabled").and_then(Value::as_bool).unwrap_or(false),
            filters: section(value, "filters"),
            actions: section(value, "actions"),
            exceptions: section(value, "exceptions"),
            logs: value
                .get("logs")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }
}

impl<'de> Deserialize<'de> for AutomodConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(AutomodConfig::from_value(&value))
    }
}

fn section<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Message filters, one [`Feature`] per rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Filters {
    pub links: Feature<LinkFilter>,
    pub everyone: Feature<EveryoneFilter>,
    pub caps: Feature<CapsFilter>,
    pub bad_words: Feature<BadWordsFilter>,
    pub emojis: Feature<EmojiFilter>,
}

/// Link detection has no parameters beyond the switch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkFilter {}

/// Mass-mention detection (`@everyone` / `@here`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EveryoneFilter {}

/// Excessive-capitals detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapsFilter {
    /// Messages shorter than this (in characters) never trigger.
    pub min_length: usize,
    /// Minimum percentage of uppercase letters among alphabetic characters.
    pub percent: f64,
}

impl Default for CapsFilter {
    fn default() -> Self {
        Self {
            min_length: 10,
            percent: 70.0,
        }
    }
}

/// Banned-word detection, case-insensitive substring match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadWordsFilter {
    pub words: Vec<String>,
}

/// Emoji-count detection. Strictly more than `max` emoji triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiFilter {
    pub max: usize,
}

impl Default for EmojiFilter {
    fn default() -> Self {
        Self { max: 5 }
    }
}

/// Sanction actions, one [`Feature`] per action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Actions {
    pub delete: Feature<DeleteAction>,
    pub warn: Feature<WarnAction>,
    pub timeout: Feature<TimeoutAction>,
    pub kick: Feature<KickAction>,
    pub ban: Feature<BanAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteAction {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarnAction {
    /// Optional custom warning text; the default names the violated rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutAction {
    /// Timeout duration in seconds.
    pub duration: u64,
}

impl Default for TimeoutAction {
    fn default() -> Self {
        Self { duration: 600 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KickAction {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BanAction {}

/// Exempt identities. Matched in order: users, channels, roles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exceptions {
    pub users: Vec<String>,
    pub channels: Vec<String>,
    pub roles: Vec<String>,
}

/// Where enforcement notices get posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSink {
    pub channel_id: String,
}
