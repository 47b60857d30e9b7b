//! Influencer profile records and the text summaries derived from them.
//!
//! Summary `i` always describes profile `i`; every embedding matrix row and
//! index entry downstream inherits that position.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to read dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dataset {path} is not a valid profile list: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single profile record from the dataset.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub instagram: Option<SocialProfile>,
}

/// Nested social-media sub-object.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SocialProfile {
    #[serde(default)]
    pub full_name: Option<String>,

    #[serde(default)]
    pub bio: Option<String>,

    #[serde(default, deserialize_with = "lenient_count")]
    pub follows: Option<u64>,

    #[serde(default, deserialize_with = "lenient_count")]
    pub following: Option<u64>,
}

impl Profile {
    pub fn full_name(&self) -> Option<&str> {
        self.instagram.as_ref().and_then(|i| i.full_name.as_deref())
    }

    pub fn bio(&self) -> Option<&str> {
        self.instagram.as_ref().and_then(|i| i.bio.as_deref())
    }
}

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts counts as numbers or numeric strings ("12,400" included).
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    })
}

/// Load the profile dataset (a JSON array of records).
pub fn load_profiles(path: &Path) -> Result<Vec<Profile>, ProfileError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ProfileError::Io {
        path: display.clone(),
        source,
    })?;

    let profiles: Vec<Profile> =
        serde_json::from_slice(&bytes).map_err(|source| ProfileError::Malformed {
            path: display.clone(),
            source,
        })?;

    log::info!("Loaded {} profiles from {}", profiles.len(), display);
    Ok(profiles)
}

/// Build the text summary of one profile.
pub fn make_summary(profile: &Profile) -> String {
    let mut parts: Vec<String> = Vec::new();

    let name = profile.name.trim();
    if !name.is_empty() {
        parts.push(name.to_string());
    }

    if let Some(full_name) = profile.full_name().map(str::trim) {
        if !full_name.is_empty() && !full_name.eq_ignore_ascii_case(name) {
            parts.push(full_name.to_string());
        }
    }

    let state = profile.state.trim();
    if !state.is_empty() {
        parts.push(format!("Based in {state}"));
    }

    if let Some(bio) = profile.bio().map(str::trim) {
        if !bio.is_empty() {
            parts.push(bio.to_string());
        }
    }

    let tags: Vec<&str> = profile
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        parts.push(format!("Tags: {}", tags.join(", ")));
    }

    parts.join(". ")
}

pub fn make_summaries(profiles: &[Profile]) -> Vec<String> {
    profiles.iter().map(make_summary).collect()
}

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid url regex"));
static MENTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\w+").expect("valid mention regex"));

/// Lowercase, drop URLs and @mentions, keep only alphanumeric words.
pub fn clean_summary(text: &str) -> String {
    let text = text.to_lowercase();
    let text = URL_REGEX.replace_all(&text, " ");
    let text = MENTION_REGEX.replace_all(&text, " ");

    let spaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn clean_summaries(summaries: Vec<String>) -> Vec<String> {
    summaries.iter().map(|s| clean_summary(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> Profile {
        serde_json::from_value(serde_json::json!({
            "name": "lena_styles",
            "state": "Germany",
            "tags": ["fashion", "lifestyle"],
            "instagram": {
                "full_name": "Lena Weber",
                "bio": "Fashion & travel 🌍 | Berlin",
                "follows": 1200,
                "following": "340"
            },
            "unrelated": {"ignored": true}
        }))
        .unwrap()
    }

    #[test]
    fn test_deserialize_profile() {
        let profile = sample_profile();
        assert_eq!(profile.name, "lena_styles");
        assert_eq!(profile.full_name(), Some("Lena Weber"));

        let insta = profile.instagram.unwrap();
        assert_eq!(insta.follows, Some(1200));
        assert_eq!(insta.following, Some(340));
    }

    #[test]
    fn test_lenient_counts() {
        let social: SocialProfile = serde_json::from_value(serde_json::json!({
            "follows": "12,400",
            "following": "n/a"
        }))
        .unwrap();
        assert_eq!(social.follows, Some(12400));
        assert_eq!(social.following, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let profile: Profile = serde_json::from_value(serde_json::json!({
            "name": "solo",
            "tags": null
        }))
        .unwrap();
        assert_eq!(profile.state, "");
        assert!(profile.tags.is_empty());
        assert!(profile.instagram.is_none());
        assert_eq!(make_summary(&profile), "solo");
    }

    #[test]
    fn test_null_fields_default() {
        let profiles: Vec<Profile> = serde_json::from_str(
            r#"[{"name":"a","state":null,"tags":["x"]},{"name":null,"state":"UK","tags":null}]"#,
        )
        .unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].state, "");
        assert_eq!(make_summary(&profiles[0]), "a. Tags: x");
        assert_eq!(profiles[1].name, "");
        assert_eq!(make_summary(&profiles[1]), "Based in UK");
    }

    #[test]
    fn test_make_summary() {
        let summary = make_summary(&sample_profile());
        assert_eq!(
            summary,
            "lena_styles. Lena Weber. Based in Germany. Fashion & travel 🌍 | Berlin. Tags: fashion, lifestyle"
        );
    }

    #[test]
    fn test_clean_summary() {
        let cleaned = clean_summary(
            "Fashion & travel 🌍 | Berlin. Shop: https://example.com/x?y=1 @LenaShop #OOTD",
        );
        assert_eq!(cleaned, "fashion travel berlin shop ootd");
    }

    #[test]
    fn test_clean_summary_idempotent() {
        let once = clean_summary("Skin-Care TIPS, from the U.K.!");
        assert_eq!(once, "skin care tips from the u k");
        assert_eq!(clean_summary(&once), once);
    }

    #[test]
    fn test_summaries_keep_order() {
        let profiles = vec![
            Profile {
                name: "b".to_string(),
                ..Default::default()
            },
            Profile {
                name: "a".to_string(),
                ..Default::default()
            },
        ];
        let summaries = clean_summaries(make_summaries(&profiles));
        assert_eq!(summaries, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_load_profiles_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_profiles(&missing),
            Err(ProfileError::Io { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"name\": \"not a list\"}").unwrap();
        assert!(matches!(
            load_profiles(&bad),
            Err(ProfileError::Malformed { .. })
        ));
    }
}
