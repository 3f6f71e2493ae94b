//! Connection profiles: JSON mapping of profile name -> { url, zoom }.
//! Stored under $XDG_CONFIG_HOME/statwatch/profiles.json (fallback: the platform config dir).

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io, path::PathBuf};

use crate::types::Zoom;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProfileEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<Zoom>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    pub version: u32,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("statwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("statwatch")
    }
}

pub fn profiles_path() -> PathBuf {
    config_dir().join("profiles.json")
}

// A missing or unreadable file is an empty profile set.
pub fn load_profiles() -> ProfilesFile {
    match fs::read_to_string(profiles_path()) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => ProfilesFile::default(),
    }
}

pub fn save_profiles(p: &ProfilesFile) -> io::Result<()> {
    let path = profiles_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(p).map_err(io::Error::other)?;
    fs::write(path, data)
}

#[derive(Debug, PartialEq)]
pub enum ResolveProfile {
    /// Use the URL given on the command line (maybe saved by the caller).
    Direct(ProfileEntry),
    /// Loaded from an existing profile entry.
    Loaded(ProfileEntry),
    /// Ask the user to pick one of these profile names.
    PromptSelect(Vec<String>),
    /// Ask the user for the URL of a new profile with this name.
    PromptCreate(String),
    /// Nothing to connect to.
    None,
}

pub struct ProfileRequest {
    pub profile_name: Option<String>,
    pub url: Option<String>,
    pub zoom: Option<Zoom>,
}

impl ProfileRequest {
    pub fn resolve(self, pf: &ProfilesFile) -> ResolveProfile {
        match (self.url, self.profile_name) {
            (Some(url), _) => ResolveProfile::Direct(ProfileEntry {
                url,
                zoom: self.zoom,
            }),
            (None, Some(name)) => match pf.profiles.get(&name) {
                Some(entry) => {
                    let mut entry = entry.clone();
                    if self.zoom.is_some() {
                        entry.zoom = self.zoom;
                    }
                    ResolveProfile::Loaded(entry)
                }
                None => ResolveProfile::PromptCreate(name),
            },
            (None, None) if pf.profiles.is_empty() => ResolveProfile::None,
            (None, None) => ResolveProfile::PromptSelect(pf.profiles.keys().cloned().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with(name: &str, url: &str) -> ProfilesFile {
        let mut pf = ProfilesFile::default();
        pf.profiles.insert(
            name.into(),
            ProfileEntry {
                url: url.into(),
                zoom: Some(Zoom::Hour),
            },
        );
        pf
    }

    #[test]
    fn url_wins_over_profile() {
        let pf = file_with("prod", "ws://prod/ws");
        let req = ProfileRequest {
            profile_name: Some("prod".into()),
            url: Some("ws://other/ws".into()),
            zoom: None,
        };
        assert_eq!(
            req.resolve(&pf),
            ResolveProfile::Direct(ProfileEntry {
                url: "ws://other/ws".into(),
                zoom: None
            })
        );
    }

    #[test]
    fn named_profile_loads_and_zoom_overrides() {
        let pf = file_with("prod", "ws://prod/ws");
        let req = ProfileRequest {
            profile_name: Some("prod".into()),
            url: None,
            zoom: Some(Zoom::Day),
        };
        match req.resolve(&pf) {
            ResolveProfile::Loaded(e) => {
                assert_eq!(e.url, "ws://prod/ws");
                assert_eq!(e.zoom, Some(Zoom::Day));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_profile_prompts_create_and_empty_is_none() {
        let pf = ProfilesFile::default();
        let req = ProfileRequest {
            profile_name: Some("new".into()),
            url: None,
            zoom: None,
        };
        assert_eq!(req.resolve(&pf), ResolveProfile::PromptCreate("new".into()));
        let req = ProfileRequest {
            profile_name: None,
            url: None,
            zoom: None,
        };
        assert_eq!(req.resolve(&pf), ResolveProfile::None);
        let req = ProfileRequest {
            profile_name: None,
            url: None,
            zoom: None,
        };
        assert_eq!(
            req.resolve(&file_with("a", "ws://a/ws")),
            ResolveProfile::PromptSelect(vec!["a".into()])
        );
    }
}
