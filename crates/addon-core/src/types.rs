// # Add-on Data Model
//
// Remote catalog entries, release metadata and the locally persisted record
// for add-ons the manager installed.
//
// ## Join Key
//
// `name` identifies an add-on everywhere: it is the directory name under the
// add-on root, the line in `addons.txt` and the key in `managed_addons.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Catalog description of an installable add-on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonManifest {
    /// Unique identifier
    pub name: String,

    /// Display name, may be empty
    #[serde(default)]
    pub alias: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    /// Source repository reference
    #[serde(default)]
    pub repo: String,

    #[serde(default)]
    pub branch: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub downloads: u64,

    #[serde(default)]
    pub like_percentage: Option<i8>,

    /// Support link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kofi: Option<String>,

    #[serde(default)]
    pub added_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl AddonManifest {
    /// Create a manifest carrying only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: String::new(),
            dependencies: Vec::new(),
            description: String::new(),
            author: String::new(),
            repo: String::new(),
            branch: String::new(),
            tags: Vec::new(),
            downloads: 0,
            like_percentage: None,
            kofi: None,
            added_at: DateTime::<Utc>::default(),
            warning: None,
        }
    }

    /// Set the display alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

/// Tag descriptor attached to a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTag {
    #[serde(rename = "ref")]
    pub reference: String,

    /// Commit hash
    pub sha: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub url: String,
}

/// A downloadable version of an add-on
///
/// Fetched per operation and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub zipball_url: String,

    /// Version string
    pub tag_name: String,

    /// Release notes
    pub body: String,

    pub published_at: DateTime<Utc>,

    pub tag: ReleaseTag,
}

/// Wire shape of one release in API responses: `{ "release": {..}, "tag": {..} }`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub release: ReleaseBody,
    pub tag: ReleaseTag,
}

/// The `release` half of [`ReleasePayload`]
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseBody {
    pub zipball_url: String,
    pub tag_name: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
}

impl From<ReleasePayload> for Release {
    fn from(payload: ReleasePayload) -> Self {
        Self {
            zipball_url: payload.release.zipball_url,
            tag_name: payload.release.tag_name,
            body: payload.release.body,
            published_at: payload.release.published_at,
            tag: payload.tag,
        }
    }
}

/// Decode the `data` object of a bulk release response
///
/// Each entry is decoded on its own; an entry that does not match the
/// expected shape is logged and skipped while the rest are kept.
pub fn decode_release_map(data: serde_json::Value) -> Result<HashMap<String, Release>> {
    let serde_json::Value::Object(entries) = data else {
        return Err(Error::network(
            "bulk release response data is not an object",
        ));
    };

    let mut releases = HashMap::with_capacity(entries.len());
    for (name, value) in entries {
        match serde_json::from_value::<ReleasePayload>(value) {
            Ok(payload) => {
                releases.insert(name, Release::from(payload));
            }
            Err(e) => {
                tracing::warn!("Skipping bulk release entry {}: {}", name, e);
            }
        }
    }

    Ok(releases)
}

/// Locally known metadata for an add-on
///
/// Serialized into `managed_addons.json` with camelCase keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstalledAddon {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub version: String,
    pub commit: String,
    pub author: String,
    pub repo: String,

    /// True for add-ons installed by the manager, false for ones only found on disk
    pub is_managed: bool,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub branch: String,
}

impl InstalledAddon {
    /// Build the managed record for a freshly installed release
    pub fn from_release(manifest: &AddonManifest, release: &Release) -> Self {
        let alias = if manifest.alias.is_empty() {
            alias_from_name(&manifest.name)
        } else {
            manifest.alias.clone()
        };

        Self {
            name: manifest.name.clone(),
            alias,
            description: manifest.description.clone(),
            version: release.tag_name.clone(),
            commit: release.tag.sha.clone(),
            author: manifest.author.clone(),
            repo: manifest.repo.clone(),
            is_managed: true,
            updated_at: release.published_at,
            branch: manifest.branch.clone(),
        }
    }

    /// Record for an add-on present in `addons.txt` but not managed
    pub fn detected(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: alias_from_name(&name),
            name,
            ..Self::default()
        }
    }

    /// Alias if set, otherwise the name
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

/// Default display alias: underscores become spaces
pub fn alias_from_name(name: &str) -> String {
    name.replace('_', " ")
}
