//! GitHub `registry_package` webhook payload.
//!
//! Every field defaults when absent: GitHub omits parts of the payload for
//! some ecosystems, and a payload that only carries `action` is still a valid
//! (if uninteresting) event.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryPackageEvent {
    pub action: String,
    pub registry_package: RegistryPackage,
    pub repository: Repository,
    pub sender: Sender,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryPackage {
    pub name: String,
    pub ecosystem: String,
    pub package_version: PackageVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageVersion {
    pub id: i64,
    pub version: String,
    pub package_url: String,
    pub container_metadata: ContainerMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMetadata {
    pub tag: Tag,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub name: String,
    pub digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
    pub login: String,
}

impl RegistryPackageEvent {
    pub fn package_name(&self) -> &str {
        &self.registry_package.name
    }

    pub fn version(&self) -> &str {
        &self.registry_package.package_version.version
    }

    /// The fields that identify a publish, independent of which delivery
    /// carried it.
    pub fn identity(&self) -> EventIdentity {
        let version = &self.registry_package.package_version;
        EventIdentity {
            package: self.registry_package.name.clone(),
            tag: version.container_metadata.tag.name.clone(),
            version_id: version.id,
            digest: version.container_metadata.tag.digest.clone(),
        }
    }

    /// Label stored alongside the event: the repository, or the package name
    /// when the payload has no repository.
    pub fn label(&self) -> &str {
        if self.repository.full_name.is_empty() {
            self.package_name()
        } else {
            &self.repository.full_name
        }
    }
}

/// Deduplication key: package + tag name + package version id + content
/// digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventIdentity {
    pub package: String,
    pub tag: String,
    pub version_id: i64,
    pub digest: String,
}

impl std::fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}@{}#{}",
            self.package, self.tag, self.version_id, self.digest
        )
    }
}

/// Returns the `zen` string if `value` is a GitHub ping payload.
pub fn ping_zen(value: &serde_json::Value) -> Option<&str> {
    value.get("zen").and_then(serde_json::Value::as_str)
}
