//! Bundle metadata: `swift-sdk.json` per variant and the `info.json`
//! manifest at the bundle root.
//!
//! Maps are `BTreeMap`s so that identical inputs serialize to identical
//! bytes.

use super::toolset::slash_path;
use crate::bundler::{
    Result,
    error::ErrorExt,
    settings::{PathsConfiguration, Triple},
    utils::fs,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// Artifact bundle manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";

/// Swift SDK metadata schema version.
pub const SWIFT_SDK_SCHEMA_VERSION: &str = "3.0";

/// Artifact type SwiftPM looks for.
pub const SWIFT_SDK_ARTIFACT_TYPE: &str = "swiftSDK";

/// Version recorded for the bundled artifact.
pub const ARTIFACT_VERSION: &str = "0.0.1";

/// SDK locations for one target triple, relative to `swift-sdk.json`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripleProperties {
    /// SDK root.
    pub sdk_root_path: String,
    /// Dynamic Swift runtime resources.
    pub swift_resources_path: String,
    /// Static Swift runtime resources.
    pub swift_static_resources_path: String,
    /// Toolset descriptions to apply.
    pub toolset_paths: Vec<String>,
}

/// Contents of `swift-sdk.json`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftSdkMetadata {
    /// Schema version.
    pub schema_version: String,
    /// Per-triple SDK locations.
    pub target_triples: BTreeMap<String, TripleProperties>,
}

impl SwiftSdkMetadata {
    /// Metadata for the single variant described by `paths`.
    pub fn for_variant(paths: &PathsConfiguration, target: &Triple) -> Self {
        let sdk_root = paths.sdk_dir_name().to_string();
        let toolset = paths
            .toolset_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut target_triples = BTreeMap::new();
        target_triples.insert(
            target.to_string(),
            TripleProperties {
                swift_resources_path: format!("{sdk_root}/usr/lib/swift"),
                swift_static_resources_path: format!("{sdk_root}/usr/lib/swift_static"),
                sdk_root_path: sdk_root,
                toolset_paths: vec![toolset],
            },
        );

        Self {
            schema_version: SWIFT_SDK_SCHEMA_VERSION.to_string(),
            target_triples,
        }
    }

    /// Writes the metadata atomically.
    pub async fn write(&self, path: &Path) -> Result<()> {
        write_json(self, path).await
    }
}

/// One directory of an artifact and the build hosts it supports.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleVariant {
    /// Variant directory, relative to the bundle root.
    pub path: String,
    /// Build host triples the variant can be used from.
    pub supported_triples: Vec<String>,
}

/// One artifact of a bundle.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleArtifact {
    /// Artifact type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Artifact version.
    pub version: String,
    /// Variants, one per supported triple.
    pub variants: Vec<BundleVariant>,
}

/// Contents of `info.json`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBundleManifest {
    /// Schema version.
    pub schema_version: String,
    /// Artifacts by identifier.
    pub artifacts: BTreeMap<String, BundleArtifact>,
}

impl ArtifactBundleManifest {
    /// Manifest listing the variant described by `paths` for `build`.
    pub fn for_bundle(artifact_id: &str, paths: &PathsConfiguration, build: &Triple) -> Self {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            artifact_id.to_string(),
            BundleArtifact {
                kind: SWIFT_SDK_ARTIFACT_TYPE.to_string(),
                version: ARTIFACT_VERSION.to_string(),
                variants: vec![BundleVariant {
                    path: slash_path(&paths.relative_variant_path()),
                    supported_triples: vec![build.to_string()],
                }],
            },
        );
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            artifacts,
        }
    }

    /// Reads a manifest back from disk.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .fs_context("reading manifest", path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every variant path together with the triples it supports.
    pub fn variants(&self) -> impl Iterator<Item = &BundleVariant> {
        self.artifacts.values().flat_map(|a| a.variants.iter())
    }

    /// Writes the manifest with a single atomic replace.
    pub async fn write(&self, path: &Path) -> Result<()> {
        write_json(self, path).await
    }
}

async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    fs::write_atomic(path, &json).await
}
