//! Bundle assembly.
//!
//! Arranges extracted components into the artifact bundle layout and
//! writes its metadata. Every step can be re-run over the output of a
//! failed earlier attempt:
//!
//! 1. Remove any previous manifest, so a bundle being rebuilt is never
//!    advertised as complete.
//! 2. Recreate the variant and toolchain directories.
//! 3. Copy the runtime and library subsets into the SDK root and the
//!    linker into the bundled toolchain.
//! 4. Write `toolset.json` and `swift-sdk.json`.
//! 5. Write `info.json`, last and atomically.

pub mod manifest;
pub mod toolset;

pub use manifest::{ArtifactBundleManifest, SwiftSdkMetadata};
pub use toolset::Toolset;

use crate::bundler::{
    Result,
    catalog::ArtifactRole,
    error::Error,
    extract::ExtractedComponent,
    settings::{PathsConfiguration, Settings, Triple},
    utils::fs,
};
use std::path::{Path, PathBuf};

/// Run-time Swift subsets that every SDK needs.
const TARGET_RUNTIME_REQUIRED: [&str; 2] = ["usr/lib/swift/linux", "usr/lib/swift_static/linux"];

/// Run-time Swift subsets copied when present.
const TARGET_RUNTIME_OPTIONAL: [&str; 5] = [
    "usr/lib/swift/dispatch",
    "usr/lib/swift/os",
    "usr/lib/swift/CoreFoundation",
    "usr/lib/swift/shims",
    "usr/lib/swift_static/shims",
];

/// System package subsets copied when present.
const SYSTEM_PACKAGE_SUBSETS: [&str; 4] = ["lib", "lib64", "usr/lib", "usr/include"];

/// Linker inside the LLVM release.
const LINKER_SOURCE: &str = "bin/lld";

/// Build-time runtime resources the bundled toolchain needs.
const BUILD_RUNTIME_REQUIRED: [&str; 1] = ["usr/lib/swift/shims"];

/// Build-time runtime resources copied when present.
const BUILD_RUNTIME_OPTIONAL: [&str; 1] = ["usr/lib/clang"];

/// Arranges extracted components into an artifact bundle.
#[derive(Clone, Debug)]
pub struct Assembler {
    artifact_id: String,
    paths: PathsConfiguration,
    build_triple: Triple,
    target_triple: Triple,
}

impl Assembler {
    /// Creates an assembler for the bundle described by `settings`.
    pub fn new(settings: &Settings) -> Self {
        Self {
            artifact_id: settings.artifact_id(),
            paths: settings.paths(),
            build_triple: settings.build_triple(),
            target_triple: settings.target_triple(),
        }
    }

    /// Bundle layout in use.
    pub fn paths(&self) -> &PathsConfiguration {
        &self.paths
    }

    /// Removes a previously published manifest.
    pub async fn invalidate(&self) -> Result<()> {
        fs::remove_file(&self.paths.manifest_path()).await
    }

    /// Assembles the bundle and returns the manifest path.
    ///
    /// # Errors
    ///
    /// * [`Error::MissingContent`] - a required component or subset is absent
    ///
    /// On error no manifest exists afterwards.
    pub async fn assemble(&self, components: &[ExtractedComponent]) -> Result<PathBuf> {
        let paths = &self.paths;
        self.invalidate().await?;

        log::info!(
            "Assembling {} at {}",
            self.artifact_id,
            paths.artifact_bundle_path().display()
        );

        fs::create_dir_all(paths.artifact_bundle_path(), false).await?;
        fs::create_dir_all(paths.variant_path(), true).await?;
        fs::create_dir_all(&paths.toolchain_dir_path(), true).await?;
        let sdk_root = paths.sdk_dir_path();
        fs::create_dir_all(&sdk_root, false).await?;

        let mut ordered: Vec<&ExtractedComponent> = components.iter().collect();
        ordered.sort_by(|a, b| (a.role, &a.id).cmp(&(b.role, &b.id)));

        for role in [
            ArtifactRole::BuildRuntime,
            ArtifactRole::BuildToolchain,
            ArtifactRole::TargetRuntime,
        ] {
            if !ordered.iter().any(|component| component.role == role) {
                return Err(Error::MissingContent {
                    artifact: self.artifact_id.clone(),
                    path: format!("{role:?} component"),
                });
            }
        }

        let mut system_packages = 0;
        for component in ordered {
            match component.role {
                ArtifactRole::TargetRuntime => {
                    copy_subsets(
                        component,
                        &TARGET_RUNTIME_REQUIRED,
                        &TARGET_RUNTIME_OPTIONAL,
                        &sdk_root,
                    )
                    .await?;
                }
                ArtifactRole::SystemPackage => {
                    copy_subsets(component, &[], &SYSTEM_PACKAGE_SUBSETS, &sdk_root).await?;
                    system_packages += 1;
                }
                ArtifactRole::BuildToolchain => {
                    let linker = require(component, LINKER_SOURCE)?;
                    let target = paths.toolchain_bin_dir_path().join(toolset::LINKER_NAME);
                    fs::copy_file(&linker, &target).await?;
                    log::debug!("Bundled linker at {}", target.display());
                }
                ArtifactRole::BuildRuntime => {
                    let toolchain_root = paths.toolchain_dir_path();
                    copy_subsets(
                        component,
                        &BUILD_RUNTIME_REQUIRED,
                        &BUILD_RUNTIME_OPTIONAL,
                        &toolchain_root,
                    )
                    .await?;
                }
                ArtifactRole::PackageIndex => {}
            }
        }

        if system_packages > 0 {
            let rebased = fs::make_symlinks_relative(&sdk_root).await?;
            log::debug!("Rebased {} absolute symlinks in the SDK root", rebased);
        }

        Toolset::for_bundle(paths)
            .write(&paths.toolset_path())
            .await?;
        SwiftSdkMetadata::for_variant(paths, &self.target_triple)
            .write(&paths.swift_sdk_metadata_path())
            .await?;

        let manifest_path = paths.manifest_path();
        ArtifactBundleManifest::for_bundle(&self.artifact_id, paths, &self.build_triple)
            .write(&manifest_path)
            .await?;

        log::info!("✓ Published {}", manifest_path.display());
        Ok(manifest_path)
    }
}

/// Path of a required entry inside a component.
fn require(component: &ExtractedComponent, relative: &str) -> Result<PathBuf> {
    let path = component.root.join(relative);
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::MissingContent {
            artifact: component.id.clone(),
            path: relative.to_string(),
        })
    }
}

/// Copies `required` and `optional` subsets of a component under `dest`,
/// keeping their relative paths.
async fn copy_subsets(
    component: &ExtractedComponent,
    required: &[&str],
    optional: &[&str],
    dest: &Path,
) -> Result<()> {
    for relative in required {
        let source = require(component, relative)?;
        copy_entry(&source, &dest.join(relative)).await?;
    }
    for relative in optional {
        let source = component.root.join(relative);
        if source.exists() {
            copy_entry(&source, &dest.join(relative)).await?;
        } else {
            log::debug!("{} has no {}", component.id, relative);
        }
    }
    Ok(())
}

async fn copy_entry(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        fs::merge_dir(source, dest).await
    } else {
        fs::copy_file(source, dest).await
    }
}
