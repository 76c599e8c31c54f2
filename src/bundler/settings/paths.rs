//! Filesystem layout of a generation run.
//!
//! Every path the generator reads or writes is computed here. Other
//! modules ask [`PathsConfiguration`] instead of joining path segments
//! themselves, so the cache, the working directories and the bundle can
//! never disagree about where something lives.
//!
//! ```text
//! <root>/
//! ├── Artifacts/                                   # download cache
//! ├── Work/<id>/
//! │   ├── state.json                               # run state record
//! │   └── <artifact>/                              # extraction output
//! └── Bundles/<id>.artifactbundle/
//!     ├── info.json                                # manifest
//!     └── <id>/
//!         ├── swift.xctoolchain/usr/bin/ld.lld     # bundled linker
//!         └── <target triple>/
//!             ├── swift-sdk.json
//!             ├── toolset.json
//!             └── ubuntu-<codename>.sdk/           # SDK root
//! ```

use super::PlatformTarget;
use std::path::{Component, Path, PathBuf};

/// Name of the bundled linker toolchain directory.
const TOOLCHAIN_DIR_NAME: &str = "swift.xctoolchain";

/// All computed locations of one generation run.
///
/// A pure function of the source root, the bundle identifier and the
/// run-time platform: identical inputs give identical paths.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathsConfiguration {
    source_root: PathBuf,
    artifacts_cache_path: PathBuf,
    work_path: PathBuf,
    artifact_bundle_path: PathBuf,
    artifact_path: PathBuf,
    variant_path: PathBuf,
    sdk_dir_name: String,
}

impl PathsConfiguration {
    /// Computes the layout for `artifact_id` targeting `target`.
    pub fn new(source_root: &Path, artifact_id: &str, target: &PlatformTarget) -> Self {
        let artifact_bundle_path = source_root
            .join("Bundles")
            .join(format!("{artifact_id}.artifactbundle"));
        let artifact_path = artifact_bundle_path.join(artifact_id);
        let variant_path = artifact_path.join(target.triple().to_string());

        Self {
            source_root: source_root.to_path_buf(),
            artifacts_cache_path: source_root.join("Artifacts"),
            work_path: source_root.join("Work").join(artifact_id),
            artifact_bundle_path,
            artifact_path,
            variant_path,
            sdk_dir_name: format!(
                "{}-{}.sdk",
                target.os_family(),
                target.distribution.codename()
            ),
        }
    }

    /// Root directory everything else lives under.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Download cache directory.
    pub fn artifacts_cache_path(&self) -> &Path {
        &self.artifacts_cache_path
    }

    /// Cache location for a download, keyed by a relative identity path.
    ///
    /// Leading `/`, `.` and `..` components are dropped so that a remote
    /// path can never escape the cache directory.
    pub fn cache_path(&self, relative: &str) -> PathBuf {
        let mut path = self.artifacts_cache_path.clone();
        for component in Path::new(relative).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }

    /// Per-run working directory.
    pub fn work_path(&self) -> &Path {
        &self.work_path
    }

    /// Extraction directory of one artifact.
    pub fn extraction_path(&self, artifact_id: &str) -> PathBuf {
        self.work_path.join(artifact_id)
    }

    /// Persisted run state record.
    pub fn state_path(&self) -> PathBuf {
        self.work_path.join("state.json")
    }

    /// `<root>/Bundles/<id>.artifactbundle`
    pub fn artifact_bundle_path(&self) -> &Path {
        &self.artifact_bundle_path
    }

    /// `<bundle>/<id>`
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// `<bundle>/<id>/<target triple>`
    pub fn variant_path(&self) -> &Path {
        &self.variant_path
    }

    /// SDK root directory inside the variant.
    pub fn sdk_dir_path(&self) -> PathBuf {
        self.variant_path.join(&self.sdk_dir_name)
    }

    /// Bundled toolchain directory shared by every variant.
    pub fn toolchain_dir_path(&self) -> PathBuf {
        self.artifact_path.join(TOOLCHAIN_DIR_NAME)
    }

    /// Directory holding the bundled linker.
    pub fn toolchain_bin_dir_path(&self) -> PathBuf {
        self.toolchain_dir_path().join("usr").join("bin")
    }

    /// Toolset description of the variant.
    pub fn toolset_path(&self) -> PathBuf {
        self.variant_path.join("toolset.json")
    }

    /// SDK metadata of the variant.
    pub fn swift_sdk_metadata_path(&self) -> PathBuf {
        self.variant_path.join("swift-sdk.json")
    }

    /// Bundle manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.artifact_bundle_path.join("info.json")
    }

    /// Relative path of the SDK root, as seen from the variant directory.
    pub fn sdk_dir_name(&self) -> &str {
        &self.sdk_dir_name
    }

    /// Variant directory relative to the bundle root.
    pub fn relative_variant_path(&self) -> PathBuf {
        self.variant_path
            .strip_prefix(&self.artifact_bundle_path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.variant_path.clone())
    }

    /// Linker directory relative to the variant directory.
    pub fn relative_toolchain_bin_path(&self) -> PathBuf {
        Path::new("..")
            .join(TOOLCHAIN_DIR_NAME)
            .join("usr")
            .join("bin")
    }
}
