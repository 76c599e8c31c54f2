//! Per-triple toolset description (`toolset.json`).
//!
//! Tells the consuming build tool which linker to use and which extra
//! flags the Swift and C++ drivers need when targeting the SDK.

use crate::bundler::{Result, settings::PathsConfiguration, utils::fs};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Toolset schema version understood by SwiftPM.
pub const TOOLSET_SCHEMA_VERSION: &str = "1.0";

/// File name of the bundled linker.
pub const LINKER_NAME: &str = "ld.lld";

/// Extra options for one tool.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOptions {
    /// Executable path, relative to the toolset root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Arguments appended to every invocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_cli_options: Vec<String>,
}

/// Contents of `toolset.json`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolset {
    /// Schema version.
    pub schema_version: String,
    /// Directory tools are looked up in, relative to the toolset file.
    pub root_path: String,
    /// Linker selection.
    pub linker: ToolOptions,
    /// Swift compiler flags.
    pub swift_compiler: ToolOptions,
    /// C++ compiler flags.
    pub cxx_compiler: ToolOptions,
}

impl Toolset {
    /// Toolset using the bundled `ld.lld` and the Linux runtime search path.
    pub fn for_bundle(paths: &PathsConfiguration) -> Self {
        Self {
            schema_version: TOOLSET_SCHEMA_VERSION.to_string(),
            root_path: slash_path(&paths.relative_toolchain_bin_path()),
            linker: ToolOptions {
                path: Some(LINKER_NAME.to_string()),
                extra_cli_options: Vec::new(),
            },
            swift_compiler: ToolOptions {
                path: None,
                extra_cli_options: vec![
                    "-use-ld=lld".to_string(),
                    "-Xlinker".to_string(),
                    "-R/usr/lib/swift/linux/".to_string(),
                ],
            },
            cxx_compiler: ToolOptions {
                path: None,
                extra_cli_options: vec!["-lstdc++".to_string()],
            },
        }
    }

    /// Writes the toolset atomically.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        fs::write_atomic(path, &json).await
    }
}

/// Relative path with `/` separators regardless of host.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
