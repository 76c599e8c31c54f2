//! Extraction inside a docker container.
//!
//! Used when the host cannot unpack an OS-native format itself. The
//! archive's directory is mounted read-only at `/input`, the destination
//! read-write at `/output`, and a small shell script does the unpacking.
//! Ownership of the output is handed back to the invoking user before the
//! container exits.

use super::{ExtractionEnvironment, UnpackRequest, run_command};
use crate::bundler::{
    builder::tool_detection::HAS_DOCKER,
    catalog::ArchiveKind,
    error::{Context, Error, Result},
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Timeout for one extraction container (20 minutes)
/// The Swift installer package alone is several hundred megabytes
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(1200);

const DOCKER: &str = "docker";

/// Unpacks archives in a throwaway container.
#[derive(Clone, Debug)]
pub struct ContainerExtraction {
    image: String,
    timeout: Duration,
    docker: PathBuf,
}

impl ContainerExtraction {
    /// Creates a container environment running `image`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            timeout: EXTRACTION_TIMEOUT,
            docker: PathBuf::from(DOCKER),
        }
    }

    /// Uses another docker-compatible client binary.
    pub fn with_docker_binary(mut self, docker: impl Into<PathBuf>) -> Self {
        self.docker = docker.into();
        self
    }

    /// Overrides the per-extraction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Image the container runs.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Builds `docker run` arguments for `request`.
    ///
    /// # Arguments
    ///
    /// * `container_name` - Unique container name
    /// * `request` - What to unpack and where
    ///
    /// # Returns
    ///
    /// Vector of command arguments for `docker run`
    pub fn build_docker_args(
        &self,
        container_name: &str,
        request: &UnpackRequest,
    ) -> Result<Vec<String>> {
        let input_dir = request
            .archive
            .parent()
            .context("archive path has no parent directory")?;
        let archive_name = request
            .archive
            .file_name()
            .context("archive path has no file name")?
            .to_string_lossy()
            .into_owned();

        let script = unpack_script(request, &archive_name)?;

        let mut docker_args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            // SECURITY: Prevent privilege escalation in container
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
            // SECURITY: Drop all capabilities, then re-add what package installation
            // and the final chown need
            "--cap-drop".to_string(),
            "ALL".to_string(),
        ];
        for capability in ["CHOWN", "DAC_OVERRIDE", "FOWNER", "SETUID", "SETGID"] {
            docker_args.push("--cap-add".to_string());
            docker_args.push(capability.to_string());
        }
        docker_args.extend([
            // SECURITY: Mount the cache read-only
            "-v".to_string(),
            format!("{}:/input:ro", input_dir.display()),
            "-v".to_string(),
            format!("{}:/output:rw", request.destination.display()),
            "-w".to_string(),
            "/output".to_string(),
            self.image.clone(),
            "/bin/sh".to_string(),
            "-c".to_string(),
            script,
        ]);

        Ok(docker_args)
    }
}

#[async_trait]
impl ExtractionEnvironment for ContainerExtraction {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn unpack(&self, request: &UnpackRequest, cancel: &CancellationToken) -> Result<()> {
        if !self.docker_available() {
            return Err(Error::CommandFailed {
                command: self.docker.display().to_string(),
                reason: "docker is not available in PATH".to_string(),
            });
        }

        let container_name = format!("swift-sdk-extract-{}", uuid::Uuid::new_v4());
        let docker_args = self.build_docker_args(&container_name, request)?;

        let mut command = Command::new(&self.docker);
        command.args(&docker_args);

        // Removes the container on every exit path except success.
        let mut guard = ContainerGuard {
            docker: self.docker.clone(),
            name: container_name.clone(),
            armed: true,
        };

        let result = match tokio::time::timeout(
            self.timeout,
            run_command(command, format!("docker run {container_name}"), cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::CommandFailed {
                command: "docker run".to_string(),
                reason: format!(
                    "extraction timed out after {} minutes",
                    self.timeout.as_secs() / 60
                ),
            }),
        };

        if result.is_ok() {
            guard.armed = false;
        }
        result
    }
}

impl ContainerExtraction {
    fn docker_available(&self) -> bool {
        if self.docker == Path::new(DOCKER) {
            *HAS_DOCKER
        } else {
            which::which(&self.docker).is_ok()
        }
    }
}

/// Force-removes a container when dropped.
///
/// Killing the docker client does not stop the container, which would keep
/// writing into the output directory after it has been cleaned up. Removal
/// runs to completion inside `drop`.
struct ContainerGuard {
    docker: PathBuf,
    name: String,
    armed: bool,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = std::process::Command::new(&self.docker)
            .args(["rm", "-f", &self.name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match removed {
            Ok(status) if status.success() => log::debug!("Removed container {}", self.name),
            Ok(status) => log::debug!("docker rm -f {} exited with {}", self.name, status),
            Err(e) => log::warn!("Failed to remove container {}: {}", self.name, e),
        }
    }
}

/// Shell script unpacking `archive_name` from `/input` into `/output`.
fn unpack_script(request: &UnpackRequest, archive_name: &str) -> Result<String> {
    let input = shell_quote(&format!("/input/{archive_name}"));
    let strip = request.strip_components;

    // GNU tar matches member names before stripping; each stripped
    // component becomes a leading wildcard.
    let members = request
        .members
        .iter()
        .map(|member| shell_quote(&format!("{}{}", "*/".repeat(strip as usize), member)))
        .collect::<Vec<_>>()
        .join(" ");
    let wildcards = if members.is_empty() { "" } else { "--wildcards " };

    let body = match request.kind {
        ArchiveKind::TarGz => format!(
            "tar -xzf {input} -C /output --strip-components={strip} {wildcards}{members}"
        ),
        ArchiveKind::TarXz => format!(
            "tar -xJf {input} -C /output --strip-components={strip} {wildcards}{members}"
        ),
        ArchiveKind::Deb => format!("dpkg-deb -x {input} /output"),
        ArchiveKind::Pkg => format!(
            "command -v bsdtar >/dev/null 2>&1 || \
             {{ apt-get update -qq && apt-get install -y -qq libarchive-tools >/dev/null; }}\n\
             staging=$(mktemp -d)\n\
             bsdtar -xf {input} -C \"$staging\"\n\
             find \"$staging\" -type f -name Payload | sort | while read -r payload; do \
             bsdtar -xf \"$payload\" -C /output; done\n\
             test -n \"$(ls -A /output)\""
        ),
        ArchiveKind::Gzip => return Err(Error::UnsupportedArchiveFormat(archive_name.to_string())),
    };

    Ok(format!("set -eu\n{body}\n{}", ownership_fixup()))
}

/// Hands extracted files back to the invoking user.
#[cfg(unix)]
fn ownership_fixup() -> String {
    let uid = users::get_current_uid();
    let gid = users::get_current_gid();
    format!("chown -R {uid}:{gid} /output")
}

#[cfg(not(unix))]
fn ownership_fixup() -> String {
    String::new()
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
