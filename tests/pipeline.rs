//! End-to-end generation against an in-memory upstream.

mod common;

use async_trait::async_trait;
use common::file;
use std::{path::Path, sync::Arc};
use swift_sdk_generator::bundler::{
    Arch, ArtifactBundleManifest, Error, ExtractionEnvironment, Extractor, Fetcher, Generator,
    LocalExtraction, RunPhase, Stage, StateRecord, SwiftSdkMetadata, Toolset, UnpackRequest,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SYSTEM_PACKAGE_COUNT: usize = 11;

#[tokio::test]
async fn test_generates_complete_bundle() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::Arm64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings, &upstream);
    let paths = generator.paths().clone();

    let report = generator.generate().await.unwrap();

    assert!(!report.up_to_date);
    assert_eq!(report.artifact_id, "5.8-RELEASE_ubuntu_22.04_x86_64");
    assert_eq!(report.transferred, 3 + 1 + SYSTEM_PACKAGE_COUNT);
    assert_eq!(report.manifest_path, paths.manifest_path());
    assert_eq!(upstream.downloader.transfers(), report.transferred);

    let manifest = ArtifactBundleManifest::read(&report.manifest_path)
        .await
        .unwrap();
    assert_eq!(manifest.schema_version, "1.0");
    let artifact = &manifest.artifacts["5.8-RELEASE_ubuntu_22.04_x86_64"];
    assert_eq!(artifact.kind, "swiftSDK");
    assert_eq!(artifact.variants.len(), 1);
    assert_eq!(
        artifact.variants[0].path,
        "5.8-RELEASE_ubuntu_22.04_x86_64/x86_64-unknown-linux-gnu"
    );
    assert_eq!(
        artifact.variants[0].supported_triples,
        ["arm64-apple-macosx13.0"]
    );

    let sdk: SwiftSdkMetadata =
        serde_json::from_slice(&std::fs::read(paths.swift_sdk_metadata_path()).unwrap()).unwrap();
    assert_eq!(sdk.schema_version, "3.0");
    let triple = &sdk.target_triples["x86_64-unknown-linux-gnu"];
    assert_eq!(triple.sdk_root_path, "ubuntu-jammy.sdk");
    assert_eq!(triple.swift_resources_path, "ubuntu-jammy.sdk/usr/lib/swift");
    assert_eq!(triple.toolset_paths, ["toolset.json"]);

    let toolset: Toolset =
        serde_json::from_slice(&std::fs::read(paths.toolset_path()).unwrap()).unwrap();
    assert_eq!(toolset.root_path, "../swift.xctoolchain/usr/bin");
    assert_eq!(toolset.linker.path.as_deref(), Some("ld.lld"));

    let toolchain = paths.toolchain_dir_path();
    assert_eq!(std::fs::read(toolchain.join("usr/bin/ld.lld")).unwrap(), b"lld");
    assert!(toolchain.join("usr/lib/swift/shims/module.modulemap").is_file());
    assert!(toolchain.join("usr/lib/clang/13.0.0/include/stdarg.h").is_file());
    assert!(!toolchain.join("usr/bin/swiftc").exists());

    let sdk_root = paths.sdk_dir_path();
    assert!(sdk_root.join("usr/lib/swift/linux/libswiftCore.so").is_file());
    assert!(sdk_root.join("usr/lib/swift_static/linux/libswiftCore.a").is_file());
    assert!(sdk_root.join("usr/lib/swift/shims/SwiftStdint.h").is_file());
    assert!(sdk_root.join("usr/include/stdio.h").is_file());
    assert!(sdk_root.join("lib/x86_64-linux-gnu/libm.so.6").is_file());
    assert!(!sdk_root.join("usr/bin").exists());
    assert!(!sdk_root.join("usr/share").exists());

    let state = StateRecord::load(&paths.state_path()).await.unwrap().unwrap();
    assert_eq!(state.phase, RunPhase::Published);
    assert_eq!(state.error, None);
}

#[cfg(unix)]
#[tokio::test]
async fn test_absolute_symlinks_stay_inside_sdk() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings, &upstream);

    generator.generate().await.unwrap();

    let link = generator
        .paths()
        .sdk_dir_path()
        .join("usr/lib/x86_64-linux-gnu/libm.so");
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        Path::new("../../../lib/x86_64-linux-gnu/libm.so.6")
    );
    assert_eq!(std::fs::read(&link).unwrap(), b"libm");
}

#[tokio::test]
async fn test_second_run_is_up_to_date() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::Arm64, Arch::Arm64);
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings, &upstream);

    let first = generator.generate().await.unwrap();
    let manifest = std::fs::read(&first.manifest_path).unwrap();
    let transfers = upstream.downloader.transfers();

    let second = generator.generate().await.unwrap();
    assert!(second.up_to_date);
    assert_eq!(second.transferred, 0);
    assert_eq!(second.manifest_path, first.manifest_path);
    assert_eq!(upstream.downloader.transfers(), transfers);
    assert_eq!(std::fs::read(&second.manifest_path).unwrap(), manifest);
}

#[tokio::test]
async fn test_rerun_without_state_reuses_cache() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::Arm64);
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings.clone(), &upstream);

    let first = generator.generate().await.unwrap();
    let manifest = std::fs::read(&first.manifest_path).unwrap();
    let bundle = common::tree(generator.paths().artifact_bundle_path());
    let transfers = upstream.downloader.transfers();
    std::fs::remove_file(generator.paths().state_path()).unwrap();

    // A fresh generator over the same root: only the cache carries over.
    let second = common::generator(settings, &upstream)
        .generate()
        .await
        .unwrap();

    assert!(!second.up_to_date);
    assert_eq!(second.transferred, 0);
    assert_eq!(upstream.downloader.transfers(), transfers);
    assert_eq!(std::fs::read(&second.manifest_path).unwrap(), manifest);
    assert_eq!(common::tree(generator.paths().artifact_bundle_path()), bundle);
}

#[tokio::test]
async fn test_rebuilds_when_manifest_was_removed() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings, &upstream);

    let first = generator.generate().await.unwrap();
    std::fs::remove_file(&first.manifest_path).unwrap();

    let second = generator.generate().await.unwrap();
    assert!(!second.up_to_date);
    assert_eq!(second.transferred, 0);
    assert!(second.manifest_path.is_file());
}

#[tokio::test]
async fn test_skipping_system_packages() {
    let root = TempDir::new().unwrap();
    let settings = swift_sdk_generator::bundler::SettingsBuilder::new()
        .source_root(root.path())
        .build_arch("x86_64")
        .target_arch("x86_64")
        .skip_system_packages(true)
        .build()
        .unwrap();
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings, &upstream);

    let report = generator.generate().await.unwrap();

    assert_eq!(report.transferred, 3);
    assert_eq!(upstream.downloader.attempts(&upstream.index_url), 0);
    let sdk_root = generator.paths().sdk_dir_path();
    assert!(sdk_root.join("usr/lib/swift/linux/libswiftCore.so").is_file());
    assert!(!sdk_root.join("usr/include").exists());
}

#[tokio::test]
async fn test_missing_download_fails_fast_and_publishes_nothing() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    upstream.downloader.fail_status(&upstream.llvm_url, 404);
    upstream.downloader.hang(&upstream.runtime_url);
    let generator = common::generator(settings, &upstream);

    let error = generator.generate().await.unwrap_err();

    match &error {
        Error::Stage {
            stage, artifact, location, ..
        } => {
            assert_eq!(*stage, Stage::Fetching);
            assert_eq!(artifact, "build-time-llvm");
            assert_eq!(location, upstream.llvm_url.as_str());
        }
        other => panic!("expected a stage failure, got {other:?}"),
    }
    assert!(matches!(error.root_cause(), Error::HttpStatus { status: 404, .. }));

    let paths = generator.paths();
    assert!(!paths.manifest_path().exists());
    let partials: Vec<_> = common::tree(paths.artifacts_cache_path())
        .into_iter()
        .filter(|path| path.to_string_lossy().ends_with(".part"))
        .collect();
    assert!(partials.is_empty(), "{partials:?}");

    let state = StateRecord::load(&paths.state_path()).await.unwrap().unwrap();
    assert_eq!(state.phase, RunPhase::Failed);
    assert_eq!(state.failed_stage, Some(Stage::Fetching));
    assert!(state.error.unwrap().contains("404"));
}

#[tokio::test]
async fn test_unknown_package_fails_resolution() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    upstream
        .downloader
        .serve(&upstream.index_url, common::gzip(b"Package: libc6\nFilename: pool/libc6.deb\n"));
    let generator = common::generator(settings, &upstream);

    let error = generator.generate().await.unwrap_err();

    assert!(matches!(
        error,
        Error::Stage {
            stage: Stage::Resolving,
            ..
        }
    ));
    assert!(matches!(
        error.root_cause(),
        Error::PackageNotFound { package, .. } if package == "libc6-dev"
    ));
    assert!(!generator.paths().manifest_path().exists());
}

#[tokio::test]
async fn test_failed_rebuild_withdraws_previous_manifest() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    let generator = common::generator(settings.clone(), &upstream);
    let first = generator.generate().await.unwrap();
    assert!(first.manifest_path.is_file());

    // Runtime tarball without the static libraries, served after a cache wipe.
    std::fs::remove_file(generator.paths().state_path()).unwrap();
    std::fs::remove_dir_all(generator.paths().artifacts_cache_path()).unwrap();
    upstream.downloader.serve(
        &upstream.runtime_url,
        common::tar_gz(&[file(
            "swift-5.8-RELEASE/usr/lib/swift/linux/libswiftCore.so",
            b"core",
        )]),
    );

    let error = common::generator(settings, &upstream)
        .generate()
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Stage {
            stage: Stage::Assembling,
            ..
        }
    ));
    assert!(matches!(
        error.root_cause(),
        Error::MissingContent { path, .. } if path == "usr/lib/swift_static/linux"
    ));
    assert!(!first.manifest_path.exists());
}

/// Writes part of the installer payload, then waits to be cancelled.
struct StallingExtraction;

#[async_trait]
impl ExtractionEnvironment for StallingExtraction {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn unpack(
        &self,
        request: &UnpackRequest,
        cancel: &CancellationToken,
    ) -> swift_sdk_generator::bundler::Result<()> {
        tokio::fs::write(request.destination.join("partial"), b"half")
            .await
            .unwrap();
        cancel.cancelled().await;
        Err(Error::Cancelled)
    }
}

#[tokio::test]
async fn test_failed_extraction_withdraws_manifest_and_working_directories() {
    let root = TempDir::new().unwrap();
    let settings = common::settings(root.path(), Arch::X86_64, Arch::X86_64);
    let upstream = common::upstream(&settings);
    let first = common::generator(settings.clone(), &upstream)
        .generate()
        .await
        .unwrap();
    assert!(first.manifest_path.is_file());

    let paths = settings.paths();
    std::fs::remove_file(paths.state_path()).unwrap();
    std::fs::remove_dir_all(paths.artifacts_cache_path()).unwrap();
    upstream
        .downloader
        .serve(&upstream.runtime_url, b"truncated download".to_vec());

    let extractor = Extractor::new(Arc::new(LocalExtraction), Arc::new(StallingExtraction));
    let fetcher = Fetcher::new(upstream.downloader.clone(), *settings.retry());
    let error = Generator::with_parts(settings, fetcher, extractor)
        .generate()
        .await
        .unwrap_err();

    match &error {
        Error::Stage {
            stage, artifact, ..
        } => {
            assert_eq!(*stage, Stage::Extracting);
            assert_eq!(artifact, "run-time-swift");
        }
        other => panic!("expected a stage failure, got {other:?}"),
    }
    assert!(!first.manifest_path.exists());
    assert!(!paths.extraction_path("run-time-swift").exists());
    assert!(!paths.extraction_path("build-time-swift").exists());

    let state = StateRecord::load(&paths.state_path()).await.unwrap().unwrap();
    assert_eq!(state.phase, RunPhase::Failed);
    assert_eq!(state.failed_stage, Some(Stage::Extracting));
}

#[test]
fn test_paths_depend_only_on_configuration() {
    let first_root = TempDir::new().unwrap();
    let second_root = TempDir::new().unwrap();

    let relative = |root: &Path| {
        let paths = common::settings(root, Arch::Arm64, Arch::X86_64).paths();
        [
            paths.manifest_path(),
            paths.sdk_dir_path(),
            paths.toolset_path(),
            paths.toolchain_bin_dir_path(),
            paths.state_path(),
        ]
        .map(|path| path.strip_prefix(root).unwrap().to_path_buf())
    };

    assert_eq!(relative(first_root.path()), relative(second_root.path()));
}
