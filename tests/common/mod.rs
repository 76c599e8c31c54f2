//! Shared fixtures: real archives on disk, an in-memory downloader and a
//! stand-in for installer package extraction.

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use swift_sdk_generator::bundler::{
    ArchiveKind, Arch, DownloadError, Downloader, ExtractionEnvironment, Extractor, Generator,
    LocalExtraction, NamingScheme, RetryConfig, Settings, SettingsBuilder, UnpackRequest,
    catalog::ubuntu,
};
use tokio_util::sync::CancellationToken;
use url::Url;

/// One archive member.
pub enum Member {
    File(String, Vec<u8>),
    Symlink(String, String),
}

/// Regular file member.
pub fn file(path: impl Into<String>, content: &[u8]) -> Member {
    Member::File(path.into(), content.to_vec())
}

/// Symbolic link member.
pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Member {
    Member::Symlink(path.into(), target.into())
}

fn append_members<W: Write>(builder: &mut tar::Builder<W>, members: &[Member]) {
    for member in members {
        match member {
            Member::File(path, content) => {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o755);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_slice())
                    .unwrap();
            }
            Member::Symlink(path, target) => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, path, target).unwrap();
            }
        }
    }
}

/// Uncompressed tar stream.
pub fn tar_bytes(members: &[Member]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    append_members(&mut builder, members);
    builder.into_inner().unwrap()
}

/// gzip-compressed tarball.
pub fn tar_gz(members: &[Member]) -> Vec<u8> {
    gzip(&tar_bytes(members))
}

/// xz-compressed tarball.
pub fn tar_xz(members: &[Member]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(&tar_bytes(members)).unwrap();
    encoder.finish().unwrap()
}

/// gzip-compressed bytes.
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Debian package whose data member is `data.tar.<compression>`.
pub fn deb(members: &[Member], compression: &str) -> Vec<u8> {
    let data = match compression {
        "gz" => tar_gz(members),
        "xz" => tar_xz(members),
        "zst" => zstd::encode_all(tar_bytes(members).as_slice(), 3).unwrap(),
        other => panic!("unsupported compression {other}"),
    };
    let control = tar_gz(&[file("./control", b"Package: fixture\n")]);

    let mut builder = ar::Builder::new(Vec::new());
    for (name, content) in [
        ("debian-binary".to_string(), b"2.0\n".to_vec()),
        ("control.tar.gz".to_string(), control),
        (format!("data.tar.{compression}"), data),
    ] {
        let header = ar::Header::new(name.into_bytes(), content.len() as u64);
        builder.append(&header, content.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Hex SHA-256.
pub fn sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Writes `bytes` to `path`, creating parents.
pub fn write(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

enum Failure {
    Transient(usize),
    Status(u16),
}

/// In-memory [`Downloader`] that counts transfers and injects failures.
#[derive(Default)]
pub struct MockDownloader {
    files: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, Failure>>,
    attempts: Mutex<HashMap<String, usize>>,
    transfers: AtomicUsize,
    hang: Mutex<Vec<String>>,
}

impl MockDownloader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `bytes` at `url`.
    pub fn serve(&self, url: &Url, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), bytes);
    }

    /// The next `times` requests for `url` fail with a transient error.
    pub fn fail_transient(&self, url: &Url, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), Failure::Transient(times));
    }

    /// Every request for `url` fails with `status`.
    pub fn fail_status(&self, url: &Url, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), Failure::Status(status));
    }

    /// Requests for `url` write partial content and wait for cancellation.
    pub fn hang(&self, url: &Url) {
        self.hang.lock().unwrap().push(url.to_string());
    }

    /// Completed transfers.
    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    /// Attempts made for `url`, successful or not.
    pub fn attempts(&self, url: &Url) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(url.as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(url.as_str()) {
                Some(Failure::Status(status)) => return Err(DownloadError::Status(*status)),
                Some(Failure::Transient(remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    return Err(DownloadError::Transient("connection reset".to_string()));
                }
                _ => {}
            }
        }

        if self.hang.lock().unwrap().contains(&url.to_string()) {
            tokio::fs::write(dest, b"partial").await?;
            cancel.cancelled().await;
            return Err(DownloadError::Cancelled);
        }

        let bytes = self.files.lock().unwrap().get(url.as_str()).cloned();
        let Some(bytes) = bytes else {
            return Err(DownloadError::Status(404));
        };
        tokio::fs::write(dest, &bytes).await?;
        self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(bytes.len() as u64)
    }
}

/// Treats installer packages as gzip tarballs, so pipelines run without
/// `xar` or `cpio`. Counts how often it was asked.
#[derive(Default)]
pub struct FakePkgExtraction {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ExtractionEnvironment for FakePkgExtraction {
    fn name(&self) -> &'static str {
        "fake-pkg"
    }

    async fn unpack(
        &self,
        request: &UnpackRequest,
        cancel: &CancellationToken,
    ) -> swift_sdk_generator::bundler::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let as_tarball = UnpackRequest {
            kind: ArchiveKind::TarGz,
            ..request.clone()
        };
        LocalExtraction.unpack(&as_tarball, cancel).await
    }
}

/// Extractor with local tarball handling and fake installer extraction.
pub fn test_extractor() -> (Extractor, Arc<FakePkgExtraction>) {
    let fake = Arc::new(FakePkgExtraction::default());
    (Extractor::new(Arc::new(LocalExtraction), fake.clone()), fake)
}

/// Settings rooted at `root`.
pub fn settings(root: &Path, build: Arch, target: Arch) -> Settings {
    SettingsBuilder::new()
        .source_root(root)
        .build_arch(build.name(NamingScheme::VendorOs))
        .target_arch(target.name(NamingScheme::TargetTriple))
        .host_os("macos")
        .retry(RetryConfig::immediate(3))
        .build()
        .unwrap()
}

/// Everything a pipeline run downloads, served by a [`MockDownloader`].
pub struct Upstream {
    pub downloader: Arc<MockDownloader>,
    pub runtime_url: Url,
    pub llvm_url: Url,
    pub pkg_url: Url,
    pub index_url: Url,
    pub deb_urls: Vec<Url>,
}

/// Serves realistic content for every artifact `settings` resolves.
pub fn upstream(settings: &Settings) -> Upstream {
    let downloader = MockDownloader::new();
    let paths = settings.paths();
    let artifacts = swift_sdk_generator::bundler::resolve_artifacts(settings, &paths).unwrap();
    let target = settings.platform_target();
    let multiarch = format!("{}-linux-gnu", target.arch.name(NamingScheme::TargetTriple));

    downloader.serve(
        artifacts.run_time_swift.remote_url(),
        tar_gz(&[
            file("swift-5.8-RELEASE/usr/bin/swift-frontend", b"elf"),
            file("swift-5.8-RELEASE/usr/lib/swift/linux/libswiftCore.so", b"core"),
            file(
                "swift-5.8-RELEASE/usr/lib/swift_static/linux/libswiftCore.a",
                b"static core",
            ),
            file("swift-5.8-RELEASE/usr/lib/swift/shims/SwiftStdint.h", b"shim"),
        ]),
    );
    downloader.serve(
        artifacts.build_time_llvm.remote_url(),
        tar_xz(&[
            file("clang+llvm-16.0.4/bin/lld", b"lld"),
            file("clang+llvm-16.0.4/bin/clang", b"clang"),
        ]),
    );
    downloader.serve(
        artifacts.build_time_swift.remote_url(),
        tar_gz(&[
            file("usr/bin/swiftc", b"compiler"),
            file("usr/lib/swift/shims/module.modulemap", b"module"),
            file("usr/lib/clang/13.0.0/include/stdarg.h", b"header"),
        ]),
    );

    let index_artifact = ubuntu::package_index_artifact(settings, &paths).unwrap();
    let mirror = ubuntu::mirror_for(target.arch);
    let deb_arch = target.arch.name(NamingScheme::Packaging);
    let mut index = String::new();
    let mut deb_urls = Vec::new();

    for package in ubuntu::required_packages(&target.distribution) {
        let members = match package.as_str() {
            "libc6" => vec![file(format!("./lib/{multiarch}/libm.so.6"), b"libm")],
            "libc6-dev" => vec![
                file("./usr/include/stdio.h", b"stdio"),
                symlink(
                    format!("./usr/lib/{multiarch}/libm.so"),
                    format!("/lib/{multiarch}/libm.so.6"),
                ),
                file("./usr/share/doc/libc6-dev/copyright", b"gpl"),
            ],
            _ => vec![file(format!("./usr/lib/{multiarch}/{package}.so"), b"lib")],
        };
        let compression = if package == "zlib1g" { "zst" } else { "xz" };
        let bytes = deb(&members, compression);
        let filename = format!("pool/main/f/{package}/{package}_1.0_{deb_arch}.deb");
        let url = Url::parse(&format!("{mirror}/{filename}")).unwrap();

        index.push_str(&format!(
            "Package: {package}\nVersion: 1.0\nArchitecture: {deb_arch}\nFilename: {filename}\nSHA256: {}\nDescription: fixture\n multi-line\n\n",
            sha256(&bytes)
        ));
        downloader.serve(&url, bytes);
        deb_urls.push(url);
    }
    downloader.serve(index_artifact.remote_url(), gzip(index.as_bytes()));

    Upstream {
        runtime_url: artifacts.run_time_swift.remote_url().clone(),
        llvm_url: artifacts.build_time_llvm.remote_url().clone(),
        pkg_url: artifacts.build_time_swift.remote_url().clone(),
        index_url: index_artifact.remote_url().clone(),
        deb_urls,
        downloader,
    }
}

/// Generator wired to `upstream` and fake installer extraction.
pub fn generator(settings: Settings, upstream: &Upstream) -> Generator {
    let (extractor, _) = test_extractor();
    let fetcher = swift_sdk_generator::bundler::Fetcher::new(
        upstream.downloader.clone(),
        *settings.retry(),
    );
    Generator::with_parts(settings, fetcher, extractor)
}

/// Every file below `root`, relative, sorted.
pub fn tree(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}
