// src/recipe/kitchen/archive.rs

//! Source archive handling: integrity checks, extraction and patching

use crate::error::{Error, Result};
use crate::process::ToolRunner;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;
use xz2::read::XzDecoder;

/// Verify a file against `sha256:<hex>` or `sha512:<hex>`
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let (algorithm, expected_hash) = expected
        .split_once(':')
        .ok_or_else(|| Error::ParseError(format!("Invalid checksum format: {}", expected)))?;

    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let actual = match algorithm {
        "sha256" => stream_digest::<Sha256>(reader)?,
        "sha512" => stream_digest::<Sha512>(reader)?,
        other => {
            return Err(Error::ParseError(format!(
                "Unsupported checksum algorithm: {} (supported: sha256, sha512)",
                other
            )));
        }
    };

    if actual.eq_ignore_ascii_case(expected_hash) {
        debug!("Checksum OK for {}", path.display());
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected_hash.to_string(),
            actual,
        })
    }
}

fn stream_digest<D: Digest + io::Write>(mut reader: impl Read) -> Result<String> {
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Archive formats recognised by file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    TarXz,
    Tar,
    TarBz2,
    Zip,
}

impl ArchiveKind {
    fn detect(filename: &str) -> Option<Self> {
        let name = filename.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest`
///
/// The archive is unpacked into a staging directory next to `dest` first.
/// When it holds a single top-level directory, that directory becomes
/// `dest`; otherwise the staged entries are moved into `dest` as they are.
/// `dest` must not exist.
pub fn extract_archive(archive: &Path, dest: &Path, runner: &ToolRunner) -> Result<()> {
    let failed = |reason: String| Error::ExtractFailed {
        archive: archive.display().to_string(),
        reason,
    };

    let filename = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let kind = ArchiveKind::detect(filename)
        .ok_or_else(|| failed(format!("unknown archive format: {}", filename)))?;

    let parent = dest
        .parent()
        .ok_or_else(|| failed(format!("{} has no parent directory", dest.display())))?;
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)
        .map_err(|e| failed(format!("cannot create staging directory: {e}")))?;

    match kind {
        ArchiveKind::TarGz | ArchiveKind::TarXz | ArchiveKind::Tar => {
            let file = File::open(archive).map_err(|e| failed(e.to_string()))?;
            let reader: Box<dyn Read> = match kind {
                ArchiveKind::TarGz => Box::new(GzDecoder::new(BufReader::new(file))),
                ArchiveKind::TarXz => Box::new(XzDecoder::new(BufReader::new(file))),
                _ => Box::new(BufReader::new(file)),
            };
            tar::Archive::new(reader)
                .unpack(staging.path())
                .map_err(|e| failed(e.to_string()))?;
        }
        ArchiveKind::TarBz2 => {
            let archive_arg = archive.display().to_string();
            let staging_arg = staging.path().display().to_string();
            runner
                .run("tar", &["-xjf", archive_arg.as_str(), "-C", staging_arg.as_str()], parent, &BTreeMap::new())
                .map_err(|e| failed(e.to_string()))?;
        }
        ArchiveKind::Zip => {
            let archive_arg = archive.display().to_string();
            let staging_arg = staging.path().display().to_string();
            runner
                .run("unzip", &["-q", archive_arg.as_str(), "-d", staging_arg.as_str()], parent, &BTreeMap::new())
                .map_err(|e| failed(e.to_string()))?;
        }
    }

    let entries = fs::read_dir(staging.path())?
        .collect::<io::Result<Vec<_>>>()?;

    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        // Single top-level directory: it is the source tree
        fs::rename(entries[0].path(), dest).map_err(|e| failed(e.to_string()))?;
    } else {
        fs::create_dir_all(dest)?;
        for entry in entries {
            fs::rename(entry.path(), dest.join(entry.file_name()))
                .map_err(|e| failed(e.to_string()))?;
        }
    }

    debug!("Extracted {} to {}", archive.display(), dest.display());
    Ok(())
}

/// Applies one patch file to a source tree
pub trait PatchApplier: Send + Sync {
    fn apply(&self, patch: &Path, source_dir: &Path, strip: u32) -> Result<()>;
}

/// Applies patches with the host `patch` tool
#[derive(Debug, Clone)]
pub struct PatchCommand {
    runner: ToolRunner,
}

impl PatchCommand {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

impl PatchApplier for PatchCommand {
    fn apply(&self, patch: &Path, source_dir: &Path, strip: u32) -> Result<()> {
        if !patch.is_file() {
            return Err(Error::PatchFailed {
                patch: patch.display().to_string(),
                reason: "patch file not found".to_string(),
            });
        }

        let strip_arg = format!("-p{strip}");
        let dir_arg = source_dir.display().to_string();
        let patch_arg = patch.display().to_string();
        self.runner
            .run(
                "patch",
                &["-t", strip_arg.as_str(), "-d", dir_arg.as_str(), "-i", patch_arg.as_str()],
                source_dir,
                &BTreeMap::new(),
            )
            .map_err(|e| Error::PatchFailed {
                patch: patch.display().to_string(),
                reason: match e.output_tail().last() {
                    Some(line) => format!("{e}: {line}"),
                    None => e.to_string(),
                },
            })?;
        Ok(())
    }
}
