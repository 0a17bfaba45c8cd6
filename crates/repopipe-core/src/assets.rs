//! Staging of the repository seed payload
//!
//! The payload directory is content-addressed: its id is a blake3 digest over
//! every file's relative path and bytes, walked in sorted order, so the object
//! key only changes when the payload does. The same walk produces the zip
//! archive that is uploaded under that key.

use crate::error::AssetError;
use crate::plan::Payload;
use serde::Serialize;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const MANIFEST_FILE: &str = "assets.json";
const MANIFEST_VERSION: u32 = 1;

/// Bucket used when `assetBucket` is not configured
pub fn default_asset_bucket(account: &str, region: &str) -> String {
    format!("repopipe-assets-{}-{}", account, region)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    Zip,
}

/// A payload ready to be published and referenced by the template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedAsset {
    pub id: String,
    pub source_path: PathBuf,
    pub packaging: Packaging,
    pub bucket: String,
    pub object_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetManifest {
    pub version: u32,
    pub assets: Vec<StagedAsset>,
}

impl AssetManifest {
    pub fn new(assets: Vec<StagedAsset>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            assets,
        }
    }
}

pub fn stage_payload(payload: &Payload, bucket: &str) -> Result<StagedAsset, AssetError> {
    let id = hash_directory(&payload.path)?;
    debug!(payload = %payload.name, id = %id, "Staged payload");
    Ok(StagedAsset {
        object_key: format!("{}.zip", id),
        id,
        source_path: payload.path.clone(),
        packaging: Packaging::Zip,
        bucket: bucket.to_string(),
    })
}

impl StagedAsset {
    /// Zip the payload directory. Entries follow the same sorted walk as the
    /// content hash and carry a fixed timestamp, so equal ids give equal bytes.
    pub fn archive(&self) -> Result<Vec<u8>, AssetError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for file in payload_files(&self.source_path)? {
            let contents = fs::read(&file.path).map_err(|e| AssetError::io(&file.path, e))?;
            writer
                .start_file(file.relative.as_str(), options)
                .map_err(|e| AssetError::archive(&file.relative, e))?;
            writer
                .write_all(&contents)
                .map_err(|e| AssetError::io(&file.path, e))?;
        }
        let bytes = writer
            .finish()
            .map_err(|e| AssetError::archive(&self.object_key, e))?
            .into_inner();

        debug!(key = %self.object_key, bytes = bytes.len(), "Archived payload");
        Ok(bytes)
    }
}

struct PayloadFile {
    /// `/`-separated path below the payload root
    relative: String,
    path: PathBuf,
}

/// Regular files below `root` in file-name order. Symlinks are followed so a
/// linked file contributes its target's contents.
fn payload_files(root: &Path) -> Result<Vec<PayloadFile>, AssetError> {
    if !root.is_dir() {
        return Err(AssetError::missing_payload(root));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        // Separator-independent so the id is stable across platforms
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(PayloadFile {
            relative,
            path: entry.into_path(),
        });
    }
    Ok(files)
}

fn hash_directory(root: &Path) -> Result<String, AssetError> {
    let mut hasher = blake3::Hasher::new();
    for file in payload_files(root)? {
        let contents = fs::read(&file.path).map_err(|e| AssetError::io(&file.path, e))?;
        hasher.update(file.relative.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
