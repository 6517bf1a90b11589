//! Local asset directories that end up in S3.
//!
//! Two packagings exist:
//! - [`Packaging::ZipDirectory`]: the directory is zipped into the out dir and
//!   published as a single object (`assets/<hash>.zip`). Used for Lambda code.
//! - [`Packaging::Files`]: every file is published under `assets/<hash>/`.
//!   Used for website content, which is then copied into the site bucket.
//!
//! The hash is an Adler-32 over the sorted relative paths and the file
//! contents, so any change to the directory yields new object keys and a new
//! deployment.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub const ASSET_KEY_PREFIX: &str = "assets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Packaging {
    ZipDirectory,
    Files,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    pub id: String,
    pub path: PathBuf,
    pub packaging: Packaging,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedAsset {
    pub id: String,
    pub source_path: PathBuf,
    pub packaging: Packaging,
    pub hash: String,
    /// object key for zips, key prefix (with trailing `/`) for files
    pub object_key: String,
    /// the zip written during synth, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub staged_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub assets: Vec<StagedAsset>,
}

impl AssetManifest {
    pub fn get(&self, id: &str) -> Result<&StagedAsset> {
        self.assets
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::AssetNotFound(format!("{id} (not staged)")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::Parsing(e.to_string()))
    }
}

/// Symlinks are followed, to files and to directories. A link back into a
/// directory that is already being walked is an error.
fn iter_files_recursively<P: AsRef<Path>>(
    start_dir: P,
    ancestors: &mut Vec<PathBuf>,
    callback: &mut impl FnMut(PathBuf) -> Result<()>,
) -> Result<()> {
    let canonical = std::fs::canonicalize(start_dir.as_ref())
        .map_err(|e| Error::Io(format!("Failed to resolve {:?}\n{:?}", start_dir.as_ref(), e)))?;
    if ancestors.contains(&canonical) {
        return Err(Error::Io(format!("Symlink loop at {:?}", start_dir.as_ref())));
    }
    ancestors.push(canonical);
    let readdir = std::fs::read_dir(start_dir.as_ref())
        .map_err(|e| Error::Io(format!("Failed to read dir {:?}\n{:?}", start_dir.as_ref(), e)))?;
    for entry in readdir {
        let direntry = entry.map_err(|e| Error::Io(format!("Failed to get readdir entry from {:?}\n{:?}", start_dir.as_ref(), e)))?;
        let path = direntry.path();
        let metadata = std::fs::metadata(&path).map_err(|e| Error::Io(format!("Failed to get metadata of {:?}\n{:?}", path, e)))?;
        if metadata.is_dir() {
            iter_files_recursively(&path, ancestors, callback)?;
        } else {
            callback(path)?;
        }
    }
    ancestors.pop();
    Ok(())
}

/// Files under `dir` as `(relative path with '/' separators, absolute path)`,
/// sorted by relative path.
pub fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Err(Error::AssetNotFound(dir.display().to_string()));
    }
    let mut files = vec![];
    iter_files_recursively(dir, &mut vec![], &mut |path| {
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| Error::Io(format!("{:?} is not under {:?}: {e}", path, dir)))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        files.push((key, path));
        Ok(())
    })?;
    files.sort();
    Ok(files)
}

pub fn hash_directory(dir: &Path) -> Result<String> {
    let mut hasher = adler::Adler32::new();
    for (relative, path) in list_files(dir)? {
        let contents = std::fs::read(&path).map_err(|e| Error::Io(format!("Failed to read {:?}: {e}", path)))?;
        hasher.write_slice(relative.as_bytes());
        hasher.write_slice(&[0]);
        hasher.write_slice(&contents);
    }
    Ok(format!("{:08x}", hasher.checksum()))
}

/// Zips `dir` into `dest`. Entries are sorted and carry a fixed timestamp so
/// the same directory always produces the same archive.
///
/// The archive is written to a temporary file next to `dest` and only moved
/// into place once complete, so `dest` never holds a partial zip.
pub fn zip_directory(dir: &Path, dest: &Path) -> Result<()> {
    let dest_dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file = NamedTempFile::new_in(dest_dir).map_err(|e| Error::Io(format!("Failed to create a temp file in {:?}: {e}", dest_dir)))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    for (relative, path) in list_files(dir)? {
        let contents = std::fs::read(&path).map_err(|e| Error::Io(format!("Failed to read {:?}: {e}", path)))?;
        writer
            .start_file(relative.as_str(), options)
            .map_err(|e| Error::Packaging(e.to_string()))?;
        writer
            .write_all(&contents)
            .map_err(|e| Error::Packaging(e.to_string()))?;
    }
    let file = writer.finish().map_err(|e| Error::Packaging(e.to_string()))?;
    file.persist(dest)
        .map_err(|e| Error::Io(format!("Failed to move zip into {:?}: {e}", dest)))?;
    Ok(())
}

/// true if `path` opens as a zip archive with every entry readable.
fn is_readable_zip(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let Ok(mut archive) = zip::ZipArchive::new(file) else {
        return false;
    };
    (0..archive.len()).all(|i| match archive.by_index(i) {
        Ok(mut entry) => std::io::copy(&mut entry, &mut std::io::sink()).is_ok(),
        Err(_) => false,
    })
}

pub fn stage(source: &AssetSource, out_dir: &Path) -> Result<StagedAsset> {
    let hash = hash_directory(&source.path)?;
    let (object_key, staged_path) = match source.packaging {
        Packaging::ZipDirectory => {
            let staged_path = out_dir.join(format!("asset.{hash}.zip"));
            if staged_path.exists() && is_readable_zip(&staged_path) {
                debug!(asset = %source.id, path = %staged_path.display(), "asset already staged");
            } else {
                if staged_path.exists() {
                    warn!(asset = %source.id, path = %staged_path.display(), "staged zip is unreadable, rebuilding");
                }
                zip_directory(&source.path, &staged_path)?;
                info!(asset = %source.id, path = %staged_path.display(), "staged asset");
            }
            (format!("{ASSET_KEY_PREFIX}/{hash}.zip"), Some(staged_path))
        }
        Packaging::Files => (format!("{ASSET_KEY_PREFIX}/{hash}/"), None),
    };
    Ok(StagedAsset {
        id: source.id.clone(),
        source_path: source.path.clone(),
        packaging: source.packaging,
        hash,
        object_key,
        staged_path,
    })
}

pub fn stage_all(sources: &[AssetSource], out_dir: &Path) -> Result<AssetManifest> {
    std::fs::create_dir_all(out_dir).map_err(|e| Error::Io(format!("Failed to create {:?}: {e}", out_dir)))?;
    let mut manifest = AssetManifest::default();
    for source in sources {
        manifest.assets.push(stage(source, out_dir)?);
    }
    Ok(manifest)
}

/// Content type for an uploaded website file, by extension.
pub fn content_type(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") | Some("map") => "application/json",
        Some("txt") => "text/plain",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
