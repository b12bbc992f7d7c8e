//! The photo store collaborator.
//!
//! A [`PhotoStore`] persists extracted images as assets, optionally inside a
//! named album, and deletes them again by identifier.
//! [`DirectoryPhotoStore`] keeps assets as PNG files on disk:
//!
//! ```text
//! <root>/<asset-id>.png                 default library
//! <root>/albums/<album>/<asset-id>.png  album members
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use uuid::Uuid;

use crate::{error::FrameMarkError, frame::AssetId, preferences::normalize_album_name};

const ALBUMS_DIRECTORY: &str = "albums";
const ASSET_EXTENSION: &str = "png";

/// Persists images and removes them by identifier.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Save `image` and return its identifier. When `album` is given the
    /// asset goes into that album, which is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::StoreError`] or
    /// [`FrameMarkError::NotAuthorized`].
    async fn save(
        &self,
        image: &DynamicImage,
        album: Option<&str>,
    ) -> Result<AssetId, FrameMarkError>;

    /// Delete an asset. An asset that no longer exists counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::StoreError`] or
    /// [`FrameMarkError::NotAuthorized`].
    async fn delete(&self, asset_id: &AssetId) -> Result<(), FrameMarkError>;
}

/// One asset found by [`DirectoryPhotoStore::assets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Asset identifier.
    pub id: AssetId,
    /// Album the asset belongs to, `None` for the default library.
    pub album: Option<String>,
    /// File holding the image.
    pub path: PathBuf,
}

/// A photo store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryPhotoStore {
    root: PathBuf,
}

impl DirectoryPhotoStore {
    /// Use `root` as the library directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::IoError`] if the directory cannot be
    /// created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, FrameMarkError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        log::debug!("Opened photo library at {}", root.display());
        Ok(Self { root })
    }

    /// The library directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every asset currently in the library, default library first, then
    /// albums in name order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameMarkError::IoError`] if a directory cannot be read.
    pub fn assets(&self) -> Result<Vec<StoredAsset>, FrameMarkError> {
        let mut assets = collect_assets(&self.root, None)?;

        let albums_root = self.root.join(ALBUMS_DIRECTORY);
        if albums_root.is_dir() {
            let mut albums: Vec<PathBuf> = fs::read_dir(&albums_root)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_dir())
                .collect();
            albums.sort();
            for album in albums {
                let name = album
                    .file_name()
                    .map(|n| album_name_from_directory(&n.to_string_lossy()));
                assets.extend(collect_assets(&album, name)?);
            }
        }

        Ok(assets)
    }

    /// Location of an existing asset, if any.
    pub fn locate(&self, asset_id: &AssetId) -> Option<PathBuf> {
        locate_asset(&self.root, asset_id)
    }
}

#[async_trait]
impl PhotoStore for DirectoryPhotoStore {
    async fn save(
        &self,
        image: &DynamicImage,
        album: Option<&str>,
    ) -> Result<AssetId, FrameMarkError> {
        let directory = match album {
            Some(name) => self
                .root
                .join(ALBUMS_DIRECTORY)
                .join(album_directory_name(name)),
            None => self.root.clone(),
        };
        let image = image.clone();
        let asset_id = AssetId::new(Uuid::new_v4().to_string());
        let path = directory.join(format!("{asset_id}.{ASSET_EXTENSION}"));

        tokio::task::spawn_blocking(move || -> Result<(), FrameMarkError> {
            // find-or-create the album
            fs::create_dir_all(&directory).map_err(store_error)?;
            image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|error| FrameMarkError::StoreError(error.to_string()))?;
            log::debug!("Saved asset {}", path.display());
            Ok(())
        })
        .await
        .map_err(|error| FrameMarkError::StoreError(format!("save task failed: {error}")))??;

        Ok(asset_id)
    }

    async fn delete(&self, asset_id: &AssetId) -> Result<(), FrameMarkError> {
        let root = self.root.clone();
        let asset_id = asset_id.clone();

        tokio::task::spawn_blocking(move || {
            let Some(path) = locate_asset(&root, &asset_id) else {
                log::debug!("Asset {asset_id} already gone");
                return Ok(());
            };
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::debug!("Deleted asset {}", path.display());
                    Ok(())
                }
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
                Err(error) => Err(store_error(error)),
            }
        })
        .await
        .map_err(|error| FrameMarkError::StoreError(format!("delete task failed: {error}")))?
    }
}

fn store_error(error: std::io::Error) -> FrameMarkError {
    if error.kind() == ErrorKind::PermissionDenied {
        FrameMarkError::NotAuthorized
    } else {
        FrameMarkError::StoreError(error.to_string())
    }
}

/// Album names become single path components. The name is normalised like
/// the album preference (trimmed, blank means [`DEFAULT_ALBUM_NAME`]), then
/// `%`, path separators, `:` and NUL are percent-encoded, as are the
/// special `.`/`..` names. Distinct normalised names never share a
/// directory.
///
/// [`DEFAULT_ALBUM_NAME`]: crate::DEFAULT_ALBUM_NAME
fn album_directory_name(name: &str) -> String {
    let name = normalize_album_name(name);
    if name == "." || name == ".." {
        return "%2E".repeat(name.len());
    }
    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' | '/' | '\\' | ':' | '\0' => encoded.push_str(&format!("%{:02X}", c as u32)),
            other => encoded.push(other),
        }
    }
    encoded
}

/// Inverse of [`album_directory_name`] for directories found on disk.
fn album_name_from_directory(directory: &str) -> String {
    let mut decoded = String::with_capacity(directory.len());
    let mut chars = directory.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            decoded.push(c);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        match u8::from_str_radix(&hex, 16) {
            Ok(byte) => decoded.push(char::from(byte)),
            Err(_) => {
                decoded.push('%');
                decoded.push_str(&hex);
            }
        }
    }
    decoded
}

fn is_valid_asset_id(asset_id: &AssetId) -> bool {
    Uuid::parse_str(asset_id.as_str()).is_ok()
}

fn locate_asset(root: &Path, asset_id: &AssetId) -> Option<PathBuf> {
    if !is_valid_asset_id(asset_id) {
        return None;
    }
    let file_name = format!("{asset_id}.{ASSET_EXTENSION}");

    let direct = root.join(&file_name);
    if direct.is_file() {
        return Some(direct);
    }

    let albums = fs::read_dir(root.join(ALBUMS_DIRECTORY)).ok()?;
    albums
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join(&file_name))
        .find(|candidate| candidate.is_file())
}

fn collect_assets(
    directory: &Path,
    album: Option<String>,
) -> Result<Vec<StoredAsset>, FrameMarkError> {
    let mut assets: Vec<StoredAsset> = fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ASSET_EXTENSION)
        })
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            Uuid::parse_str(&stem).ok()?;
            Some(StoredAsset {
                id: AssetId::new(stem),
                album: album.clone(),
                path,
            })
        })
        .collect();
    assets.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(assets)
}
