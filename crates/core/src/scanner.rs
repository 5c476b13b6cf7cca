//! Walks a class-partitioned image tree and flags files that fail to decode.

use crate::models::{ClassPartition, Dataset, ImageFile};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("dataset root {0:?} does not exist, check the dataset path")]
    RootMissing(PathBuf),
    #[error("no class folders found inside {0:?}")]
    NoClassFolders(PathBuf),
    #[error("invalid extension pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("failed to list {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scans `root`, one subdirectory per class, decoding every image whose
/// extension is in `extensions`.
pub fn scan(root: &Path, extensions: &[String]) -> Result<Dataset, ScanError> {
    info!("Scanning dataset at: {}", root.display());
    if !root.is_dir() {
        return Err(ScanError::RootMissing(root.to_path_buf()));
    }

    let matcher = build_globset(extensions)?;
    let class_dirs = list_class_dirs(root)?;
    if class_dirs.is_empty() {
        return Err(ScanError::NoClassFolders(root.to_path_buf()));
    }
    info!(
        "Found class folders: {:?}",
        class_dirs.iter().map(|(name, _)| name).collect::<Vec<_>>()
    );

    let mut classes = Vec::with_capacity(class_dirs.len());
    for (name, dir) in class_dirs {
        let paths = collect_images(&dir, &matcher);
        info!("Class '{}': {} images found", name, paths.len());

        let files: Vec<ImageFile> = paths.into_iter().map(inspect).collect();
        let corrupt = files.iter().filter(|f| f.corrupt).count();
        if corrupt > 0 {
            info!("Class '{}': {} corrupt images", name, corrupt);
        }
        classes.push(ClassPartition { name, files });
    }

    let dataset = Dataset {
        root: root.to_path_buf(),
        classes,
    };
    let summary = dataset.summary();
    info!(
        "Dataset check complete: {} images, {} corrupt",
        summary.total_images,
        summary.corrupt_images.len()
    );
    Ok(dataset)
}

/// Decodes the whole image; any error means the file is unusable.
pub fn validate(path: &Path) -> image::ImageResult<()> {
    image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(())
}

pub fn is_corrupt(path: &Path) -> bool {
    validate(path).is_err()
}

fn inspect(path: PathBuf) -> ImageFile {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    // A file whose metadata cannot be read cannot be uploaded either.
    let size = match fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable image metadata");
            return ImageFile {
                path,
                size: 0,
                extension,
                corrupt: true,
            };
        }
    };
    let corrupt = match validate(&path) {
        Ok(()) => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "corrupt image");
            true
        }
    };
    ImageFile {
        path,
        size,
        extension,
        corrupt,
    }
}

fn list_class_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, ScanError> {
    let io_err = |source: std::io::Error| ScanError::Io {
        path: root.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_dir() || is_hidden(&path) {
            continue;
        }
        let Some(raw) = path.file_name() else {
            continue;
        };
        let name = raw.to_string_lossy().into_owned();
        if raw.to_str().is_none() {
            warn!("Class folder {:?} is not valid UTF-8, using '{}'", raw, name);
        }
        dirs.push((name, path));
    }
    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(dirs)
}

fn collect_images(dir: &Path, matcher: &GlobSet) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && matcher.is_match(e.file_name()))
        .map(|e| e.into_path())
        .collect()
}

fn build_globset(extensions: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let glob = GlobBuilder::new(&format!("*.{}", ext.trim_start_matches('.')))
            .case_insensitive(true)
            .build()?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
