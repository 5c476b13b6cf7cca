use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
    pub corrupt: bool,
}

impl ImageFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPartition {
    pub name: String,
    pub files: Vec<ImageFile>,
}

impl ClassPartition {
    pub fn corrupt_count(&self) -> usize {
        self.files.iter().filter(|f| f.corrupt).count()
    }

    /// Files eligible for upload.
    pub fn uploadable(&self, skip_corrupt: bool) -> Vec<&ImageFile> {
        self.files
            .iter()
            .filter(|f| !(skip_corrupt && f.corrupt))
            .collect()
    }
}

/// Class-partitioned view of the dataset root at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub root: PathBuf,
    pub classes: Vec<ClassPartition>,
}

impl Dataset {
    pub fn class_names(&self) -> Vec<String> {
        self.classes.iter().map(|c| c.name.clone()).collect()
    }

    pub fn total_images(&self) -> usize {
        self.classes.iter().map(|c| c.files.len()).sum()
    }

    pub fn summary(&self) -> DatasetSummary {
        let mut summary = DatasetSummary::default();
        for class in &self.classes {
            summary.classes.insert(
                class.name.clone(),
                ClassStats {
                    total_images: class.files.len(),
                    corrupt_images: class.corrupt_count(),
                },
            );
            summary.corrupt_images.extend(
                class
                    .files
                    .iter()
                    .filter(|f| f.corrupt)
                    .map(|f| f.path.to_string_lossy().into_owned()),
            );
        }
        summary.total_images = self.total_images();
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    pub total_images: usize,
    pub corrupt_images: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_images: usize,
    pub classes: BTreeMap<String, ClassStats>,
    pub corrupt_images: Vec<String>,
}
