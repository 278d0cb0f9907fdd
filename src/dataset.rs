// Dataset model: splits, assets and the matcher that pairs each image with
// its optional YOLO label file.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use tracing::{debug, warn};

/// Image extensions picked up by the matcher (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Extension of YOLO text label files.
pub const ANNOTATION_EXTENSION: &str = "txt";

/// Named partition of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SplitName {
    Train,
    Valid,
    Test,
}

impl SplitName {
    pub const ALL: [SplitName; 3] = [SplitName::Train, SplitName::Valid, SplitName::Test];

    /// Name the remote service expects.
    pub fn as_str(self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Valid => "valid",
            SplitName::Test => "test",
        }
    }

    /// Directory the split lives under on disk. `valid` is stored as `val`.
    pub fn dir_name(self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Valid => "val",
            SplitName::Test => "test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(SplitName::Train),
            "valid" => Ok(SplitName::Valid),
            "test" => Ok(SplitName::Test),
            other => Err(format!("unknown split '{other}' (expected train, valid or test)")),
        }
    }
}

/// One split of the local dataset. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub name: SplitName,
    pub image_dir: PathBuf,
    /// `None` disables annotation matching for this split.
    pub annotation_dir: Option<PathBuf>,
}

impl Split {
    pub fn new(name: SplitName, image_dir: impl Into<PathBuf>) -> Self {
        Split {
            name,
            image_dir: image_dir.into(),
            annotation_dir: None,
        }
    }

    pub fn with_annotations(mut self, dir: impl Into<PathBuf>) -> Self {
        self.annotation_dir = Some(dir.into());
        self
    }
}

/// The `<root>/{train,val,test}/{images,labels}` directory convention.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
    with_labels: bool,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DatasetLayout {
            root: root.into(),
            with_labels: true,
        }
    }

    /// Upload images only, ignoring any `labels` directories.
    pub fn without_labels(mut self) -> Self {
        self.with_labels = false;
        self
    }

    pub fn split(&self, name: SplitName) -> Split {
        let base = self.root.join(name.dir_name());
        let split = Split::new(name, base.join("images"));
        if self.with_labels {
            split.with_annotations(base.join("labels"))
        } else {
            split
        }
    }

    /// Splits in canonical order, optionally restricted to one.
    pub fn splits(&self, only: Option<SplitName>) -> Vec<Split> {
        SplitName::ALL
            .into_iter()
            .filter(|name| only.map_or(true, |o| o == *name))
            .map(|name| self.split(name))
            .collect()
    }
}

/// Metadata sent along with every upload of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    pub batch_name: Option<String>,
    pub tags: Vec<String>,
    pub sequence_number: Option<u32>,
    pub sequence_size: Option<u32>,
}

/// One image and its optional label file: the unit of upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub image_path: PathBuf,
    /// Only set when a label with exactly the image's stem exists.
    pub annotation_path: Option<PathBuf>,
    pub split: Option<SplitName>,
}

impl Asset {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Asset {
            image_path: image_path.into(),
            annotation_path: None,
            split: None,
        }
    }

    /// File name used in report lines.
    pub fn display_name(&self) -> String {
        self.image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image_path.display().to_string())
    }
}

/// The split's image directory does not exist. Not fatal: the split is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMissing {
    pub split: SplitName,
    pub image_dir: PathBuf,
}

impl fmt::Display for SplitMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} does not exist (split {})",
            self.image_dir.display(),
            self.split
        )
    }
}

/// Finite sequence of assets for one split, in file-name order.
#[derive(Debug)]
pub struct SplitAssets {
    inner: std::vec::IntoIter<Asset>,
}

impl Iterator for SplitAssets {
    type Item = Asset;

    fn next(&mut self) -> Option<Asset> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SplitAssets {}

/// Walks a split's image directory and pairs images with label files.
pub struct AssetMatcher;

impl AssetMatcher {
    pub fn assets(split: &Split) -> Result<SplitAssets, SplitMissing> {
        let missing = || SplitMissing {
            split: split.name,
            image_dir: split.image_dir.clone(),
        };

        if !split.image_dir.is_dir() {
            return Err(missing());
        }
        let entries = match std::fs::read_dir(&split.image_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %split.image_dir.display(), "failed to read image directory: {e}");
                return Err(missing());
            }
        };

        let mut images: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_supported_image(path))
            .collect();
        images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let labels = split
            .annotation_dir
            .as_deref()
            .map(list_annotations)
            .unwrap_or_default();

        let assets: Vec<Asset> = images
            .into_iter()
            .map(|image_path| {
                let annotation_path = split
                    .annotation_dir
                    .as_deref()
                    .zip(annotation_name(&image_path))
                    .filter(|(_, name)| labels.contains(name))
                    .map(|(dir, name)| dir.join(name));
                Asset {
                    image_path,
                    annotation_path,
                    split: Some(split.name),
                }
            })
            .collect();

        debug!(split = %split.name, count = assets.len(), "matched assets");
        Ok(SplitAssets {
            inner: assets.into_iter(),
        })
    }
}

/// Checks if a path has a recognized image extension.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// `<stem>.txt` for an image path.
fn annotation_name(image_path: &Path) -> Option<OsString> {
    let mut name = image_path.file_stem()?.to_os_string();
    name.push(".");
    name.push(ANNOTATION_EXTENSION);
    Some(name)
}

/// File names of the label files in a directory. Listing once keeps the stem
/// match exact and case-sensitive even on case-insensitive filesystems.
fn list_annotations(dir: &Path) -> HashSet<OsString> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "no annotation directory");
        return HashSet::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ANNOTATION_EXTENSION)
        })
        .filter_map(|path| path.file_name().map(|n| n.to_os_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn train_split(root: &Path) -> Split {
        DatasetLayout::new(root).split(SplitName::Train)
    }

    #[test]
    fn pairs_images_with_same_stem_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("train/images/a.jpg"));
        touch(&root.join("train/images/b.png"));
        touch(&root.join("train/labels/a.txt"));

        let assets: Vec<Asset> = AssetMatcher::assets(&train_split(root)).unwrap().collect();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].image_path, root.join("train/images/a.jpg"));
        assert_eq!(
            assets[0].annotation_path,
            Some(root.join("train/labels/a.txt"))
        );
        assert_eq!(assets[1].annotation_path, None);
        assert!(assets.iter().all(|a| a.split == Some(SplitName::Train)));
    }

    #[test]
    fn no_prefix_or_case_insensitive_label_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("train/images/cat.jpg"));
        touch(&root.join("train/images/dog.jpg"));
        touch(&root.join("train/labels/cat_1.txt"));
        touch(&root.join("train/labels/ca.txt"));
        touch(&root.join("train/labels/DOG.txt"));
        touch(&root.join("train/labels/dog.json"));

        let assets: Vec<Asset> = AssetMatcher::assets(&train_split(root)).unwrap().collect();

        assert_eq!(assets.len(), 2);
        assert!(assets.iter().all(|a| a.annotation_path.is_none()));
    }

    #[test]
    fn skips_directories_and_unknown_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("train/images/keep.JPEG"));
        touch(&root.join("train/images/photo.webp"));
        touch(&root.join("train/images/notes.txt"));
        touch(&root.join("train/images/raw.cr2"));
        fs::create_dir_all(root.join("train/images/nested.jpg")).unwrap();

        let names: Vec<String> = AssetMatcher::assets(&train_split(root))
            .unwrap()
            .map(|a| a.display_name())
            .collect();

        assert_eq!(names, vec!["keep.JPEG", "photo.webp"]);
    }

    #[test]
    fn assets_are_sorted_by_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for name in ["c.png", "a.png", "b.png"] {
            touch(&root.join("train/images").join(name));
        }

        let names: Vec<String> = AssetMatcher::assets(&train_split(root))
            .unwrap()
            .map(|a| a.display_name())
            .collect();

        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn missing_image_dir_signals_split_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let split = DatasetLayout::new(tmp.path()).split(SplitName::Test);

        let err = AssetMatcher::assets(&split).unwrap_err();

        assert_eq!(err.split, SplitName::Test);
        assert_eq!(err.image_dir, tmp.path().join("test/images"));
    }

    #[test]
    fn labels_ignored_without_annotation_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("train/images/a.jpg"));
        touch(&root.join("train/labels/a.txt"));

        let split = DatasetLayout::new(root)
            .without_labels()
            .split(SplitName::Train);
        let assets: Vec<Asset> = AssetMatcher::assets(&split).unwrap().collect();

        assert_eq!(assets.len(), 1);
        assert!(assets[0].annotation_path.is_none());
    }

    #[test]
    fn layout_maps_valid_to_val_directory() {
        let layout = DatasetLayout::new("data");
        let valid = layout.split(SplitName::Valid);
        assert_eq!(valid.image_dir, Path::new("data/val/images"));
        assert_eq!(valid.annotation_dir.as_deref(), Some(Path::new("data/val/labels")));

        let only_test = layout.splits(Some(SplitName::Test));
        assert_eq!(only_test.len(), 1);
        assert_eq!(only_test[0].name, SplitName::Test);
        assert_eq!(layout.splits(None).len(), 3);
    }

    #[test]
    fn split_name_parses_remote_names() {
        assert_eq!("valid".parse::<SplitName>(), Ok(SplitName::Valid));
        assert!("val".parse::<SplitName>().is_err());
        assert_eq!(SplitName::Valid.to_string(), "valid");
    }
}
