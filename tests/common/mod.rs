//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use dataset_sync_cli::{RemoteClient, UploadError, UploadReceipt, UploadRequest};

/// Fake remote client: succeeds unless the image's file name is listed as
/// always failing. Records every call.
#[derive(Default)]
pub struct FakeClient {
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, u32>>,
    annotations: Mutex<HashMap<String, Option<String>>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(names: &[&str]) -> Self {
        FakeClient {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self, name: &str) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// File name of the annotation sent with `name`, if any.
    pub fn annotation_for(&self, name: &str) -> Option<String> {
        self.annotations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .flatten()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl RemoteClient for FakeClient {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadReceipt, UploadError> {
        let name = file_name(request.image_path);
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.clone())
            .or_insert(0) += 1;
        self.annotations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), request.annotation_path.map(file_name));

        if self.failing.contains(&name) {
            return Err(UploadError::Rejected {
                status: 500,
                body: "fake failure".into(),
            });
        }
        Ok(UploadReceipt {
            id: Some(format!("remote-{name}")),
            link: None,
            duplicate: false,
        })
    }
}

/// Create an empty file, including parent directories.
pub fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"fixture").unwrap();
}

/// `train/images/{a.jpg,b.png}`, `train/labels/a.txt`, empty `val/images`,
/// no `test` directory.
pub fn sample_dataset(root: &Path) {
    touch(&root.join("train/images/a.jpg"));
    touch(&root.join("train/images/b.png"));
    touch(&root.join("train/labels/a.txt"));
    std::fs::create_dir_all(root.join("val/images")).unwrap();
}
