// Scripted remote client shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::api::{RemoteClient, UploadReceipt, UploadRequest};
use crate::error::UploadError;

#[derive(Debug, Clone, Copy)]
enum Script {
    FailTimes(u32),
    AlwaysFail,
    RejectAuth,
}

/// Succeeds for every file unless told otherwise. Behaviour is keyed by the
/// image's file name.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, u32>>,
    queries: Mutex<HashMap<String, Vec<(&'static str, String)>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(mut self, name: &str, times: u32) -> Self {
        self.scripts.insert(name.to_string(), Script::FailTimes(times));
        self
    }

    pub fn always_fail(mut self, name: &str) -> Self {
        self.scripts.insert(name.to_string(), Script::AlwaysFail);
        self
    }

    pub fn reject_auth(mut self, name: &str) -> Self {
        self.scripts.insert(name.to_string(), Script::RejectAuth);
        self
    }

    pub fn calls(&self, name: &str) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    pub fn last_query(&self, name: &str) -> Option<Vec<(&'static str, String)>> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl RemoteClient for ScriptedClient {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadReceipt, UploadError> {
        let name = request
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            let count = calls.entry(name.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), request.query_params());

        let rejected = |status| UploadError::Rejected {
            status,
            body: "scripted".into(),
        };
        match self.scripts.get(&name) {
            Some(Script::AlwaysFail) => Err(rejected(503)),
            Some(Script::RejectAuth) => Err(rejected(401)),
            Some(Script::FailTimes(n)) if call <= *n => Err(rejected(503)),
            _ => Ok(UploadReceipt {
                id: Some(format!("id-{name}")),
                link: None,
                duplicate: false,
            }),
        }
    }
}
