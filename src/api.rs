// API client module: the remote-client seam used by the uploader plus a
// small blocking HTTP implementation that talks to the dataset service.
// The core only sees the `RemoteClient` trait so tests can inject fakes.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Target;
use crate::dataset::{Asset, SplitName, UploadMetadata};
use crate::error::{SetupError, UploadError};

/// Anything that can push one asset to the remote dataset.
///
/// Implementations are called from worker threads when uploads run in
/// parallel, hence `Send + Sync`.
pub trait RemoteClient: Send + Sync {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadReceipt, UploadError>;
}

impl<T: RemoteClient + ?Sized> RemoteClient for &T {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadReceipt, UploadError> {
        (**self).upload(request)
    }
}

/// Every optional field of an upload call. The client omits absent fields
/// from the wire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest<'a> {
    pub image_path: &'a Path,
    pub split: Option<SplitName>,
    pub annotation_path: Option<&'a Path>,
    pub batch_name: Option<&'a str>,
    pub tags: &'a [String],
    pub sequence_number: Option<u32>,
    pub sequence_size: Option<u32>,
}

impl<'a> UploadRequest<'a> {
    pub fn new(asset: &'a Asset, metadata: &'a UploadMetadata) -> Self {
        UploadRequest {
            image_path: &asset.image_path,
            split: asset.split,
            annotation_path: asset.annotation_path.as_deref(),
            batch_name: metadata.batch_name.as_deref(),
            tags: &metadata.tags,
            sequence_number: metadata.sequence_number,
            sequence_size: metadata.sequence_size,
        }
    }

    /// File name sent to the service, both as `name` and as the multipart
    /// file name. Non-UTF-8 bytes are replaced.
    pub fn image_name(&self) -> Option<String> {
        self.image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Query parameters of the image upload call (without the API key).
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = self.image_name() {
            params.push(("name", name));
        }
        if let Some(split) = self.split {
            params.push(("split", split.as_str().to_string()));
        }
        if let Some(batch) = self.batch_name {
            params.push(("batch", batch.to_string()));
        }
        for tag in self.tags {
            params.push(("tag", tag.clone()));
        }
        if let Some(n) = self.sequence_number {
            params.push(("sequence_number", n.to_string()));
        }
        if let Some(n) = self.sequence_size {
            params.push(("sequence_size", n.to_string()));
        }
        params
    }
}

/// What the service told us about a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    pub id: Option<String>,
    pub link: Option<String>,
    /// The service already had this image.
    pub duplicate: bool,
}

/// Raw upload response. Older API versions put the link under `image`.
#[derive(Deserialize, Debug)]
struct UploadResponse {
    id: Option<String>,
    success: Option<bool>,
    duplicate: Option<bool>,
    link: Option<String>,
    image: Option<ImageRef>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct ImageRef {
    link: Option<String>,
}

/// Parse the JSON body of an upload response into a receipt.
pub fn parse_upload_response(body: &str) -> Result<UploadReceipt, UploadError> {
    let resp: UploadResponse = serde_json::from_str(body)
        .map_err(|e| UploadError::InvalidResponse(format!("{e}: {body}")))?;

    let duplicate = resp.duplicate.unwrap_or(false);
    if !duplicate && (resp.success == Some(false) || resp.error.is_some()) {
        let detail = resp
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| body.to_string());
        return Err(UploadError::InvalidResponse(detail));
    }

    let link = resp.link.or_else(|| resp.image.and_then(|i| i.link));
    Ok(UploadReceipt {
        id: resp.id,
        link,
        duplicate,
    })
}

/// Best-effort MIME type from the file extension.
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Blocking HTTP client bound to one workspace/project pair.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    workspace: String,
    project: String,
}

impl ApiClient {
    /// Build the HTTP client and check that the key, workspace and project
    /// are all valid before anything is uploaded.
    pub fn connect(target: &Target) -> Result<Self, SetupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SetupError::ClientInit(e.to_string()))?;

        let api = ApiClient {
            client,
            base_url: target.api_url.trim_end_matches('/').to_string(),
            api_key: target.api_key.clone(),
            workspace: target.workspace.clone(),
            project: target.project.clone(),
        };

        api.probe("").map_err(SetupError::ClientInit)?;
        api.probe(&api.workspace)
            .map_err(|reason| SetupError::WorkspaceNotFound {
                workspace: api.workspace.clone(),
                reason,
            })?;
        api.probe(&format!("{}/{}", api.workspace, api.project))
            .map_err(|reason| SetupError::ProjectNotFound {
                workspace: api.workspace.clone(),
                project: api.project.clone(),
                reason,
            })?;

        info!(workspace = %api.workspace, project = %api.project, "connected");
        Ok(api)
    }

    /// GET `<base>/<path>` with the API key and fail on any non-2xx status.
    /// The root check (`path` empty) is where a bad key fails.
    fn probe(&self, path: &str) -> Result<(), String> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "probing");
        let res = self
            .client
            .get(&url)
            .query(&[("api_key", &self.api_key)])
            .send()
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(status_text(res));
        }
        Ok(())
    }

    /// Attach a YOLO label file to an already uploaded image.
    fn annotate(&self, image_id: &str, annotation_path: &Path) -> Result<(), UploadError> {
        let url = format!(
            "{}/dataset/{}/annotate/{}",
            self.base_url, self.project, image_id
        );
        let body = std::fs::read_to_string(annotation_path).map_err(|source| UploadError::Io {
            path: annotation_path.to_path_buf(),
            source,
        })?;
        let name = annotation_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "labels.txt".into());

        let res = self
            .client
            .post(&url)
            .query(&[("api_key", self.api_key.as_str()), ("name", name.as_str())])
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()?;
        check_status(res).map(|_| ())
    }
}

impl RemoteClient for ApiClient {
    /// Upload the image as multipart/form-data, then the annotation if any.
    fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadReceipt, UploadError> {
        let url = format!("{}/dataset/{}/upload", self.base_url, self.project);

        let bytes = std::fs::read(request.image_path).map_err(|source| UploadError::Io {
            path: request.image_path.to_path_buf(),
            source,
        })?;
        let mut part = multipart::Part::bytes(bytes).mime_str(mime_for(request.image_path))?;
        if let Some(name) = request.image_name() {
            part = part.file_name(name);
        }
        let form = multipart::Form::new().part("file", part);

        let mut query = vec![("api_key", self.api_key.clone())];
        query.extend(request.query_params());

        let res = self.client.post(&url).query(&query).multipart(form).send()?;
        let body = check_status(res)?.text()?;
        let receipt = parse_upload_response(&body)?;

        if let Some(annotation) = request.annotation_path {
            let id = receipt.id.as_deref().ok_or_else(|| {
                UploadError::InvalidResponse("upload response carried no image id".into())
            })?;
            self.annotate(id, annotation)?;
        }
        Ok(receipt)
    }
}

fn check_status(res: Response) -> Result<Response, UploadError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().unwrap_or_default();
    Err(UploadError::Rejected { status, body })
}

fn status_text(res: Response) -> String {
    let status = res.status();
    let txt = res.text().unwrap_or_default();
    format!("{status} - {txt}")
}
