use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response};
use std::fmt::Display;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::auth::Credential;
use crate::config::Settings;
use crate::{ConverterError, Result};

pub mod types;

pub use types::{RemoteFile, UploadedFile};
use types::{ListResponse, CREATE_FIELDS, LIST_FIELDS};

/// Drive API host
pub const DRIVE_BASE_URL: &str = "https://www.googleapis.com";

/// Remote file storage used by the batch converter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Untrashed videos directly under `folder_id`, ordered by name
    async fn list_video_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>>;

    /// Stream the content of `file_id` into `dest`
    async fn download(&self, file_id: &str, dest: &Path) -> Result<()>;

    /// Create a new file named `name` under `folder_id`
    async fn upload(&self, local_path: &Path, folder_id: &str, name: &str) -> Result<UploadedFile>;

    /// Whether an untrashed file named exactly `name` exists under `folder_id`
    async fn check_exists(&self, folder_id: &str, name: &str) -> Result<bool>;
}

/// Google Drive v3 REST client
pub struct DriveClient {
    http: Client,
    credential: Credential,
    base_url: String,
    video_mime_types: Vec<String>,
    upload_mime_type: String,
    show_progress: bool,
}

impl DriveClient {
    pub fn new(http: Client, credential: Credential, settings: &Settings) -> Self {
        Self {
            http,
            credential,
            base_url: DRIVE_BASE_URL.to_string(),
            video_mime_types: settings.video_mime_types.clone(),
            upload_mime_type: settings.transcode.audio_mime_type.clone(),
            show_progress: true,
        }
    }

    /// Point the client at another host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable or disable the download progress bar
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.base_url)
    }

    /// Fetch one page of a files query
    async fn list_page(
        &self,
        query: &str,
        fields: &str,
        page_token: Option<&str>,
    ) -> Result<ListResponse> {
        let token = self.credential.bearer_token().await?;

        let mut request = self
            .http
            .get(self.files_url())
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("fields", fields),
                ("orderBy", "name"),
                ("pageSize", "1000"),
            ]);

        if let Some(page_token) = page_token {
            request = request.query(&[("pageToken", page_token)]);
        }

        tracing::debug!("Drive query: {}", query);

        let response = request.send().await.context("Failed to query Drive files")?;
        let response = ensure_success(response, "list files").await?;

        response
            .json::<ListResponse>()
            .await
            .context("Failed to parse Drive file listing")
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(total.unwrap_or(0));
        let template = if total.is_some() {
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {bytes}/{total_bytes}"
        } else {
            "{spinner:.green} [{elapsed_precise}] {bytes} {msg}"
        };

        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            progress.set_style(style.progress_chars("#>-"));
        }

        progress
    }
}

#[async_trait]
impl StorageClient for DriveClient {
    async fn list_video_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let query = types::video_query(folder_id, &self.video_mime_types);
        let mut files = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let page = self
                .list_page(&query, LIST_FIELDS, next_page_token.as_deref())
                .await?;

            files.extend(page.files.into_iter().map(RemoteFile::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
        let token = self.credential.bearer_token().await?;

        let response = self
            .http
            .get(format!("{}/{}", self.files_url(), file_id))
            .query(&[("alt", "media")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transfer_error("download", e))?;

        let response = ensure_success(response, "download").await?;

        let progress = self.progress_bar(response.content_length());

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transfer_error("download", e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }

        file.flush().await?;
        progress.finish_and_clear();

        tracing::debug!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(())
    }

    async fn upload(&self, local_path: &Path, folder_id: &str, name: &str) -> Result<UploadedFile> {
        let token = self.credential.bearer_token().await?;

        let content = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;

        // Open a resumable session; Drive answers with the session URI
        let response = self
            .http
            .post(self.upload_url())
            .query(&[("uploadType", "resumable"), ("fields", CREATE_FIELDS)])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", &self.upload_mime_type)
            .header("X-Upload-Content-Length", content.len().to_string())
            .json(&serde_json::json!({
                "name": name,
                "parents": [folder_id],
            }))
            .send()
            .await
            .map_err(|e| transfer_error("upload", e))?;

        let response = ensure_success(response, "upload").await?;

        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| transfer_error("upload", "response has no `Location` header"))?;

        tracing::debug!("Uploading {} bytes to resumable session", content.len());

        let response = self
            .http
            .put(&session_url)
            .header(CONTENT_TYPE, &self.upload_mime_type)
            .body(content)
            .send()
            .await
            .map_err(|e| transfer_error("upload", e))?;

        let response = ensure_success(response, "upload").await?;

        response
            .json::<UploadedFile>()
            .await
            .map_err(|e| transfer_error("upload", e))
    }

    async fn check_exists(&self, folder_id: &str, name: &str) -> Result<bool> {
        let query = types::name_query(folder_id, name);
        let page = self.list_page(&query, "files(id)", None).await?;

        Ok(!page.files.is_empty())
    }
}

fn transfer_error(action: &str, err: impl Display) -> anyhow::Error {
    ConverterError::Transfer(format!("{} failed: {}", action, err)).into()
}

/// Turn a non-2xx response into a transfer error carrying the API's message
async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or(body);

    Err(transfer_error(action, format!("HTTP {}: {}", status, message.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenRecord;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DriveClient {
        let credential = Credential::User(TokenRecord {
            token: "test-token".to_string(),
            refresh_token: None,
            token_uri: crate::auth::token::GOOGLE_TOKEN_URI.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            expiry: None,
            extra: serde_json::Map::new(),
        });

        DriveClient::new(Client::new(), credential, &Settings::default())
            .with_base_url(server.uri())
            .with_progress(false)
    }

    #[tokio::test]
    async fn test_list_video_files_follows_pages() {
        let server = MockServer::start().await;
        let expected_query = "'in-folder' in parents and trashed = false and \
             (mimeType = 'video/mp4' or mimeType = 'video/webm' or mimeType = 'video/quicktime')";

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": "c", "name": "c.webm", "mimeType": "video/webm"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("q", expected_query))
            .and(query_param("orderBy", "name"))
            .and(query_param("fields", LIST_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nextPageToken": "page-2",
                "files": [
                    {"id": "a", "name": "a.mp4", "mimeType": "video/mp4", "size": "2048"},
                    {"id": "b", "name": "b.mov", "mimeType": "video/quicktime", "size": "10"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server).list_video_files("in-folder").await.unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mov", "c.webm"]);
        assert_eq!(files[0].size, Some(2048));
        assert_eq!(files[2].size, None);
    }

    #[tokio::test]
    async fn test_list_video_files_empty_folder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
            .mount(&server)
            .await;

        let files = client(&server).list_video_files("empty").await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_download_streams_to_disk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/file-1"))
            .and(query_param("alt", "media"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("video.mp4");

        client(&server).download("file-1", &dest).await.unwrap();

        assert_eq!(fs_err::read(&dest).unwrap(), vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn test_download_failure_is_transfer_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "File not found: missing."}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server)
            .download("missing", &dir.path().join("x.mp4"))
            .await
            .unwrap_err();

        match err.downcast_ref::<ConverterError>() {
            Some(ConverterError::Transfer(msg)) => {
                assert!(msg.contains("404"));
                assert!(msg.contains("File not found: missing."));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_uses_resumable_session() {
        let server = MockServer::start().await;
        let session = format!("{}/upload/session/abc", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "resumable"))
            .and(query_param("fields", CREATE_FIELDS))
            .and(header("X-Upload-Content-Type", "audio/mp4"))
            .and(body_json(json!({"name": "talk.m4a", "parents": ["out-folder"]})))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session.as_str()))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .and(body_string("audio-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new-id",
                "webViewLink": "https://drive.google.com/file/d/new-id/view"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("talk.m4a");
        fs_err::write(&local, "audio-bytes").unwrap();

        let uploaded = client(&server)
            .upload(&local, "out-folder", "talk.m4a")
            .await
            .unwrap();

        assert_eq!(uploaded.id, "new-id");
        assert_eq!(
            uploaded.web_view_link.as_deref(),
            Some("https://drive.google.com/file/d/new-id/view")
        );
    }

    #[tokio::test]
    async fn test_upload_session_without_location_is_transfer_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("talk.m4a");
        fs_err::write(&local, "audio-bytes").unwrap();

        let err = client(&server)
            .upload(&local, "out-folder", "talk.m4a")
            .await
            .unwrap_err();

        match err.downcast_ref::<ConverterError>() {
            Some(ConverterError::Transfer(msg)) => assert!(msg.contains("Location")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_body_is_transfer_error() {
        let server = MockServer::start().await;
        let session = format!("{}/upload/session/abc", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "The user's Drive storage quota has been exceeded."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("talk.m4a");
        fs_err::write(&local, "audio-bytes").unwrap();

        let err = client(&server)
            .upload(&local, "out-folder", "talk.m4a")
            .await
            .unwrap_err();

        match err.downcast_ref::<ConverterError>() {
            Some(ConverterError::Transfer(msg)) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("storage quota"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_exists() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param(
                "q",
                "'out' in parents and name = 'present.m4a' and trashed = false",
            ))
            .and(query_param("fields", "files(id)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": "x"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
            .mount(&server)
            .await;

        let drive = client(&server);
        assert!(drive.check_exists("out", "present.m4a").await.unwrap());
        assert!(!drive.check_exists("out", "absent.m4a").await.unwrap());
    }
}
