use serde::{Deserialize, Serialize};

/// Fields requested when listing candidate videos
pub const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, size)";

/// Fields requested when creating a file
pub const CREATE_FIELDS: &str = "id, webViewLink";

/// A file as listed by Drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
}

/// Handle of a freshly uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

/// Raw `files` resource; Drive sends `size` as a decimal string
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        Self {
            size: file.size.and_then(|s| s.parse::<u64>().ok()),
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
        }
    }
}

/// Quote a value for a Drive search query
pub fn quote_query_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Query for untrashed children of `folder_id` with one of `mime_types`
pub fn video_query(folder_id: &str, mime_types: &[String]) -> String {
    let mut parts = vec![
        format!("{} in parents", quote_query_value(folder_id)),
        "trashed = false".to_string(),
    ];

    if !mime_types.is_empty() {
        let mime_conditions = mime_types
            .iter()
            .map(|mt| format!("mimeType = {}", quote_query_value(mt)))
            .collect::<Vec<_>>()
            .join(" or ");
        parts.push(format!("({})", mime_conditions));
    }

    parts.join(" and ")
}

/// Query for an untrashed child of `folder_id` named exactly `name`
pub fn name_query(folder_id: &str, name: &str) -> String {
    format!(
        "{} in parents and name = {} and trashed = false",
        quote_query_value(folder_id),
        quote_query_value(name)
    )
}
