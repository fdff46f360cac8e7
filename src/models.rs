use serde::{Deserialize, Serialize};
use std::fmt;

/// A Raindrop tag as returned by the tag listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    /// The tag name doubles as its identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// Number of bookmarks carrying the tag
    #[serde(default)]
    pub count: u64,
}

impl Tag {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            count: 0,
        }
    }
}

/// `GET /tags` response body
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    pub result: bool,
    #[serde(default)]
    pub items: Vec<Tag>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// Generic `{"result": bool}` response body
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResult {
    pub result: bool,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// `DELETE /tags` request body
#[derive(Debug, Clone, Serialize)]
pub struct DeleteTagsRequest {
    pub tags: Vec<String>,
}

/// `POST /oauth/access_token` request body
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
}

/// `POST /oauth/access_token` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Why a tag was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Allowlisted,
    DryRun,
}

/// Result of visiting one tag in the deletion loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    Skipped(SkipReason),
    Succeeded,
    Failed(String),
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionOutcome::Skipped(SkipReason::Allowlisted) => write!(f, "skipped (allowlisted)"),
            DeletionOutcome::Skipped(SkipReason::DryRun) => write!(f, "skipped (dry run)"),
            DeletionOutcome::Succeeded => write!(f, "deleted"),
            DeletionOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
