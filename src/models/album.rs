use serde::Serialize;
use sqlx::FromRow;

/// Album model. The pipeline only reads the flags that gate uploads and
/// package downloads; album CRUD lives elsewhere.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub allow_download: bool,
    pub expires_at: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Album {
    pub fn is_expired(&self) -> bool {
        match &self.expires_at {
            Some(ts) => chrono::DateTime::parse_from_rfc3339(ts)
                .map(|t| t.with_timezone(&chrono::Utc) < chrono::Utc::now())
                .unwrap_or(false),
            None => false,
        }
    }
}
