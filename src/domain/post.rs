use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub author_display_name: String,
    pub group_id: Option<Uuid>,
    pub group_slug: Option<String>,
    pub group_title: Option<String>,
    pub text: String,
    #[serde(skip_serializing)]
    pub image_key: Option<String>,
    /// Public URL for the image (populated at response time)
    #[serde(skip_deserializing)]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Post {
    pub fn author_name(&self) -> &str {
        if self.author_display_name.trim().is_empty() {
            &self.author_username
        } else {
            &self.author_display_name
        }
    }
}

/// Validated fields for a new or edited post. The author never comes from here.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<Uuid>,
}
