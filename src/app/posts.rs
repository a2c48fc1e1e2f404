use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::post::{Post, PostDraft};
use crate::infra::db::Db;

/// Shared projection for every post listing: post row joined with its author
/// and (optional) group.
pub(crate) const POST_SELECT: &str =
    "SELECT p.id, p.author_id, u.username AS author_username, u.display_name AS author_display_name, \
            p.group_id, g.slug AS group_slug, g.title AS group_title, \
            p.text, p.image_key, p.created_at \
     FROM posts p \
     JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id";

pub(crate) fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        author_display_name: row.get("author_display_name"),
        group_id: row.get("group_id"),
        group_slug: row.get("group_slug"),
        group_title: row.get("group_title"),
        text: row.get("text"),
        image_key: row.get("image_key"),
        image_url: None,
        created_at: row.get("created_at"),
    }
}

/// What an edit does with the stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageUpdate {
    Keep,
    Replace(String),
    Clear,
}

impl ImageUpdate {
    /// Whether the image stored before the edit is no longer referenced.
    pub fn drops_previous(&self) -> bool {
        !matches!(self, ImageUpdate::Keep)
    }

    /// Key of a newly uploaded image, if any.
    pub fn new_key(&self) -> Option<&str> {
        match self {
            ImageUpdate::Replace(key) => Some(key),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        draft: PostDraft,
        image_key: Option<String>,
    ) -> Result<Post> {
        let row = sqlx::query(
            "WITH inserted_post AS ( \
                INSERT INTO posts (author_id, group_id, text, image_key) \
                VALUES ($1, $2, $3, $4) \
                RETURNING id, author_id, group_id, text, image_key, created_at \
             ) \
             SELECT p.*, u.username AS author_username, u.display_name AS author_display_name, \
                    g.slug AS group_slug, g.title AS group_title \
             FROM inserted_post p \
             JOIN users u ON u.id = p.author_id \
             LEFT JOIN groups g ON g.id = p.group_id",
        )
        .bind(author_id)
        .bind(draft.group_id)
        .bind(draft.text)
        .bind(image_key)
        .fetch_one(self.db.pool())
        .await?;

        Ok(post_from_row(&row))
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE p.id = $1", POST_SELECT))
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Applies an edit. Only rows owned by `author_id` are touched; `None`
    /// means no such post for that author.
    pub async fn update_post(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        draft: PostDraft,
        image: ImageUpdate,
    ) -> Result<Option<Post>> {
        let clear = image == ImageUpdate::Clear;
        let replacement = match image {
            ImageUpdate::Replace(key) => Some(key),
            ImageUpdate::Keep | ImageUpdate::Clear => None,
        };

        let row = sqlx::query(
            "WITH updated_post AS ( \
                UPDATE posts \
                SET text = $3, group_id = $4, \
                    image_key = CASE WHEN $6 THEN NULL ELSE COALESCE($5, image_key) END \
                WHERE id = $1 AND author_id = $2 \
                RETURNING id, author_id, group_id, text, image_key, created_at \
             ) \
             SELECT p.*, u.username AS author_username, u.display_name AS author_display_name, \
                    g.slug AS group_slug, g.title AS group_title \
             FROM updated_post p \
             JOIN users u ON u.id = p.author_id \
             LEFT JOIN groups g ON g.id = p.group_id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(draft.text)
        .bind(draft.group_id)
        .bind(replacement)
        .bind(clear)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Deletes the post (comments cascade). Returns the removed image key, if
    /// any, wrapped in `Some` when a row was deleted.
    pub async fn delete_post(&self, post_id: Uuid, author_id: Uuid) -> Result<Option<Option<String>>> {
        let image_key: Option<Option<String>> = sqlx::query_scalar(
            "DELETE FROM posts WHERE id = $1 AND author_id = $2 RETURNING image_key",
        )
        .bind(post_id)
        .bind(author_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(image_key)
    }

    pub async fn count_by_author(&self, author_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_update_tracks_previous_and_new_keys() {
        assert!(!ImageUpdate::Keep.drops_previous());
        assert!(ImageUpdate::Clear.drops_previous());

        let replace = ImageUpdate::Replace("posts/a/b.gif".to_string());
        assert!(replace.drops_previous());
        assert_eq!(replace.new_key(), Some("posts/a/b.gif"));
        assert_eq!(ImageUpdate::Clear.new_key(), None);
    }
}
