use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::comment::Comment;
use crate::infra::db::Db;

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        text: row.get("text"),
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn add_comment(&self, post_id: Uuid, author_id: Uuid, text: String) -> Result<Comment> {
        let row = sqlx::query(
            "WITH inserted_comment AS ( \
                INSERT INTO comments (post_id, author_id, text) VALUES ($1, $2, $3) \
                RETURNING id, post_id, author_id, text, created_at \
             ) \
             SELECT c.*, u.username AS author_username \
             FROM inserted_comment c \
             JOIN users u ON u.id = c.author_id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(self.db.pool())
        .await?;

        Ok(comment_from_row(&row))
    }

    /// Comments on a post, oldest first.
    pub async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, u.username AS author_username, c.text, c.created_at \
             FROM comments c \
             JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = $1 \
             ORDER BY c.created_at ASC, c.id ASC",
        )
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }
}
