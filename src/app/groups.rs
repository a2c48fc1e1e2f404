use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::domain::group::Group;
use crate::infra::db::Db;

fn group_from_row(row: &PgRow) -> Group {
    Group {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

#[derive(Clone)]
pub struct GroupService {
    db: Db,
}

impl GroupService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, title, slug, description, created_at FROM groups WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(group_from_row))
    }

    /// All groups by title, for the post form's group choice.
    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT id, title, slug, description, created_at FROM groups ORDER BY title, slug",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    /// Inserts a group. `None` when the slug is already taken.
    pub async fn create_group(
        &self,
        title: &str,
        slug: &str,
        description: &str,
    ) -> Result<Option<Group>> {
        let row = sqlx::query(
            "INSERT INTO groups (title, slug, description) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO NOTHING \
             RETURNING id, title, slug, description, created_at",
        )
        .bind(title)
        .bind(slug)
        .bind(description)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(group_from_row))
    }
}
