use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub path: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepository {
    pub path: String,
    pub name: String,
    pub description: Option<String>,
}

impl Repository {
    pub async fn create(pool: &SqlitePool, input: &CreateRepository) -> Result<Self, DbError> {
        if Self::find_by_path(pool, &input.path).await?.is_some() {
            return Err(DbError::RepositoryConflict);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO repositories (id, path, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&input.path)
        .bind(&input.name)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(DbError::RepositoryNotFound)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM repositories WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn find_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM repositories WHERE path = ?")
            .bind(path)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>("SELECT * FROM repositories ORDER BY created_at ASC")
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Deletes the row. The caller (the Orchestrator) is responsible for
    /// removing filesystem/container artifacts first — this only cascades
    /// within the State Store, per spec §3.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM repositories WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::RepositoryNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn create_and_find_round_trips() {
        let db = DBService::connect_in_memory().await.unwrap();
        let repo = Repository::create(
            &db.pool,
            &CreateRepository {
                path: "/tmp/r".into(),
                name: "r".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        let found = Repository::find_by_id(&db.pool, repo.id).await.unwrap();
        assert_eq!(found.unwrap().path, "/tmp/r");
    }

    #[tokio::test]
    async fn duplicate_path_conflicts() {
        let db = DBService::connect_in_memory().await.unwrap();
        let input = CreateRepository {
            path: "/tmp/r".into(),
            name: "r".into(),
            description: None,
        };
        Repository::create(&db.pool, &input).await.unwrap();
        let err = Repository::create(&db.pool, &input).await.unwrap_err();
        assert!(matches!(err, DbError::RepositoryConflict));
    }
}
