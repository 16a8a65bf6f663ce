use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::repository::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "worktree_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorktreeStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl std::fmt::Display for WorktreeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorktreeStatus::Stopped => "stopped",
            WorktreeStatus::Starting => "starting",
            WorktreeStatus::Running => "running",
            WorktreeStatus::Stopping => "stopping",
            WorktreeStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Worktree {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub name: String,
    pub branch: String,
    pub path: String,
    pub status: WorktreeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorktree {
    pub repository_id: Uuid,
    pub name: String,
    pub branch: String,
    pub path: String,
}

impl Worktree {
    /// Fails with `conflict` if `(repository_id, name)` exists; `not_found`
    /// if the repository is absent. Inserts with status = stopped (spec
    /// §4.1).
    pub async fn create(pool: &SqlitePool, input: &CreateWorktree) -> Result<Self, DbError> {
        if Repository::find_by_id(pool, input.repository_id)
            .await?
            .is_none()
        {
            return Err(DbError::RepositoryNotFound);
        }
        if Self::get_by_name(pool, input.repository_id, &input.name)
            .await?
            .is_some()
        {
            return Err(DbError::WorktreeConflict(input.name.clone()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO worktrees (id, repository_id, name, branch, path, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'stopped', ?, ?)",
        )
        .bind(id)
        .bind(input.repository_id)
        .bind(&input.name)
        .bind(&input.branch)
        .bind(&input.path)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(DbError::WorktreeNotFound)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>("SELECT * FROM worktrees WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_name(
        pool: &SqlitePool,
        repository_id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, DbError> {
        let row = sqlx::query_as::<_, Self>(
            "SELECT * FROM worktrees WHERE repository_id = ? AND name = ?",
        )
        .bind(repository_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn list_by_repo(pool: &SqlitePool, repository_id: Uuid) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>(
            "SELECT * FROM worktrees WHERE repository_id = ? ORDER BY created_at ASC",
        )
        .bind(repository_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Resolves a bare worktree name with no repository context, as used by
    /// the attach endpoints (spec §6: `/api/ws/attach/{worktree}`). Fails
    /// with `AmbiguousWorktreeName` if more than one repository has a
    /// worktree by that name.
    pub async fn find_by_name_globally(pool: &SqlitePool, name: &str) -> Result<Option<Self>, DbError> {
        let mut rows = sqlx::query_as::<_, Self>("SELECT * FROM worktrees WHERE name = ?")
            .bind(name)
            .fetch_all(pool)
            .await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            _ => Err(DbError::AmbiguousWorktreeName(name.to_string())),
        }
    }

    /// All worktrees, regardless of repository — used by the reconciliation
    /// sweep on startup (spec §4.4).
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>("SELECT * FROM worktrees ORDER BY created_at ASC")
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_by_status(
        pool: &SqlitePool,
        status: WorktreeStatus,
    ) -> Result<Vec<Self>, DbError> {
        let rows = sqlx::query_as::<_, Self>("SELECT * FROM worktrees WHERE status = ?")
            .bind(status)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Compare-and-set on status: the only permitted way to change it. Fails
    /// with `conflict` if the current status isn't `from` — this is how the
    /// Orchestrator serializes concurrent start/stop attempts against the
    /// same worktree (spec §4.1).
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        from: WorktreeStatus,
        to: WorktreeStatus,
    ) -> Result<Self, DbError> {
        let mut tx = pool.begin().await?;
        let current = sqlx::query_as::<_, Self>("SELECT * FROM worktrees WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::WorktreeNotFound)?;

        if current.status != from {
            return Err(DbError::StatusConflict {
                expected: from.to_string(),
                actual: current.status.to_string(),
            });
        }

        let result = sqlx::query("UPDATE worktrees SET status = ? WHERE id = ? AND status = ?")
            .bind(to)
            .bind(id)
            .bind(from)
            .execute(&mut *tx)
            .await?;

        // The `SELECT` above isn't what makes this a CAS under a real
        // multi-connection pool — two transactions can both observe
        // `status = from` before either commits. This guarded `UPDATE` is
        // the actual compare-and-set; if it matched zero rows, another
        // transaction won the race and committed first.
        if result.rows_affected() == 0 {
            return Err(DbError::StatusConflict {
                expected: from.to_string(),
                actual: current.status.to_string(),
            });
        }

        let updated = sqlx::query_as::<_, Self>("SELECT * FROM worktrees WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM worktrees WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::WorktreeNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DBService, models::repository::CreateRepository};

    async fn seed_repo(db: &DBService) -> Repository {
        Repository::create(
            &db.pool,
            &CreateRepository {
                path: "/tmp/r".into(),
                name: "r".into(),
                description: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_requires_existing_repository() {
        let db = DBService::connect_in_memory().await.unwrap();
        let err = Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: Uuid::new_v4(),
                name: "feat".into(),
                branch: "feat".into(),
                path: "/tmp/r-feat".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::RepositoryNotFound));
    }

    #[tokio::test]
    async fn duplicate_name_in_repo_conflicts() {
        let db = DBService::connect_in_memory().await.unwrap();
        let repo = seed_repo(&db).await;
        let input = CreateWorktree {
            repository_id: repo.id,
            name: "feat".into(),
            branch: "feat".into(),
            path: "/tmp/r-feat".into(),
        };
        Worktree::create(&db.pool, &input).await.unwrap();
        let err = Worktree::create(&db.pool, &input).await.unwrap_err();
        assert!(matches!(err, DbError::WorktreeConflict(_)));
    }

    /// Exercises real concurrency, unlike `cas_rejects_wrong_expected_status`
    /// which runs its two calls sequentially against a single-connection
    /// in-memory database. A file-backed database gets the pool's real
    /// `max_connections`, so two tasks can genuinely both reach their
    /// `SELECT` before either's guarded `UPDATE` commits; exactly one must
    /// still win.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cas_under_real_concurrency_exactly_one_winner() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("concurrent.sqlite");
        let db = DBService::connect(db_path.to_str().unwrap()).await.unwrap();
        let repo = seed_repo(&db).await;
        let wt = Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: repo.id,
                name: "feat".into(),
                branch: "feat".into(),
                path: "/tmp/r-feat".into(),
            },
        )
        .await
        .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = db.pool.clone();
                tokio::spawn(async move {
                    Worktree::update_status(&pool, wt.id, WorktreeStatus::Stopped, WorktreeStatus::Starting).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(DbError::StatusConflict { .. })))
            .count();

        assert_eq!(wins, 1);
        assert_eq!(conflicts, results.len() - 1);
    }

    #[tokio::test]
    async fn cas_rejects_wrong_expected_status() {
        let db = DBService::connect_in_memory().await.unwrap();
        let repo = seed_repo(&db).await;
        let wt = Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: repo.id,
                name: "feat".into(),
                branch: "feat".into(),
                path: "/tmp/r-feat".into(),
            },
        )
        .await
        .unwrap();

        let ok = Worktree::update_status(
            &db.pool,
            wt.id,
            WorktreeStatus::Stopped,
            WorktreeStatus::Starting,
        )
        .await
        .unwrap();
        assert_eq!(ok.status, WorktreeStatus::Starting);

        let err = Worktree::update_status(
            &db.pool,
            wt.id,
            WorktreeStatus::Stopped,
            WorktreeStatus::Starting,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::StatusConflict { .. }));
    }

    #[tokio::test]
    async fn find_by_name_globally_rejects_cross_repo_ambiguity() {
        let db = DBService::connect_in_memory().await.unwrap();
        let repo_a = seed_repo(&db).await;
        let repo_b = Repository::create(
            &db.pool,
            &CreateRepository {
                path: "/tmp/r2".into(),
                name: "r2".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: repo_a.id,
                name: "feat".into(),
                branch: "feat".into(),
                path: "/tmp/r-feat".into(),
            },
        )
        .await
        .unwrap();

        let found = Worktree::find_by_name_globally(&db.pool, "feat").await.unwrap();
        assert!(found.is_some());

        Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: repo_b.id,
                name: "feat".into(),
                branch: "feat".into(),
                path: "/tmp/r2-feat".into(),
            },
        )
        .await
        .unwrap();

        let err = Worktree::find_by_name_globally(&db.pool, "feat").await.unwrap_err();
        assert!(matches!(err, DbError::AmbiguousWorktreeName(_)));
    }

    #[tokio::test]
    async fn delete_repository_cascades_worktrees() {
        let db = DBService::connect_in_memory().await.unwrap();
        let repo = seed_repo(&db).await;
        Worktree::create(
            &db.pool,
            &CreateWorktree {
                repository_id: repo.id,
                name: "feat".into(),
                branch: "feat".into(),
                path: "/tmp/r-feat".into(),
            },
        )
        .await
        .unwrap();

        Repository::delete(&db.pool, repo.id).await.unwrap();
        let remaining = Worktree::list_by_repo(&db.pool, repo.id).await.unwrap();
        assert!(remaining.is_empty());
    }
}
