//! Postgres implementation of the durable prompt store.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::prompt::{PromptEngagement, PromptRow, PromptVersionRow};
use crate::repo::{Counter, PromptDraft, PromptRepo, RepoError};
use crate::workspace::models::PromptStatus;

pub struct PgPromptRepo {
    pool: PgPool,
}

impl PgPromptRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn keywords_json(items: &[crate::workspace::models::KeywordItem]) -> serde_json::Value {
    serde_json::to_value(items).unwrap_or_else(|_| serde_json::Value::Array(vec![]))
}

fn tags_json(tags: &[String]) -> serde_json::Value {
    serde_json::to_value(tags).unwrap_or_else(|_| serde_json::Value::Array(vec![]))
}

#[async_trait]
impl PromptRepo for PgPromptRepo {
    async fn create_prompt(&self, draft: &PromptDraft) -> Result<i64, RepoError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO prompts
                (user_id, topic, language, model_key, body,
                 positive_keywords, negative_keywords, tags, status,
                 published_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                    CASE WHEN $10 THEN NOW() END, 1)
            RETURNING id
            "#,
        )
        .bind(draft.user_id)
        .bind(&draft.topic)
        .bind(&draft.language)
        .bind(&draft.model_key)
        .bind(&draft.body)
        .bind(keywords_json(&draft.positive_keywords))
        .bind(keywords_json(&draft.negative_keywords))
        .bind(tags_json(&draft.tags))
        .bind(draft.status.as_str())
        .bind(draft.publish)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_prompt(&self, id: i64, draft: &PromptDraft) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE prompts
            SET topic = $2, language = $3, model_key = $4, body = $5,
                positive_keywords = $6, negative_keywords = $7, tags = $8,
                status = $9,
                published_at = CASE
                    WHEN $10 AND published_at IS NULL THEN NOW()
                    ELSE published_at
                END,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.topic)
        .bind(&draft.language)
        .bind(&draft.model_key)
        .bind(&draft.body)
        .bind(keywords_json(&draft.positive_keywords))
        .bind(keywords_json(&draft.negative_keywords))
        .bind(tags_json(&draft.tags))
        .bind(draft.status.as_str())
        .bind(draft.publish)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_prompt_meta(
        &self,
        id: i64,
        status: PromptStatus,
        tags: &[String],
        publish: bool,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE prompts
            SET status = $2, tags = $3,
                published_at = CASE
                    WHEN $4 AND published_at IS NULL THEN NOW()
                    ELSE published_at
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(tags_json(tags))
        .bind(publish)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_version(&self, prompt_id: i64, body: &str) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO prompt_versions (prompt_id, body) VALUES ($1, $2)")
            .bind(prompt_id)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_versions(&self, prompt_id: i64, keep: i64) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM prompt_versions
            WHERE prompt_id = $1
              AND id NOT IN (
                  SELECT id FROM prompt_versions
                  WHERE prompt_id = $1
                  ORDER BY id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(prompt_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_versions(&self, prompt_id: i64) -> Result<Vec<PromptVersionRow>, RepoError> {
        Ok(sqlx::query_as::<_, PromptVersionRow>(
            "SELECT * FROM prompt_versions WHERE prompt_id = $1 ORDER BY id DESC",
        )
        .bind(prompt_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn increment_counter(
        &self,
        prompt_id: i64,
        counter: Counter,
        delta: i64,
    ) -> Result<bool, RepoError> {
        // Column names cannot be bound; each counter gets its own statement.
        let sql = match counter {
            Counter::Downloads => "UPDATE prompts SET downloads = downloads + $2 WHERE id = $1",
            Counter::Likes => "UPDATE prompts SET likes = likes + $2 WHERE id = $1",
            Counter::Visits => "UPDATE prompts SET visits = visits + $2 WHERE id = $1",
        };
        let result = sqlx::query(sql)
            .bind(prompt_id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_score(&self, prompt_id: i64, score: f64) -> Result<(), RepoError> {
        sqlx::query("UPDATE prompts SET quality_score = $2 WHERE id = $1")
            .bind(prompt_id)
            .bind(score)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_public_after(
        &self,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<PromptEngagement>, RepoError> {
        Ok(sqlx::query_as::<_, PromptEngagement>(
            r#"
            SELECT id, downloads, likes, visits, updated_at
            FROM prompts
            WHERE status = 'published' AND id > $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn fetch_prompt(&self, id: i64) -> Result<Option<PromptRow>, RepoError> {
        Ok(
            sqlx::query_as::<_, PromptRow>("SELECT * FROM prompts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}
