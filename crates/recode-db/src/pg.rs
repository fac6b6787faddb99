//! Postgres-backed Job Record store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use recode_core::models::{ConversionJob, JobStatus, MediaFormat, ObjectLocation};
use recode_core::ConvertError;

use crate::job_store::JobStore;

/// Job Record repository over a Postgres pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), ConvertError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ConvertError::Database(format!("migration failed: {}", e)))
    }

    fn row_to_job(row: &PgRow) -> Result<ConversionJob, ConvertError> {
        let status: String = row.get("status");
        let format: String = row.get("output_format");

        let output = match row.get::<Option<String>, _>("output_key") {
            Some(key) => Some(ObjectLocation {
                store_id: row
                    .get::<Option<String>, _>("output_store_id")
                    .unwrap_or_default(),
                key,
                size_bytes: row
                    .get::<Option<i64>, _>("output_size_bytes")
                    .unwrap_or_default() as u64,
            }),
            None => None,
        };

        Ok(ConversionJob {
            id: row.get("id"),
            status: status.parse::<JobStatus>()?,
            input: ObjectLocation {
                store_id: row.get("input_store_id"),
                key: row.get("input_key"),
                size_bytes: row.get::<i64, _>("input_size_bytes") as u64,
            },
            output,
            output_format: format.parse::<MediaFormat>()?,
            bitrate_kbps: row.get::<Option<i32>, _>("bitrate_kbps").map(|b| b as u32),
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            expires_at: row.get("expires_at"),
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &ConversionJob) -> Result<(), ConvertError> {
        sqlx::query(
            r#"
            INSERT INTO conversion_jobs (
                id, status, input_store_id, input_key, input_size_bytes,
                output_format, bitrate_kbps, created_at, updated_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(&job.input.store_id)
        .bind(&job.input.key)
        .bind(job.input.size_bytes as i64)
        .bind(job.output_format.to_string())
        .bind(job.bitrate_kbps.map(|b| b as i32))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ConvertError::Database(format!("failed to create job: {}", e)))?;

        tracing::debug!(job_id = %job.id, "Job record created");
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ConversionJob>, ConvertError> {
        let row = sqlx::query(
            r#"
            SELECT id, status, input_store_id, input_key, input_size_bytes,
                   output_store_id, output_key, output_size_bytes,
                   output_format, bitrate_kbps, error,
                   created_at, updated_at, expires_at
            FROM conversion_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ConvertError::Database(format!("failed to get job: {}", e)))?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        output: Option<ObjectLocation>,
        error: Option<String>,
    ) -> Result<(), ConvertError> {
        ConversionJob::check_invariant(status, output.as_ref())?;

        let result = sqlx::query(
            r#"
            UPDATE conversion_jobs
            SET status = $2,
                output_store_id = $3,
                output_key = $4,
                output_size_bytes = $5,
                error = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(output.as_ref().map(|o| o.store_id.clone()))
        .bind(output.as_ref().map(|o| o.key.clone()))
        .bind(output.as_ref().map(|o| o.size_bytes as i64))
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| ConvertError::Database(format!("failed to update job: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ConvertError::JobNotFound(id));
        }

        tracing::debug!(job_id = %id, status = %status, "Job status updated");
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, ConvertError> {
        let result = sqlx::query("DELETE FROM conversion_jobs WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| ConvertError::Database(format!("failed to sweep jobs: {}", e)))?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "Expired job records purged");
        }
        Ok(purged)
    }
}
