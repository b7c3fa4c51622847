use anyhow::{Context, Result};
use sqlx::FromRow;
use tokio::time::{Duration as TokioDuration, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

const SWEEP_INTERVAL_MINUTES: u64 = 15;
const SWEEP_BATCH_SIZE: i64 = 50;

#[derive(FromRow)]
struct PendingDeletion {
    id: Uuid,
    bucket: String,
    object_path: String,
}

/// Background worker that retries object-storage deletions which failed
/// during a file delete. Runs for the lifetime of the process.
pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        let interval = TokioDuration::from_secs(SWEEP_INTERVAL_MINUTES * 60);
        loop {
            if let Err(err) = run_sweep(&state).await {
                error!(?err, "storage reconciliation sweep failed");
            }
            sleep(interval).await;
        }
    });
}

async fn run_sweep(state: &AppState) -> Result<()> {
    let pool = state.pool();

    let pending = sqlx::query_as::<_, PendingDeletion>(
        "SELECT id, bucket, object_path FROM storage_reconciliation WHERE resolved_at IS NULL ORDER BY created_at LIMIT $1",
    )
    .bind(SWEEP_BATCH_SIZE)
    .fetch_all(&pool)
    .await
    .context("failed to fetch pending storage reconciliation entries")?;

    let mut resolved = 0_u64;
    let mut still_pending = 0_u64;

    for entry in pending {
        match state
            .storage()
            .delete_object_in(&entry.bucket, &entry.object_path)
            .await
        {
            Ok(()) => {
                sqlx::query(
                    "UPDATE storage_reconciliation SET resolved_at = NOW() WHERE id = $1",
                )
                .bind(entry.id)
                .execute(&pool)
                .await
                .context("failed to mark reconciliation entry resolved")?;
                resolved += 1;
            }
            Err(err) => {
                warn!(?err, entry = %entry.id, object_path = %entry.object_path, "reconciliation retry failed");
                sqlx::query("UPDATE storage_reconciliation SET failure_reason = $2 WHERE id = $1")
                    .bind(entry.id)
                    .bind(format!("{err:#}"))
                    .execute(&pool)
                    .await
                    .context("failed to update reconciliation failure reason")?;
                still_pending += 1;
            }
        }
    }

    if resolved > 0 || still_pending > 0 {
        info!(resolved, still_pending, "storage reconciliation sweep completed");
    }

    Ok(())
}
