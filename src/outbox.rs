use crate::db;
use crate::mailer::{MailMessage, Mailer};
use crate::model::MailKind;
use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

/// Deliver the next due notification, if any. Returns whether a task was
/// picked up. Failures back off exponentially and stay queued.
#[instrument(skip_all)]
pub async fn process_next_task(
    pool: &SqlitePool,
    mailer: &dyn Mailer,
    max_backoff_secs: i64,
) -> Result<bool> {
    if let Some((id, kind, payment_id, attempt)) = db::next_due_mail(pool).await? {
        let Some(kind_enum) = MailKind::parse_kind(&kind) else {
            warn!(id, kind, payment_id, "unknown mail kind in outbox; backoff");
            db::backoff_mail(pool, id, attempt, max_backoff_secs).await?;
            return Ok(true);
        };
        let res = async {
            let payment = db::fetch_payment_for_mail(pool, payment_id).await?;
            mailer.send(&MailMessage::render(kind_enum, &payment)).await
        }
        .await;
        match res {
            Ok(_) => {
                db::delete_mail(pool, id).await?;
                info!(id, kind, payment_id, "mail task succeeded");
            }
            Err(err) => {
                warn!(?err, id, kind, payment_id, attempt, "mail task failed; backoff");
                db::backoff_mail(pool, id, attempt, max_backoff_secs).await?;
            }
        }
        return Ok(true);
    }
    Ok(false)
}
