//! Delivery dispatcher: durable-write-then-best-effort-push.
//!
//! Every notification is persisted before any push is attempted; the stored
//! record is the source of truth and the live push is an optimization. Push
//! outcomes are logged, never returned — callers reason only about whether
//! the event was durably recorded.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::db::DbPool;
use crate::notify::push::PushMessage;
use crate::notify::store;
use crate::ws::ConnectionRegistry;

/// Persist one notification per target user, then push to each target's live
/// connections. Returns the ids of the successfully persisted records.
///
/// A per-user persistence failure (e.g. unknown user id) is logged and that
/// user is skipped — no record, no push. Only a store-wide failure is
/// surfaced to the caller; live-push failures never are.
pub async fn notify(
    db: &DbPool,
    registry: &Arc<ConnectionRegistry>,
    user_ids: &[i64],
    category: &str,
    message: &str,
    payload: Option<Value>,
) -> Result<Vec<i64>, Box<dyn std::error::Error + Send + Sync>> {
    let timestamp = Utc::now().to_rfc3339();
    let data = payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| format!("Payload serialization failed: {}", e))?;

    // Phase 1: durability. Must complete before any push is attempted.
    let persisted = {
        let db = db.clone();
        let targets = user_ids.to_vec();
        let category = category.to_string();
        let message = message.to_string();
        let data = data.clone();
        let timestamp = timestamp.clone();

        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;

            let mut persisted: Vec<(i64, i64)> = Vec::with_capacity(targets.len());
            for user_id in targets {
                match store::insert(&conn, user_id, &message, &category, data.as_deref(), &timestamp)
                {
                    Ok(record_id) => persisted.push((user_id, record_id)),
                    Err(e) => {
                        tracing::warn!(
                            user_id,
                            category = %category,
                            error = %e,
                            "Notification insert failed, skipping user"
                        );
                    }
                }
            }
            Ok::<_, String>(persisted)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))??
    };

    // Phase 2: best-effort push. Non-blocking for the contract — a user with
    // no live connection simply polls the durable record later.
    let envelope = PushMessage::new(category, message, payload, &timestamp).to_ws_message();
    for (user_id, record_id) in &persisted {
        let delivered = registry.send_to_user(*user_id, &envelope);
        tracing::debug!(
            user_id,
            record_id,
            delivered,
            category = %category,
            "Notification pushed"
        );
    }

    tracing::info!(
        category = %category,
        requested = user_ids.len(),
        persisted = persisted.len(),
        "Notification dispatched"
    );

    Ok(persisted.into_iter().map(|(_, record_id)| record_id).collect())
}
