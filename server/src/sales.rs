//! Sales pipeline triggers: lead intake and the follow-up / stale-offer
//! notification scan.
//!
//! The scan is a mutation trigger — it finds leads that deserve attention and
//! hands each one to the dispatcher; it owns no delivery logic.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::middleware::Claims;
use crate::db::models::SalesLead;
use crate::notify::dispatch;
use crate::state::AppState;

/// Days since first offer (and since last activity) before a lead counts as stale.
const STALE_OFFER_DAYS: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub company_name: String,
    pub owner_user_id: Option<i64>,
    pub stage: Option<String>,
    pub next_follow_up_date: Option<String>,
    pub first_offer_date: Option<String>,
    pub last_activity_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunNotificationsResponse {
    pub status: String,
    pub followup: usize,
    pub stale: usize,
}

/// Lead fields needed to build a notification.
struct DueLead {
    id: i64,
    owner_user_id: i64,
    company_name: String,
}

/// POST /sales/leads — Create a pipeline lead.
pub async fn create_lead(
    State(state): State<AppState>,
    _claims: Claims,
    Json(req): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<SalesLead>), (StatusCode, String)> {
    if req.company_name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Company name is required".to_string()));
    }

    let db = state.db.clone();
    let lead = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let stage = req.stage.unwrap_or_else(|| "New".to_string());
        conn.execute(
            "INSERT INTO sales_leads
                 (company_name, owner_user_id, stage, next_follow_up_date, first_offer_date, last_activity_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
            rusqlite::params![
                req.company_name.trim(),
                req.owner_user_id,
                stage,
                req.next_follow_up_date,
                req.first_offer_date,
                req.last_activity_at
            ],
        )
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        let id = conn.last_insert_rowid();

        conn.query_row(
            "SELECT id, company_name, owner_user_id, stage, next_follow_up_date, first_offer_date, last_activity_at, created_at
             FROM sales_leads WHERE id = ?1",
            rusqlite::params![id],
            |row| {
                Ok(SalesLead {
                    id: row.get(0)?,
                    company_name: row.get(1)?,
                    owner_user_id: row.get(2)?,
                    stage: row.get(3)?,
                    next_follow_up_date: row.get(4)?,
                    first_offer_date: row.get(5)?,
                    last_activity_at: row.get(6)?,
                    created_at: row.get(7)?,
                })
            },
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    })
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Task join error".to_string()))??;

    Ok((StatusCode::CREATED, Json(lead)))
}

/// POST /sales/notifications/run — Scan open leads and notify their owners:
/// one notification per lead due for follow-up today, one per lead gone
/// stale after an offer. Leads without an owner are skipped.
pub async fn run_notifications(
    State(state): State<AppState>,
    _claims: Claims,
) -> Result<Json<RunNotificationsResponse>, (StatusCode, String)> {
    let db = state.db.clone();

    let (due_list, stale_list) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, owner_user_id, company_name
                 FROM sales_leads
                 WHERE stage NOT IN ('Won', 'Lost')
                   AND owner_user_id IS NOT NULL
                   AND next_follow_up_date = date('now')",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let due_list: Vec<DueLead> = stmt
            .query_map([], |row| {
                Ok(DueLead {
                    id: row.get(0)?,
                    owner_user_id: row.get(1)?,
                    company_name: row.get(2)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn
            .prepare(
                "SELECT id, owner_user_id, company_name
                 FROM sales_leads
                 WHERE stage NOT IN ('Won', 'Lost')
                   AND owner_user_id IS NOT NULL
                   AND first_offer_date IS NOT NULL
                   AND julianday('now') - julianday(first_offer_date) >= ?1
                   AND (last_activity_at IS NULL
                        OR julianday('now') - julianday(last_activity_at) >= ?1)",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let stale_list: Vec<DueLead> = stmt
            .query_map(rusqlite::params![STALE_OFFER_DAYS], |row| {
                Ok(DueLead {
                    id: row.get(0)?,
                    owner_user_id: row.get(1)?,
                    company_name: row.get(2)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>((due_list, stale_list))
    })
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Task join error".to_string()))??;

    for lead in &due_list {
        let message = format!("Follow-up due today: {}", lead.company_name);
        if let Err(e) = dispatch::notify(
            &state.db,
            &state.registry,
            &[lead.owner_user_id],
            "sales_followup_due",
            &message,
            Some(json!({ "lead_id": lead.id })),
        )
        .await
        {
            tracing::error!(lead_id = lead.id, error = %e, "Follow-up notification failed");
        }
    }

    for lead in &stale_list {
        let message = format!("{}+ days since offer: {}", STALE_OFFER_DAYS, lead.company_name);
        if let Err(e) = dispatch::notify(
            &state.db,
            &state.registry,
            &[lead.owner_user_id],
            "sales_offer_stale",
            &message,
            Some(json!({ "lead_id": lead.id })),
        )
        .await
        {
            tracing::error!(lead_id = lead.id, error = %e, "Stale-offer notification failed");
        }
    }

    tracing::info!(
        followup = due_list.len(),
        stale = stale_list.len(),
        "Sales notification scan complete"
    );

    Ok(Json(RunNotificationsResponse {
        status: "ok".to_string(),
        followup: due_list.len(),
        stale: stale_list.len(),
    }))
}
