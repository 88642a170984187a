//! Installation intake: persists a new company with its selected jobs and
//! notifies the technician and secretariat teams.
//!
//! This module is a mutation trigger — it decides that an event is worth a
//! notification and builds the payload, but contains no delivery logic; the
//! dispatcher owns persist-then-push.

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::middleware::Claims;
use crate::db::models::{Company, ROLE_SECRETARIAT, ROLE_TECHNICIAN};
use crate::notify::dispatch;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateInstallationRequest {
    pub name: String,
    pub offer_link: Option<String>,
    pub probable_installation_date: Option<String>,
    pub offer_hours: Option<f64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub selected_jobs: Vec<i64>,
    pub job_notes: Option<HashMap<i64, String>>,
}

#[derive(Debug, Serialize)]
pub struct InstallationJob {
    pub id: i64,
    pub name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateInstallationResponse {
    pub status: String,
    pub company: Company,
}

#[derive(Debug, Serialize)]
pub struct InstallationListEntry {
    pub company: Company,
    pub jobs: Vec<InstallationJob>,
}

/// POST /installations — Create an installation record and notify the
/// technician and secretariat users. A notification failure is logged but
/// never fails the installation itself (notification is best-effort relative
/// to the primary mutation).
pub async fn create_installation(
    State(state): State<AppState>,
    _claims: Claims,
    Json(req): Json<CreateInstallationRequest>,
) -> Result<(StatusCode, Json<CreateInstallationResponse>), (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Company name is required".to_string()));
    }

    let now = Utc::now().to_rfc3339();
    let db = state.db.clone();
    let insert_req = CreateInstallationRequest {
        name: req.name.trim().to_string(),
        ..req
    };
    let creation_date = now.clone();

    let (company, jobs, recipients) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        // The company row and its job links commit together; a bad job id
        // rolls the whole installation back.
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        tx.execute(
            "INSERT INTO companies (name, offer_link, probable_installation_date, offer_hours, notes, creation_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                insert_req.name,
                insert_req.offer_link,
                insert_req.probable_installation_date,
                insert_req.offer_hours,
                insert_req.notes,
                creation_date
            ],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let company_id = tx.last_insert_rowid();

        for job_id in &insert_req.selected_jobs {
            let notes = insert_req
                .job_notes
                .as_ref()
                .and_then(|m| m.get(job_id))
                .cloned();
            tx.execute(
                "INSERT INTO installation_jobs (company_id, job_id, notes) VALUES (?1, ?2, ?3)",
                rusqlite::params![company_id, job_id, notes],
            )
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Unknown job {}: {}", job_id, e)))?;
        }

        tx.commit()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        // Job catalog lookup for the payload
        let mut stmt = conn
            .prepare("SELECT id, name FROM jobs")
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let job_lookup: HashMap<i64, String> = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        let jobs: Vec<InstallationJob> = insert_req
            .selected_jobs
            .iter()
            .map(|job_id| InstallationJob {
                id: *job_id,
                name: job_lookup.get(job_id).cloned(),
                notes: insert_req
                    .job_notes
                    .as_ref()
                    .and_then(|m| m.get(job_id))
                    .cloned(),
            })
            .collect();

        // Recipients: every technician and secretariat user
        let mut stmt = conn
            .prepare("SELECT id FROM users WHERE role IN (?1, ?2)")
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let recipients: Vec<i64> = stmt
            .query_map(rusqlite::params![ROLE_TECHNICIAN, ROLE_SECRETARIAT], |row| {
                row.get(0)
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        let company = Company {
            id: company_id,
            name: insert_req.name,
            offer_link: insert_req.offer_link,
            probable_installation_date: insert_req.probable_installation_date,
            offer_hours: insert_req.offer_hours,
            notes: insert_req.notes,
            creation_date,
        };

        Ok::<_, (StatusCode, String)>((company, jobs, recipients))
    })
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Task join error".to_string()))??;

    let message = format!("New installation: {}", company.name);
    let payload = json!({
        "company": company,
        "jobs": jobs,
    });

    if let Err(e) = dispatch::notify(
        &state.db,
        &state.registry,
        &recipients,
        "new_installation",
        &message,
        Some(payload),
    )
    .await
    {
        // Best-effort relative to the primary mutation: the installation
        // stands even when its notifications could not be recorded.
        tracing::error!(company_id = company.id, error = %e, "Installation notification failed");
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateInstallationResponse {
            status: "ok".to_string(),
            company,
        }),
    ))
}

/// GET /installations — List installations with their selected jobs, newest first.
pub async fn list_installations(
    State(state): State<AppState>,
    _claims: Claims,
) -> Result<Json<Vec<InstallationListEntry>>, StatusCode> {
    let db = state.db.clone();

    let entries = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, offer_link, probable_installation_date, offer_hours, notes, creation_date
                 FROM companies ORDER BY creation_date DESC, id DESC",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let companies: Vec<Company> = stmt
            .query_map([], |row| {
                Ok(Company {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    offer_link: row.get(2)?,
                    probable_installation_date: row.get(3)?,
                    offer_hours: row.get(4)?,
                    notes: row.get(5)?,
                    creation_date: row.get(6)?,
                })
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn
            .prepare(
                "SELECT ij.company_id, ij.job_id, j.name, ij.notes
                 FROM installation_jobs ij JOIN jobs j ON ij.job_id = j.id",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut jobs_by_company: HashMap<i64, Vec<InstallationJob>> = HashMap::new();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    InstallationJob {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        notes: row.get(3)?,
                    },
                ))
            })
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok());
        for (company_id, job) in rows {
            jobs_by_company.entry(company_id).or_default().push(job);
        }

        let entries = companies
            .into_iter()
            .map(|company| InstallationListEntry {
                jobs: jobs_by_company.remove(&company.id).unwrap_or_default(),
                company,
            })
            .collect();

        Ok::<_, StatusCode>(entries)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(entries))
}
