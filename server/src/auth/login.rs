//! Username/password registration and login, issuing HS256 access tokens.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::db::models::{ROLE_ADMIN, ROLE_SALES, ROLE_SECRETARIAT, ROLE_TECHNICIAN};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_id: i64,
    pub name: String,
    pub role: String,
}

const KNOWN_ROLES: &[&str] = &[ROLE_TECHNICIAN, ROLE_SECRETARIAT, ROLE_SALES, ROLE_ADMIN];

/// POST /auth/register — Create a user account.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), (StatusCode, String)> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Username and password are required".to_string(),
        ));
    }
    if !KNOWN_ROLES.contains(&req.role.as_str()) {
        return Err((StatusCode::BAD_REQUEST, format!("Unknown role: {}", req.role)));
    }

    let db = state.db.clone();
    let username = req.username.trim().to_string();
    let password_hash = jwt::hash_password(&req.password);
    let name = req.name.clone();
    let role = req.role.clone();

    let user_id = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                rusqlite::params![username],
                |row| row.get(0),
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        if exists {
            return Err((StatusCode::BAD_REQUEST, "Username already exists".to_string()));
        }

        conn.execute(
            "INSERT INTO users (username, password_hash, name, role, created_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            rusqlite::params![username, password_hash, name, role],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        Ok::<i64, (StatusCode, String)>(conn.last_insert_rowid())
    })
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Task join error".to_string()))??;

    let access_token = jwt::issue_access_token(&state.jwt_secret, user_id, &req.name, &req.role)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!(user_id, username = %req.username, role = %req.role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            user_id,
            name: req.name,
            role: req.role,
        }),
    ))
}

/// POST /auth/login — Verify credentials and issue an access token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let username = req.username.clone();

    let user = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        conn.query_row(
            "SELECT id, password_hash, name, role FROM users WHERE username = ?1",
            rusqlite::params![username],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))
    })
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Task join error".to_string()))??;

    let (user_id, password_hash, name, role) = user;

    if jwt::hash_password(&req.password) != password_hash {
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()));
    }

    let access_token = jwt::issue_access_token(&state.jwt_secret, user_id, &name, &role)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!(user_id, username = %req.username, "User logged in");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        user_id,
        name,
        role,
    }))
}
