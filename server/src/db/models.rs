/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use serde::Serialize;

/// Role tags used for recipient resolution and registration validation.
pub const ROLE_TECHNICIAN: &str = "technician";
pub const ROLE_SECRETARIAT: &str = "secretariat";
pub const ROLE_SALES: &str = "sales";
pub const ROLE_ADMIN: &str = "admin";

/// Durable notification record. Lifetime is independent of any live
/// connection — it survives restarts and offline recipients.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    #[serde(rename = "type")]
    pub category: String,
    pub data: Option<String>,
    pub is_read: bool,
    pub timestamp: String,
}

/// Installation (company) record
#[derive(Debug, Clone, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub offer_link: Option<String>,
    pub probable_installation_date: Option<String>,
    pub offer_hours: Option<f64>,
    pub notes: Option<String>,
    pub creation_date: String,
}

/// Sales pipeline lead
#[derive(Debug, Clone, Serialize)]
pub struct SalesLead {
    pub id: i64,
    pub company_name: String,
    pub owner_user_id: Option<i64>,
    pub stage: String,
    pub next_follow_up_date: Option<String>,
    pub first_offer_date: Option<String>,
    pub last_activity_at: Option<String>,
    pub created_at: String,
}
