use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Users and notifications

CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'technician',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'general',
    data TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_notifications_user_unread ON notifications(user_id, is_read);
CREATE INDEX idx_notifications_user_time ON notifications(user_id, timestamp);
",
        ),
        M::up(
            "-- Migration 2: Installations

CREATE TABLE jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

INSERT INTO jobs (name) VALUES
    ('POS setup'),
    ('Network wiring'),
    ('Fiscal device registration'),
    ('Software installation'),
    ('Staff training');

CREATE TABLE companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    offer_link TEXT,
    probable_installation_date TEXT,
    offer_hours REAL,
    notes TEXT,
    creation_date TEXT NOT NULL
);

CREATE TABLE installation_jobs (
    company_id INTEGER NOT NULL,
    job_id INTEGER NOT NULL,
    notes TEXT,
    PRIMARY KEY (company_id, job_id),
    FOREIGN KEY (company_id) REFERENCES companies(id) ON DELETE CASCADE,
    FOREIGN KEY (job_id) REFERENCES jobs(id)
);
",
        ),
        M::up(
            "-- Migration 3: Sales pipeline

CREATE TABLE sales_leads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_name TEXT NOT NULL,
    owner_user_id INTEGER,
    stage TEXT NOT NULL DEFAULT 'New',
    next_follow_up_date TEXT,
    first_offer_date TEXT,
    last_activity_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (owner_user_id) REFERENCES users(id)
);

CREATE INDEX idx_sales_leads_owner ON sales_leads(owner_user_id);
CREATE INDEX idx_sales_leads_followup ON sales_leads(next_follow_up_date);
",
        ),
    ])
}
