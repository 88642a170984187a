//! Durable notification persistence.
//!
//! Each write is a single atomic insert/update; no multi-record transactions.
//! Records are never deleted here — retention is out of scope. These are
//! synchronous rusqlite functions; async callers run them inside
//! tokio::task::spawn_blocking.

use rusqlite::Connection;

use crate::db::models::Notification;

/// Insert one unread notification and return its row id.
pub fn insert(
    conn: &Connection,
    user_id: i64,
    message: &str,
    category: &str,
    data: Option<&str>,
    timestamp: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO notifications (user_id, message, type, data, is_read, timestamp)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        rusqlite::params![user_id, message, category, data, timestamp],
    )?;
    Ok(conn.last_insert_rowid())
}

/// List a user's notifications, newest first.
pub fn list_for_user(
    conn: &Connection,
    user_id: i64,
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Notification>, rusqlite::Error> {
    let sql = if unread_only {
        "SELECT id, user_id, message, type, data, is_read, timestamp
         FROM notifications
         WHERE user_id = ?1 AND is_read = 0
         ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3"
    } else {
        "SELECT id, user_id, message, type, data, is_read, timestamp
         FROM notifications
         WHERE user_id = ?1
         ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, limit, offset], |row| {
            Ok(Notification {
                id: row.get(0)?,
                user_id: row.get(1)?,
                message: row.get(2)?,
                category: row.get(3)?,
                data: row.get(4)?,
                is_read: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

/// Number of unread notifications for a user.
pub fn unread_count(conn: &Connection, user_id: i64) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        rusqlite::params![user_id],
        |row| row.get(0),
    )
}

/// Mark every unread notification of a user as read.
/// Returns the number of rows flipped; calling again is a zero-row no-op.
pub fn mark_all_read(conn: &Connection, user_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        rusqlite::params![user_id],
    )
}

/// Mark one notification as read, scoped to its owner.
/// Returns the number of matched rows (0 when the record does not exist or
/// belongs to someone else). Re-marking an already-read record matches 1 row
/// and leaves state unchanged.
pub fn mark_read(conn: &Connection, id: i64, user_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![id, user_id],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed_user(conn: &Connection, username: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (username, password_hash, name, role) VALUES (?1, 'x', ?1, 'sales')",
            rusqlite::params![username],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn insert_and_list_newest_first() {
        let conn = open_in_memory().unwrap();
        let uid = seed_user(&conn, "maria");

        insert(&conn, uid, "older", "general", None, "2026-08-28T09:00:00+00:00").unwrap();
        insert(&conn, uid, "newer", "general", None, "2026-08-29T09:00:00+00:00").unwrap();

        let rows = list_for_user(&conn, uid, false, 200, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "newer");
        assert!(!rows[0].is_read);
    }

    #[test]
    fn unread_filter_and_count() {
        let conn = open_in_memory().unwrap();
        let uid = seed_user(&conn, "nikos");

        let id = insert(&conn, uid, "a", "general", None, "2026-08-29T09:00:00+00:00").unwrap();
        insert(&conn, uid, "b", "general", None, "2026-08-29T09:01:00+00:00").unwrap();
        assert_eq!(unread_count(&conn, uid).unwrap(), 2);

        assert_eq!(mark_read(&conn, id, uid).unwrap(), 1);
        assert_eq!(unread_count(&conn, uid).unwrap(), 1);
        assert_eq!(list_for_user(&conn, uid, true, 200, 0).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let conn = open_in_memory().unwrap();
        let uid = seed_user(&conn, "eleni");
        let id = insert(&conn, uid, "a", "general", None, "2026-08-29T09:00:00+00:00").unwrap();

        assert_eq!(mark_read(&conn, id, uid).unwrap(), 1);
        // Second call matches the row again but state is unchanged
        assert_eq!(mark_read(&conn, id, uid).unwrap(), 1);
        assert_eq!(unread_count(&conn, uid).unwrap(), 0);

        assert_eq!(mark_all_read(&conn, uid).unwrap(), 0);
    }

    #[test]
    fn mark_read_is_scoped_to_owner() {
        let conn = open_in_memory().unwrap();
        let owner = seed_user(&conn, "owner");
        let other = seed_user(&conn, "other");
        let id = insert(&conn, owner, "a", "general", None, "2026-08-29T09:00:00+00:00").unwrap();

        assert_eq!(mark_read(&conn, id, other).unwrap(), 0);
        assert_eq!(unread_count(&conn, owner).unwrap(), 1);
    }

    #[test]
    fn insert_for_unknown_user_fails() {
        let conn = open_in_memory().unwrap();
        assert!(insert(&conn, 999, "a", "general", None, "2026-08-29T09:00:00+00:00").is_err());
    }
}
