use anyhow::Result;
use rusqlite::{Connection, Row, params};

use super::OptionalExt;
use crate::models::{ConnectionInsert, ConnectionRow};
use crate::{Database, sorted_pair};

const CONNECTION_COLUMNS: &str =
    "id, participant_a, participant_b, status, created_at, last_interaction_at";

impl Database {
    // -- Connections --

    /// Insert a connection keyed by its unordered pair. If the pair is
    /// already connected the existing row is returned instead. Pending
    /// requests between the two users are superseded either way.
    pub fn insert_connection(&self, row: &ConnectionRow) -> Result<ConnectionInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (stored, created) = insert_connection_in(&tx, row)?;
            supersede_pending_in(&tx, &row.participant_a, &row.participant_b, &row.created_at)?;
            tx.commit()?;

            Ok(if created {
                ConnectionInsert::Inserted(stored)
            } else {
                ConnectionInsert::Exists(stored)
            })
        })
    }

    pub fn find_connection(&self, a: &str, b: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn(|conn| find_connection_in(conn, a, b))
    }

    pub fn get_connection(&self, id: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?1"),
                [id],
                connection_from_row,
            )
            .optional()
        })
    }

    /// Connections of a user, newest first.
    pub fn list_connections_for(&self, user_id: &str) -> Result<Vec<ConnectionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE participant_a = ?1 OR participant_b = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], connection_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Hard delete. Returns the removed row, or `None` if it did not exist.
    pub fn delete_connection(&self, id: &str) -> Result<Option<ConnectionRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    &format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?1"),
                    [id],
                    connection_from_row,
                )
                .optional()?;
            if existing.is_some() {
                tx.execute("DELETE FROM connections WHERE id = ?1", [id])?;
            }
            tx.commit()?;
            Ok(existing)
        })
    }

    /// Refresh `last_interaction_at`. Returns false if the pair is not connected.
    pub fn touch_connection(&self, a: &str, b: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| touch_connection_in(conn, a, b, now))
    }
}

pub(crate) fn find_connection_in(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<Option<ConnectionRow>> {
    let (low, high) = sorted_pair(a, b);
    conn.query_row(
        &format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE low_id = ?1 AND high_id = ?2"),
        [low, high],
        connection_from_row,
    )
    .optional()
}

/// Returns the stored row and whether this call created it.
pub(crate) fn insert_connection_in(
    conn: &Connection,
    row: &ConnectionRow,
) -> Result<(ConnectionRow, bool)> {
    let (low, high) = sorted_pair(&row.participant_a, &row.participant_b);
    let inserted = conn.execute(
        "INSERT INTO connections
            (id, participant_a, participant_b, low_id, high_id, status, created_at, last_interaction_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'accepted', ?6, ?7)
         ON CONFLICT(low_id, high_id) DO NOTHING",
        params![
            row.id,
            row.participant_a,
            row.participant_b,
            low,
            high,
            row.created_at,
            row.last_interaction_at
        ],
    )?;

    let stored = find_connection_in(conn, low, high)?
        .ok_or_else(|| anyhow::anyhow!("connection {}/{} missing after insert", low, high))?;
    Ok((stored, inserted == 1))
}

/// Mark every pending request between the pair (either direction) accepted.
pub(crate) fn supersede_pending_in(conn: &Connection, a: &str, b: &str, now: &str) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE connection_requests SET status = 'accepted', updated_at = ?3
         WHERE status = 'pending'
           AND ((from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1))",
        params![a, b, now],
    )?;
    Ok(changed)
}

pub(crate) fn touch_connection_in(conn: &Connection, a: &str, b: &str, now: &str) -> Result<bool> {
    let (low, high) = sorted_pair(a, b);
    let changed = conn.execute(
        "UPDATE connections SET last_interaction_at = ?3 WHERE low_id = ?1 AND high_id = ?2",
        params![low, high, now],
    )?;
    Ok(changed == 1)
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    Ok(ConnectionRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        last_interaction_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{connection, db, ts};

    #[test]
    fn pair_is_unique_in_either_direction() {
        let db = db();
        assert!(matches!(
            db.insert_connection(&connection("c1", "alice", "bob", &ts(1))).unwrap(),
            ConnectionInsert::Inserted(_)
        ));
        let ConnectionInsert::Exists(existing) =
            db.insert_connection(&connection("c2", "bob", "alice", &ts(2))).unwrap()
        else {
            panic!("second insert should find the existing connection");
        };
        assert_eq!(existing.id, "c1");
        assert_eq!(db.find_connection("bob", "alice").unwrap().unwrap().id, "c1");
        assert_eq!(db.find_connection("alice", "bob").unwrap().unwrap().id, "c1");
    }

    #[test]
    fn delete_and_touch() {
        let db = db();
        db.insert_connection(&connection("c1", "alice", "bob", &ts(1))).unwrap();

        assert!(db.touch_connection("bob", "alice", &ts(9)).unwrap());
        assert_eq!(db.get_connection("c1").unwrap().unwrap().last_interaction_at, ts(9));
        assert!(!db.touch_connection("bob", "carol", &ts(9)).unwrap());

        assert!(db.delete_connection("c1").unwrap().is_some());
        assert!(db.delete_connection("c1").unwrap().is_none());
        assert!(db.find_connection("alice", "bob").unwrap().is_none());
    }

    #[test]
    fn list_for_user_newest_first() {
        let db = db();
        db.insert_connection(&connection("c1", "alice", "bob", &ts(1))).unwrap();
        db.insert_connection(&connection("c2", "carol", "alice", &ts(2))).unwrap();
        db.insert_connection(&connection("c3", "carol", "bob", &ts(3))).unwrap();
        let ids: Vec<String> = db
            .list_connections_for("alice")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }
}
