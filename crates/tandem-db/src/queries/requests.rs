use anyhow::Result;
use rusqlite::{Connection, Row, params};

use super::connections::{find_connection_in, insert_connection_in, supersede_pending_in};
use super::{OptionalExt, is_unique_violation};
use crate::Database;
use crate::models::{ConnectionRow, RequestAccept, RequestInsert, RequestReject, RequestRow};

const REQUEST_COLUMNS: &str =
    "id, from_id, to_id, from_role, status, note, created_at, updated_at";

impl Database {
    // -- Connection requests --

    /// Insert a pending request unless the pair is already connected or a
    /// pending request for the same ordered pair exists.
    pub fn insert_request(&self, row: &RequestRow) -> Result<RequestInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if find_connection_in(&tx, &row.from_id, &row.to_id)?.is_some() {
                return Ok(RequestInsert::AlreadyConnected);
            }

            let inserted = tx.execute(
                "INSERT INTO connection_requests
                    (id, from_id, to_id, from_role, status, note, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6)",
                params![row.id, row.from_id, row.to_id, row.from_role, row.note, row.created_at],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(RequestInsert::DuplicatePending),
                Err(e) => return Err(e.into()),
            }

            let stored = get_request_in(&tx, &row.id)?
                .ok_or_else(|| anyhow::anyhow!("request {} vanished after insert", row.id))?;
            tx.commit()?;
            Ok(RequestInsert::Inserted(stored))
        })
    }

    pub fn get_request(&self, id: &str) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| get_request_in(conn, id))
    }

    pub fn find_pending_request(&self, from_id: &str, to_id: &str) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM connection_requests
                     WHERE from_id = ?1 AND to_id = ?2 AND status = 'pending'"
                ),
                [from_id, to_id],
                request_from_row,
            )
            .optional()
        })
    }

    /// Accept a pending request: flip it to accepted, create (or reuse) the
    /// pair's connection, and supersede any other pending request between
    /// the two users. All in one transaction, so concurrent accepts of the
    /// same request yield exactly one `Accepted`.
    pub fn accept_request(
        &self,
        id: &str,
        connection_id: &str,
        now: &str,
    ) -> Result<RequestAccept> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(request) = get_request_in(&tx, id)? else {
                return Ok(RequestAccept::NotFound);
            };
            if request.status != "pending" {
                return Ok(RequestAccept::NotPending(request));
            }

            tx.execute(
                "UPDATE connection_requests SET status = 'accepted', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now],
            )?;

            let candidate = ConnectionRow {
                id: connection_id.to_string(),
                participant_a: request.to_id.clone(),
                participant_b: request.from_id.clone(),
                status: "accepted".to_string(),
                created_at: now.to_string(),
                last_interaction_at: now.to_string(),
            };
            let (connection, created) = insert_connection_in(&tx, &candidate)?;
            supersede_pending_in(&tx, &request.from_id, &request.to_id, now)?;

            let request = get_request_in(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("request {} vanished during accept", id))?;
            tx.commit()?;

            Ok(RequestAccept::Accepted {
                request,
                connection,
                created,
            })
        })
    }

    /// Reject a pending request. Idempotent for already-rejected requests.
    pub fn reject_request(&self, id: &str, now: &str) -> Result<RequestReject> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(request) = get_request_in(&tx, id)? else {
                return Ok(RequestReject::NotFound);
            };
            match request.status.as_str() {
                "rejected" => return Ok(RequestReject::AlreadyRejected(request)),
                "accepted" => return Ok(RequestReject::AlreadyAccepted(request)),
                _ => {}
            }

            tx.execute(
                "UPDATE connection_requests SET status = 'rejected', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now],
            )?;

            let request = get_request_in(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("request {} vanished during reject", id))?;
            tx.commit()?;
            Ok(RequestReject::Rejected(request))
        })
    }

    /// Incoming pending requests, newest first.
    pub fn list_pending_to(&self, user_id: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| {
            query_requests(
                conn,
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM connection_requests
                     WHERE to_id = ?1 AND status = 'pending'
                     ORDER BY created_at DESC, rowid DESC"
                ),
                user_id,
            )
        })
    }

    /// Outgoing pending requests, newest first.
    pub fn list_pending_from(&self, user_id: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| {
            query_requests(
                conn,
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM connection_requests
                     WHERE from_id = ?1 AND status = 'pending'
                     ORDER BY created_at DESC, rowid DESC"
                ),
                user_id,
            )
        })
    }

    /// Every request ever exchanged between two users, either direction, oldest first.
    pub fn list_requests_between(&self, a: &str, b: &str) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM connection_requests
                 WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([a, b], request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn get_request_in(conn: &Connection, id: &str) -> Result<Option<RequestRow>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM connection_requests WHERE id = ?1"),
        [id],
        request_from_row,
    )
    .optional()
}

fn query_requests(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<RequestRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([user_id], request_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        from_role: row.get(3)?,
        status: row.get(4)?,
        note: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{connection, db, ts};

    fn request(id: &str, from: &str, to: &str, at: &str) -> RequestRow {
        RequestRow {
            id: id.to_string(),
            from_id: from.to_string(),
            to_id: to.to_string(),
            from_role: "individual".to_string(),
            status: "pending".to_string(),
            note: None,
            created_at: at.to_string(),
            updated_at: at.to_string(),
        }
    }

    #[test]
    fn second_pending_request_for_same_pair_is_refused() {
        let db = db();
        assert!(matches!(
            db.insert_request(&request("r1", "alice", "bob", &ts(1))).unwrap(),
            RequestInsert::Inserted(_)
        ));
        assert!(matches!(
            db.insert_request(&request("r2", "alice", "bob", &ts(2))).unwrap(),
            RequestInsert::DuplicatePending
        ));
        // Opposite direction is a different ordered pair
        assert!(matches!(
            db.insert_request(&request("r3", "bob", "alice", &ts(3))).unwrap(),
            RequestInsert::Inserted(_)
        ));
        assert_eq!(db.list_pending_from("alice").unwrap().len(), 1);
    }

    #[test]
    fn rejected_request_frees_the_pair() {
        let db = db();
        db.insert_request(&request("r1", "alice", "bob", &ts(1))).unwrap();
        assert!(matches!(db.reject_request("r1", &ts(2)).unwrap(), RequestReject::Rejected(_)));
        assert!(matches!(
            db.reject_request("r1", &ts(3)).unwrap(),
            RequestReject::AlreadyRejected(_)
        ));
        assert!(matches!(
            db.insert_request(&request("r2", "alice", "bob", &ts(4))).unwrap(),
            RequestInsert::Inserted(_)
        ));
        assert_eq!(db.list_requests_between("bob", "alice").unwrap().len(), 2);
    }

    #[test]
    fn request_refused_when_connected() {
        let db = db();
        db.insert_connection(&connection("c1", "bob", "alice", &ts(0))).unwrap();
        assert!(matches!(
            db.insert_request(&request("r1", "alice", "bob", &ts(1))).unwrap(),
            RequestInsert::AlreadyConnected
        ));
    }

    #[test]
    fn accept_creates_connection_and_clears_both_directions() {
        let db = db();
        db.insert_request(&request("r1", "alice", "bob", &ts(1))).unwrap();
        db.with_conn_mut(|conn| {
            // Simulate a racing reverse request that slipped in.
            conn.execute(
                "INSERT INTO connection_requests (id, from_id, to_id, from_role, status, created_at, updated_at)
                 VALUES ('r2', 'bob', 'alice', 'individual', 'pending', ?1, ?1)",
                [ts(2)],
            )?;
            Ok(())
        })
        .unwrap();

        let RequestAccept::Accepted { request, connection, created } =
            db.accept_request("r1", "c1", &ts(3)).unwrap()
        else {
            panic!("expected acceptance");
        };
        assert!(created);
        assert_eq!(request.status, "accepted");
        assert_eq!(connection.participant_a, "bob");
        assert!(db.list_pending_to("alice").unwrap().is_empty());
        assert!(db.list_pending_to("bob").unwrap().is_empty());

        assert!(matches!(
            db.accept_request("r1", "c2", &ts(4)).unwrap(),
            RequestAccept::NotPending(_)
        ));
        assert!(matches!(
            db.reject_request("r1", &ts(5)).unwrap(),
            RequestReject::AlreadyAccepted(_)
        ));
        assert!(matches!(db.accept_request("nope", "c3", &ts(6)).unwrap(), RequestAccept::NotFound));
    }

    #[test]
    fn pending_lists_are_newest_first() {
        let db = db();
        db.insert_request(&request("r1", "alice", "dana", &ts(1))).unwrap();
        db.insert_request(&request("r2", "bob", "dana", &ts(2))).unwrap();
        db.insert_request(&request("r3", "carol", "dana", &ts(3))).unwrap();
        let ids: Vec<String> = db.list_pending_to("dana").unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["r3", "r2", "r1"]);
    }
}
