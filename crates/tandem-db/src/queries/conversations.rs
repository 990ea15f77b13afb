use anyhow::Result;
use rusqlite::{Connection, Row, params};

use super::OptionalExt;
use crate::models::ConversationRow;
use crate::{Database, sorted_pair};

// Unread counters live in conversation_members; join them back per side.
const CONVERSATION_SELECT: &str = "
    SELECT c.id, c.low_id, c.high_id, c.created_at, c.updated_at,
           c.last_message_id, c.last_message_content, c.last_message_sender, c.last_message_at,
           COALESCE(ml.unread_count, 0), COALESCE(mh.unread_count, 0)
    FROM conversations c
    LEFT JOIN conversation_members ml ON ml.conversation_id = c.id AND ml.user_id = c.low_id
    LEFT JOIN conversation_members mh ON mh.conversation_id = c.id AND mh.user_id = c.high_id";

impl Database {
    // -- Conversations --

    /// Create the conversation for a pair if it does not exist yet.
    /// Returns true when this call created it.
    pub fn insert_conversation_if_absent(
        &self,
        id: &str,
        a: &str,
        b: &str,
        now: &str,
    ) -> Result<bool> {
        let (low, high) = sorted_pair(a, b);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO conversations (id, low_id, high_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT DO NOTHING",
                params![id, low, high, now],
            )?;

            if inserted == 1 {
                for member in [low, high] {
                    tx.execute(
                        "INSERT INTO conversation_members (conversation_id, user_id, unread_count)
                         VALUES (?1, ?2, 0)",
                        params![id, member],
                    )?;
                }
            }

            tx.commit()?;
            Ok(inserted == 1)
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| get_conversation_in(conn, id))
    }

    pub fn find_conversation(&self, a: &str, b: &str) -> Result<Option<ConversationRow>> {
        let (low, high) = sorted_pair(a, b);
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{CONVERSATION_SELECT} WHERE c.low_id = ?1 AND c.high_id = ?2"),
                [low, high],
                conversation_from_row,
            )
            .optional()
        })
    }

    /// Conversations a user takes part in, most recently updated first.
    pub fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{CONVERSATION_SELECT}
                 WHERE c.low_id = ?1 OR c.high_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sum of a user's unread counters across all conversations.
    pub fn unread_total(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(unread_count), 0) FROM conversation_members WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(total.max(0) as u64)
        })
    }
}

pub(crate) fn get_conversation_in(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    conn.query_row(
        &format!("{CONVERSATION_SELECT} WHERE c.id = ?1"),
        [id],
        conversation_from_row,
    )
    .optional()
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        low_id: row.get(1)?,
        high_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        last_message_id: row.get(5)?,
        last_message_content: row.get(6)?,
        last_message_sender: row.get(7)?,
        last_message_at: row.get(8)?,
        unread_low: row.get(9)?,
        unread_high: row.get(10)?,
    })
}
