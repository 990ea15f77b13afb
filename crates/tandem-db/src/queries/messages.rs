use anyhow::Result;
use rusqlite::{Connection, Row, params};

use super::OptionalExt;
use super::connections::touch_connection_in;
use super::conversations::get_conversation_in;
use crate::{Database, next_tick};
use crate::models::{MessageAppend, MessageDelete, MessageRow};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, kind, created_at, read, deleted";

impl Database {
    // -- Messages --

    /// Append a message and update the parent conversation in one
    /// transaction: last message, updated_at, and the other participant's
    /// unread counter. Also refreshes the pair's connection, if any.
    ///
    /// `row.created_at` is a floor: the stored stamp is moved past the
    /// conversation's `updated_at` when needed, so stamps within a
    /// conversation follow commit order and never repeat.
    pub fn append_message(&self, row: &MessageRow) -> Result<MessageAppend> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(convo) = get_conversation_in(&tx, &row.conversation_id)? else {
                return Ok(MessageAppend::ConversationMissing);
            };
            let recipient = if row.sender_id == convo.low_id {
                convo.high_id.clone()
            } else if row.sender_id == convo.high_id {
                convo.low_id.clone()
            } else {
                return Ok(MessageAppend::NotParticipant);
            };

            let mut message = row.clone();
            if message.created_at <= convo.updated_at {
                message.created_at = next_tick(&convo.updated_at)?;
            }

            tx.execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)"
                ),
                params![
                    message.id,
                    message.conversation_id,
                    message.sender_id,
                    message.content,
                    message.kind,
                    message.created_at
                ],
            )?;

            tx.execute(
                "UPDATE conversations
                 SET last_message_id = ?2, last_message_content = ?3, last_message_sender = ?4,
                     last_message_at = ?5, updated_at = ?5
                 WHERE id = ?1",
                params![
                    message.conversation_id,
                    message.id,
                    message.content,
                    message.sender_id,
                    message.created_at
                ],
            )?;

            tx.execute(
                "UPDATE conversation_members SET unread_count = unread_count + 1
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![message.conversation_id, recipient],
            )?;

            touch_connection_in(&tx, &message.sender_id, &recipient, &message.created_at)?;

            let conversation = get_conversation_in(&tx, &message.conversation_id)?
                .ok_or_else(|| anyhow::anyhow!("conversation {} vanished", message.conversation_id))?;
            tx.commit()?;
            Ok(MessageAppend::Appended { message, conversation })
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| get_message_in(conn, id))
    }

    /// Every message of a conversation in send order.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Up to `limit` messages sent before the message `before_id` (or the
    /// latest ones), returned in send order. `None` if the cursor message
    /// is not part of the conversation.
    pub fn message_page(
        &self,
        conversation_id: &str,
        limit: u32,
        before_id: Option<&str>,
    ) -> Result<Option<Vec<MessageRow>>> {
        self.with_conn(|conn| {
            let mut rows = if let Some(before_id) = before_id {
                let cursor: Option<(String, i64)> = conn
                    .query_row(
                        "SELECT created_at, rowid FROM messages WHERE id = ?1 AND conversation_id = ?2",
                        params![before_id, conversation_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some((before_at, before_rowid)) = cursor else {
                    return Ok(None);
                };
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                       AND (created_at < ?2 OR (created_at = ?2 AND rowid < ?3))
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?4"
                ))?;
                stmt.query_map(
                    params![conversation_id, before_at, before_rowid, limit],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2"
                ))?;
                stmt.query_map(params![conversation_id, limit], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            rows.reverse();
            Ok(Some(rows))
        })
    }

    /// Reset the user's unread counter and flag every message the other
    /// side sent as read. Returns how many messages flipped.
    pub fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE conversation_members SET unread_count = 0
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;
            let flipped = tx.execute(
                "UPDATE messages SET read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read = 0",
                params![conversation_id, user_id],
            )?;
            tx.commit()?;
            Ok(flipped)
        })
    }

    /// Soft delete: keep the row, replace its content with `tombstone`.
    /// If it was the conversation's last message, the preview is redacted too.
    pub fn soft_delete_message(&self, id: &str, tombstone: &str) -> Result<MessageDelete> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(existing) = get_message_in(&tx, id)? else {
                return Ok(MessageDelete::NotFound);
            };
            if existing.deleted {
                return Ok(MessageDelete::AlreadyDeleted(existing));
            }

            tx.execute(
                "UPDATE messages SET deleted = 1, content = ?2 WHERE id = ?1",
                params![id, tombstone],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_content = ?3
                 WHERE id = ?1 AND last_message_id = ?2",
                params![existing.conversation_id, id, tombstone],
            )?;

            let updated = get_message_in(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("message {} vanished during delete", id))?;
            tx.commit()?;
            Ok(MessageDelete::Deleted(updated))
        })
    }
}

fn get_message_in(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        [id],
        message_from_row,
    )
    .optional()
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        kind: row.get(4)?,
        created_at: row.get(5)?,
        read: row.get(6)?,
        deleted: row.get(7)?,
    })
}
