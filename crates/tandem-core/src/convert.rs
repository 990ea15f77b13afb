//! Row → domain conversions. A row that fails to parse is a store fault.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tandem_db::models::{ConnectionRow, ConversationRow, MessageRow, RequestRow};
use tandem_types::models::{
    Connection, ConnectionRequest, ConnectionStatus, Conversation, LastMessage, Message,
};

fn parse_time(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("corrupt {} '{}'", what, raw))
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("corrupt {} '{}'", what, raw))
}

pub fn request(row: RequestRow) -> Result<ConnectionRequest> {
    Ok(ConnectionRequest {
        id: parse_id(&row.id, "request id")?,
        from_role: row.from_role.parse()?,
        status: row.status.parse()?,
        created_at: parse_time(&row.created_at, "request created_at")?,
        updated_at: parse_time(&row.updated_at, "request updated_at")?,
        from_id: row.from_id,
        to_id: row.to_id,
        note: row.note,
    })
}

pub fn connection(row: ConnectionRow) -> Result<Connection> {
    if row.status != "accepted" {
        anyhow::bail!("corrupt connection status '{}' on {}", row.status, row.id);
    }
    Ok(Connection {
        id: parse_id(&row.id, "connection id")?,
        status: ConnectionStatus::Accepted,
        created_at: parse_time(&row.created_at, "connection created_at")?,
        last_interaction_at: parse_time(&row.last_interaction_at, "connection last_interaction_at")?,
        participant_a: row.participant_a,
        participant_b: row.participant_b,
    })
}

pub fn conversation(row: ConversationRow) -> Result<Conversation> {
    let last_message = match (row.last_message_content, row.last_message_sender, row.last_message_at) {
        (Some(content), Some(sender_id), Some(at)) => Some(LastMessage {
            content,
            sender_id,
            created_at: parse_time(&at, "last_message_at")?,
        }),
        _ => None,
    };

    let unread_count = BTreeMap::from([
        (row.low_id.clone(), row.unread_low),
        (row.high_id.clone(), row.unread_high),
    ]);

    Ok(Conversation {
        created_at: parse_time(&row.created_at, "conversation created_at")?,
        updated_at: parse_time(&row.updated_at, "conversation updated_at")?,
        id: row.id,
        participants: [row.low_id, row.high_id],
        last_message,
        unread_count,
    })
}

pub fn message(row: MessageRow) -> Result<Message> {
    Ok(Message {
        id: parse_id(&row.id, "message id")?,
        kind: row.kind.parse()?,
        created_at: parse_time(&row.created_at, "message created_at")?,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        content: row.content,
        read: row.read,
        deleted: row.deleted,
    })
}

pub fn all<R, T>(rows: Vec<R>, f: fn(R) -> Result<T>) -> Result<Vec<T>> {
    rows.into_iter().map(f).collect()
}
