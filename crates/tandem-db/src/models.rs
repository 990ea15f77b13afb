/// Database row types. These map directly to SQLite rows.
/// Distinct from tandem-types domain models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub from_role: String,
    pub status: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub status: String,
    pub created_at: String,
    pub last_interaction_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: String,
    pub low_id: String,
    pub high_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_message_id: Option<String>,
    pub last_message_content: Option<String>,
    pub last_message_sender: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_low: u32,
    pub unread_high: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: String,
    pub created_at: String,
    pub read: bool,
    pub deleted: bool,
}

// -- Write outcomes --

#[derive(Debug)]
pub enum RequestInsert {
    Inserted(RequestRow),
    /// A pending request for the same ordered pair already exists.
    DuplicatePending,
    /// The pair already shares a connection.
    AlreadyConnected,
}

#[derive(Debug)]
pub enum RequestAccept {
    /// `created` is false when a connection for the pair already existed.
    Accepted {
        request: RequestRow,
        connection: ConnectionRow,
        created: bool,
    },
    NotPending(RequestRow),
    NotFound,
}

#[derive(Debug)]
pub enum RequestReject {
    Rejected(RequestRow),
    AlreadyRejected(RequestRow),
    AlreadyAccepted(RequestRow),
    NotFound,
}

#[derive(Debug)]
pub enum ConnectionInsert {
    Inserted(ConnectionRow),
    Exists(ConnectionRow),
}

#[derive(Debug)]
pub enum MessageAppend {
    /// The stored message, carrying its final `created_at`, and the
    /// updated conversation.
    Appended {
        message: MessageRow,
        conversation: ConversationRow,
    },
    ConversationMissing,
    NotParticipant,
}

#[derive(Debug)]
pub enum MessageDelete {
    Deleted(MessageRow),
    AlreadyDeleted(MessageRow),
    NotFound,
}
