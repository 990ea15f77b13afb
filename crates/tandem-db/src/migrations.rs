use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (requests, connections)");
        conn.execute_batch(
            "
            CREATE TABLE connection_requests (
                id          TEXT PRIMARY KEY,
                from_id     TEXT NOT NULL,
                to_id       TEXT NOT NULL,
                from_role   TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                note        TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            -- At most one pending request per ordered pair
            CREATE UNIQUE INDEX idx_requests_pending_pair
                ON connection_requests(from_id, to_id) WHERE status = 'pending';

            CREATE INDEX idx_requests_to
                ON connection_requests(to_id, status, created_at);

            CREATE INDEX idx_requests_from
                ON connection_requests(from_id, status, created_at);

            CREATE TABLE connections (
                id                   TEXT PRIMARY KEY,
                participant_a        TEXT NOT NULL,
                participant_b        TEXT NOT NULL,
                low_id               TEXT NOT NULL,
                high_id              TEXT NOT NULL,
                status               TEXT NOT NULL DEFAULT 'accepted',
                created_at           TEXT NOT NULL,
                last_interaction_at  TEXT NOT NULL,
                UNIQUE(low_id, high_id),
                CHECK (low_id < high_id)
            );

            CREATE INDEX idx_connections_a ON connections(participant_a);
            CREATE INDEX idx_connections_b ON connections(participant_b);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (conversations, messages)");
        conn.execute_batch(
            "
            CREATE TABLE conversations (
                id                    TEXT PRIMARY KEY,
                low_id                TEXT NOT NULL,
                high_id               TEXT NOT NULL,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL,
                last_message_id       TEXT,
                last_message_content  TEXT,
                last_message_sender   TEXT,
                last_message_at       TEXT,
                UNIQUE(low_id, high_id)
            );

            CREATE TABLE conversation_members (
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                user_id          TEXT NOT NULL,
                unread_count     INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_members_user ON conversation_members(user_id);

            CREATE TABLE messages (
                id               TEXT PRIMARY KEY,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                sender_id        TEXT NOT NULL,
                content          TEXT NOT NULL,
                kind             TEXT NOT NULL DEFAULT 'text',
                created_at       TEXT NOT NULL,
                read             INTEGER NOT NULL DEFAULT 0,
                deleted          INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
