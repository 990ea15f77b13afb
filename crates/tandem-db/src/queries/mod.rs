mod connections;
mod conversations;
mod messages;
mod requests;

use anyhow::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Database;
    use crate::models::ConnectionRow;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn ts(second: u32) -> String {
        format!("2026-03-01T10:00:{:02}.000000Z", second)
    }

    pub fn connection(id: &str, a: &str, b: &str, at: &str) -> ConnectionRow {
        ConnectionRow {
            id: id.to_string(),
            participant_a: a.to_string(),
            participant_b: b.to_string(),
            status: "accepted".to_string(),
            created_at: at.to_string(),
            last_interaction_at: at.to_string(),
        }
    }
}
