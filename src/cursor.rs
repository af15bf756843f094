use std::num::ParseIntError;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use time::{OffsetDateTime, UtcOffset};

/// Failure to turn a client-supplied cursor back into a page position.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("cursor is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("cursor has {0} fields, expected 3")]
    Shape(usize),
    #[error("cursor field is not a number: {0}")]
    Number(#[from] ParseIntError),
    #[error("cursor timestamp out of range: {0}")]
    Range(#[from] time::error::ComponentRange),
}

/// Position after the last user of a page: its `created_at`, then its id for ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    created_at: OffsetDateTime,
    id: i64,
}

impl Cursor {
    pub fn new(created_at: OffsetDateTime, id: i64) -> Self {
        Self { created_at, id }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Opaque base64url token (no padding) safe for headers and query strings.
    ///
    /// The payload is `<wall clock nanos>:<offset seconds>:<id>`. Wall clock nanos
    /// are the local date and time counted as if they were UTC, so every
    /// representable `OffsetDateTime` encodes, whatever its year or offset.
    pub fn encode(&self) -> String {
        let wall = self.created_at.replace_offset(UtcOffset::UTC);
        let text = format!(
            "{}:{}:{}",
            wall.unix_timestamp_nanos(),
            self.created_at.offset().whole_seconds(),
            self.id
        );
        URL_SAFE_NO_PAD.encode(text)
    }

    /// Reverse of [`Cursor::encode`].
    ///
    /// Callers treat the empty string as "no cursor" and do not pass it here.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim())?;
        let text = String::from_utf8(bytes)?;
        let fields: Vec<&str> = text.split(':').collect();
        let [wall, offset, id] = fields[..] else {
            return Err(CursorError::Shape(fields.len()));
        };
        let offset = UtcOffset::from_whole_seconds(offset.parse()?)?;
        let created_at =
            OffsetDateTime::from_unix_timestamp_nanos(wall.parse()?)?.replace_offset(offset);
        Ok(Self {
            created_at,
            id: id.parse()?,
        })
    }
}
