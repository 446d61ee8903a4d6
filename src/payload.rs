use std::{borrow::Cow, fmt};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::RequestError;

/// Request body captured in memory, re-presentable for every attempt.
///
/// Each call to [`ReplayableBody::view`] hands out an independent cursor over
/// the same bytes, so a view consumed by a failed attempt never affects the
/// next one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayableBody(Bytes);

impl ReplayableBody {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Fresh view over the captured bytes for one send.
    pub fn view(&self) -> Bytes {
        self.0.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Body as text for diagnostics; invalid UTF-8 is replaced lossily.
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Body source of a request.
///
/// A stream is read lazily, exactly once, the first time the executor needs
/// to send; afterwards the payload is [`Payload::Buffered`]. Buffering is
/// unbounded and limited only by available memory.
#[derive(Default)]
pub enum Payload {
    #[default]
    Empty,
    Buffered(ReplayableBody),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffered(body) => write!(f, "Buffered({} bytes)", body.len()),
            Self::Stream(_) => f.write_str("Stream(<unread>)"),
        }
    }
}

impl Payload {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Buffered(ReplayableBody::new(bytes))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Stream(Box::new(reader))
    }

    /// Reads an unread stream into memory and returns the replayable body.
    ///
    /// Returns `Ok(None)` for an empty payload. Calling this again after a
    /// successful read returns the same captured bytes without I/O.
    pub async fn materialize(&mut self) -> Result<Option<&ReplayableBody>, RequestError> {
        if let Self::Stream(reader) = &mut *self {
            let mut captured = Vec::new();
            reader
                .read_to_end(&mut captured)
                .await
                .map_err(RequestError::ReadBody)?;
            *self = Self::from_bytes(captured);
        }
        Ok(self.buffered())
    }

    /// Already captured body, if any. Never performs I/O.
    pub fn buffered(&self) -> Option<&ReplayableBody> {
        match self {
            Self::Buffered(body) => Some(body),
            Self::Empty | Self::Stream(_) => None,
        }
    }
}
