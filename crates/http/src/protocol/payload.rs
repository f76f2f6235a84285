/// Represents the size information of an HTTP payload.
///
/// This enum is used to determine how a body should be framed on the wire:
/// - Known length: exactly that many bytes follow the header block
/// - Unbounded: the body ends when the connection is closed
/// - Empty: no payload to process
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload delimited by connection close
    Unbounded,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    /// Returns true if the body is delimited by connection close
    #[inline]
    pub fn is_unbounded(&self) -> bool {
        matches!(self, PayloadSize::Unbounded)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Number of body bytes the peer expects, if known.
    #[inline]
    pub fn expected_len(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Empty => Some(0),
            PayloadSize::Unbounded => None,
        }
    }
}
