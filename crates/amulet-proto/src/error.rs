//! DNS codec error types.

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// DNS wire format errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Input is too short to contain a 12-byte header.
    #[error("malformed header: {actual} bytes is shorter than the 12-byte header")]
    MalformedHeader {
        /// Actual input size.
        actual: usize,
    },

    /// Question section could not be decoded.
    #[error("malformed question at offset {offset}")]
    MalformedQuestion {
        /// Byte offset where decoding failed.
        offset: usize,
    },

    /// Label exceeds the 63-byte limit.
    #[error("label too long: {length} bytes exceeds maximum of 63")]
    LabelTooLong {
        /// Actual label length.
        length: usize,
    },

    /// Encoded name exceeds the 255-byte limit.
    #[error("name too long: {length} bytes exceeds maximum of 255")]
    NameTooLong {
        /// Encoded name length.
        length: usize,
    },

    /// Answer record ends before its fixed fields.
    #[error("truncated answer at offset {offset}")]
    TruncatedAnswer {
        /// Byte offset where decoding failed.
        offset: usize,
    },

    /// Answer rdata is shorter than its declared length.
    #[error("incomplete answer data: need {needed} bytes, {available} available")]
    IncompleteAnswerData {
        /// Bytes the rdlength field promised.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },
}

impl Error {
    /// Creates a new `MalformedHeader` error.
    #[inline]
    pub fn malformed_header(actual: usize) -> Self {
        Self::MalformedHeader { actual }
    }

    /// Creates a new `MalformedQuestion` error.
    #[inline]
    pub fn malformed_question(offset: usize) -> Self {
        Self::MalformedQuestion { offset }
    }

    /// Creates a new `TruncatedAnswer` error.
    #[inline]
    pub fn truncated_answer(offset: usize) -> Self {
        Self::TruncatedAnswer { offset }
    }
}
