#![forbid(unsafe_code)]

use std::fmt;

/// Caller-facing classification of every failure the core can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidInput,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::Conflict => "CONFLICT",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP-flavoured status an adapter may use when mapping the failure.
    pub fn status_hint(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Forbidden => 403,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "The request is missing or has malformed identifiers.",
            Self::NotFound => "Not found.",
            Self::Forbidden => "You do not have access to do that.",
            Self::Conflict => "That already exists or is already pending.",
            Self::Internal => "Something went wrong. Please try again later.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
