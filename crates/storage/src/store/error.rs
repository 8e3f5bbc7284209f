#![forbid(unsafe_code)]

use loom_core::access::RequiredRole;
use loom_core::failure::FailureKind;
use loom_core::ids::IdError;
use loom_core::tags::TagError;
use loom_core::timeline::PositionError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => FailureKind::InvalidInput,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Forbidden(_) => FailureKind::Forbidden,
            Self::Conflict(_) => FailureKind::Conflict,
            Self::Io(_) | Self::Sql(_) | Self::Json(_) | Self::CorruptRow(_) => {
                FailureKind::Internal
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(message) if message.starts_with("RESET_REQUIRED") => {
                "RESET_REQUIRED"
            }
            _ => self.kind().code(),
        }
    }

    pub(crate) fn from_denial(kind: FailureKind, required: RequiredRole) -> Self {
        match kind {
            FailureKind::InvalidInput => Self::InvalidInput("invalid identity"),
            FailureKind::NotFound => Self::NotFound("story"),
            _ => Self::Forbidden(match required {
                RequiredRole::View => "view access required",
                RequiredRole::Comment => "comment access required",
                RequiredRole::Edit => "edit access required",
                RequiredRole::Owner => "owner access required",
            }),
        }
    }
}

impl From<IdError> for StoreError {
    fn from(value: IdError) -> Self {
        Self::InvalidInput(value.message())
    }
}

impl From<TagError> for StoreError {
    fn from(value: TagError) -> Self {
        Self::InvalidInput(value.message())
    }
}

impl From<PositionError> for StoreError {
    fn from(value: PositionError) -> Self {
        Self::InvalidInput(value.message())
    }
}
