use thiserror::Error;

/// Failure category a caller can branch on (and map to a transport status)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    EmptyQueue,
    Invalid,
    Infrastructure,
}

/// Errors raised by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("character {0} not found")]
    CharacterNotFound(i64),

    #[error("quest {0} not found")]
    QuestNotFound(i64),

    /// The (character, quest) pair already has an active assignment.
    #[error("character {character_id} already has quest {quest_id} assigned")]
    DuplicateAssignment { character_id: i64, quest_id: i64 },

    /// Complete was requested with no active assignment.
    #[error("character {0} has no pending quests")]
    EmptyQueue(i64),

    /// Granting the reward would overflow the character's experience.
    #[error("completing quest {quest_id} would overflow the experience of character {character_id}")]
    ExperienceOverflow { character_id: i64, quest_id: i64 },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Quest catalog files could not be read or parsed.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::CharacterNotFound(_) | LedgerError::QuestNotFound(_) => ErrorKind::NotFound,
            LedgerError::DuplicateAssignment { .. } => ErrorKind::Conflict,
            LedgerError::EmptyQueue(_) => ErrorKind::EmptyQueue,
            LedgerError::ExperienceOverflow { .. } | LedgerError::Invalid(_) => ErrorKind::Invalid,
            LedgerError::Storage(_) | LedgerError::Catalog(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::CharacterNotFound(_) => "character_not_found",
            LedgerError::QuestNotFound(_) => "quest_not_found",
            LedgerError::DuplicateAssignment { .. } => "duplicate_assignment",
            LedgerError::EmptyQueue(_) => "empty_queue",
            LedgerError::ExperienceOverflow { .. } => "experience_overflow",
            LedgerError::Invalid(_) => "invalid_input",
            LedgerError::Storage(_) => "storage_error",
            LedgerError::Catalog(_) => "catalog_error",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
