//! Quest Assignment Ledger
//!
//! Per character, an ordered list of accepted-but-not-completed quests.
//! Accept appends, complete removes and rewards the earliest, list reads
//! them back in acceptance order.

pub mod memory;
pub mod model;
pub mod sqlite;

pub use memory::MemoryLedger;
pub use model::{Assignment, Character, CharacterView, Completion, NewQuest, Quest, QuestState};
pub use sqlite::SqliteLedger;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::{Backend, ServerConfig};
use crate::error::{LedgerError, LedgerResult};

pub const MAX_CHARACTER_NAME_LEN: usize = 30;
pub const MAX_QUEST_NAME_LEN: usize = 50;

/// Serializes mutations of the same character; different characters never contend.
///
/// An entry only lives while some task holds or waits on it, so ids that
/// were only ever looked up (including unknown ones) leave nothing behind.
#[derive(Default)]
pub struct CharacterLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl CharacterLocks {
    pub async fn lock(&self, character_id: i64) -> CharacterLock<'_> {
        // Clone the Arc out so the shard guard is released before awaiting
        let lock = self.locks.entry(character_id).or_default().value().clone();
        let guard = lock.lock_owned().await;
        CharacterLock {
            locks: &self.locks,
            character_id,
            guard: Some(guard),
        }
    }

    /// Number of characters currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one mutation; drops its table entry when it was the last user
pub struct CharacterLock<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    character_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CharacterLock<'_> {
    fn drop(&mut self) {
        // The owned guard holds its own Arc, release it before counting
        drop(self.guard.take());
        // Only the map's Arc left means no task holds or awaits this lock.
        // remove_if runs under the shard write lock, so no new clone can race in.
        self.locks
            .remove_if(&self.character_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Ledger handle shared by request handlers, opened at startup and closed on shutdown
pub enum Ledger {
    Sqlite(SqliteLedger),
    Memory(MemoryLedger),
}

impl Ledger {
    pub async fn open(config: &ServerConfig) -> LedgerResult<Self> {
        match config.backend {
            Backend::Sqlite => {
                let ledger = SqliteLedger::new(
                    &config.database_url,
                    config.max_connections,
                    config.busy_timeout(),
                )
                .await?;
                info!("Opened SQLite ledger at {}", config.database_url);
                Ok(Ledger::Sqlite(ledger))
            }
            Backend::Memory => {
                info!("Using in-memory ledger; state is lost on shutdown");
                Ok(Ledger::Memory(MemoryLedger::new()))
            }
        }
    }

    pub async fn close(&self) {
        match self {
            Ledger::Sqlite(ledger) => ledger.close().await,
            Ledger::Memory(_) => {}
        }
        info!("Ledger closed");
    }

    pub async fn create_character(&self, name: &str) -> LedgerResult<Character> {
        let name = validate_name(name, "character", MAX_CHARACTER_NAME_LEN)?;
        let character = match self {
            Ledger::Sqlite(ledger) => ledger.create_character(&name).await?,
            Ledger::Memory(ledger) => ledger.create_character(&name).await?,
        };
        info!("Created character '{}' (id: {})", character.name, character.id);
        Ok(character)
    }

    pub async fn get_character(&self, character_id: i64) -> LedgerResult<Character> {
        match self {
            Ledger::Sqlite(ledger) => ledger.get_character(character_id).await,
            Ledger::Memory(ledger) => ledger.get_character(character_id).await,
        }
    }

    /// The character plus its active quests in FIFO order
    pub async fn character_view(&self, character_id: i64) -> LedgerResult<CharacterView> {
        let character = self.get_character(character_id).await?;
        let quests = self.list(character_id).await?;
        Ok(CharacterView { character, quests })
    }

    pub async fn create_quest(&self, quest: NewQuest) -> LedgerResult<Quest> {
        let quest = validate_quest(quest)?;
        let quest = match self {
            Ledger::Sqlite(ledger) => ledger.create_quest(&quest).await?,
            Ledger::Memory(ledger) => ledger.create_quest(&quest).await?,
        };
        info!("Created quest '{}' (id: {}, exp: {})", quest.name, quest.id, quest.experience);
        Ok(quest)
    }

    pub async fn get_quest(&self, quest_id: i64) -> LedgerResult<Quest> {
        match self {
            Ledger::Sqlite(ledger) => ledger.get_quest(quest_id).await,
            Ledger::Memory(ledger) => ledger.get_quest(quest_id).await,
        }
    }

    pub async fn list_quests(&self) -> LedgerResult<Vec<Quest>> {
        match self {
            Ledger::Sqlite(ledger) => ledger.list_quests().await,
            Ledger::Memory(ledger) => ledger.list_quests().await,
        }
    }

    pub async fn find_quest_by_name(&self, name: &str) -> LedgerResult<Option<Quest>> {
        match self {
            Ledger::Sqlite(ledger) => ledger.find_quest_by_name(name).await,
            Ledger::Memory(ledger) => ledger.find_quest_by_name(name).await,
        }
    }

    /// Append a quest to the back of the character's queue.
    ///
    /// Fails with [`LedgerError::DuplicateAssignment`] if the pair is already
    /// active; a completed quest can be accepted again.
    pub async fn accept(&self, character_id: i64, quest_id: i64) -> LedgerResult<Assignment> {
        let assignment = match self {
            Ledger::Sqlite(ledger) => ledger.accept(character_id, quest_id).await?,
            Ledger::Memory(ledger) => ledger.accept(character_id, quest_id).await?,
        };
        info!(
            "Character {} accepted quest {} at position {}",
            character_id, quest_id, assignment.ordinal
        );
        Ok(assignment)
    }

    /// Complete the character's earliest accepted quest and grant its reward.
    pub async fn complete(&self, character_id: i64) -> LedgerResult<Completion> {
        let completion = match self {
            Ledger::Sqlite(ledger) => ledger.complete(character_id).await?,
            Ledger::Memory(ledger) => ledger.complete(character_id).await?,
        };
        info!(
            "Character {} completed quest {} (+{} exp, total {})",
            character_id,
            completion.quest.id,
            completion.quest.experience,
            completion.character.experience
        );
        Ok(completion)
    }

    pub async fn list(&self, character_id: i64) -> LedgerResult<Vec<Quest>> {
        let quests = match self {
            Ledger::Sqlite(ledger) => ledger.list(character_id).await?,
            Ledger::Memory(ledger) => ledger.list(character_id).await?,
        };
        debug!("Character {} has {} active quest(s)", character_id, quests.len());
        Ok(quests)
    }

    pub async fn assignments(&self, character_id: i64) -> LedgerResult<Vec<Assignment>> {
        match self {
            Ledger::Sqlite(ledger) => ledger.assignments(character_id).await,
            Ledger::Memory(ledger) => ledger.assignments(character_id).await,
        }
    }
}

fn validate_name(name: &str, what: &str, max_len: usize) -> LedgerResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::Invalid(format!("{} name must not be empty", what)));
    }
    if name.chars().count() > max_len {
        return Err(LedgerError::Invalid(format!(
            "{} name must be at most {} characters",
            what, max_len
        )));
    }
    Ok(name.to_string())
}

fn validate_quest(quest: NewQuest) -> LedgerResult<NewQuest> {
    let name = validate_name(&quest.name, "quest", MAX_QUEST_NAME_LEN)?;
    if quest.experience < 0 {
        return Err(LedgerError::Invalid("experience reward must not be negative".to_string()));
    }
    Ok(NewQuest {
        name,
        description: quest.description.filter(|d| !d.trim().is_empty()),
        experience: quest.experience,
    })
}
