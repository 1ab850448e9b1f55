//! In-memory ledger
//!
//! Each character's active quests live in an [`ArrayQueue`], so the FIFO
//! position of a quest is simply its index in the queue plus one and no
//! renumbering is ever needed. Nothing survives a restart.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::Mutex;

use super::model::{Assignment, Character, Completion, NewQuest, Quest, QuestState};
use crate::error::{LedgerError, LedgerResult};
use crate::queue::ArrayQueue;

#[derive(Default)]
struct MemoryState {
    next_character_id: i64,
    next_quest_id: i64,
    characters: BTreeMap<i64, Character>,
    quests: BTreeMap<i64, Quest>,
    /// character_id -> accepted quest ids, front is the earliest
    queues: HashMap<i64, ArrayQueue<i64>>,
}

impl MemoryState {
    fn character(&self, character_id: i64) -> LedgerResult<&Character> {
        self.characters
            .get(&character_id)
            .ok_or(LedgerError::CharacterNotFound(character_id))
    }

    fn active_quests(&self, character_id: i64) -> Vec<Quest> {
        let Some(queue) = self.queues.get(&character_id) else {
            return Vec::new();
        };
        queue
            .iter()
            .filter_map(|id| self.quests.get(id).cloned())
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_character(&self, name: &str) -> LedgerResult<Character> {
        let mut state = self.state.lock().await;
        state.next_character_id += 1;
        let character = Character {
            id: state.next_character_id,
            name: name.to_string(),
            experience: 0,
            created_at: Utc::now(),
        };
        state.characters.insert(character.id, character.clone());
        Ok(character)
    }

    pub async fn get_character(&self, character_id: i64) -> LedgerResult<Character> {
        let state = self.state.lock().await;
        state.character(character_id).cloned()
    }

    pub async fn create_quest(&self, quest: &NewQuest) -> LedgerResult<Quest> {
        let mut state = self.state.lock().await;
        state.next_quest_id += 1;
        let quest = Quest {
            id: state.next_quest_id,
            name: quest.name.clone(),
            description: quest.description.clone(),
            experience: quest.experience,
            state: QuestState::Pending,
            created_at: Utc::now(),
        };
        state.quests.insert(quest.id, quest.clone());
        Ok(quest)
    }

    pub async fn get_quest(&self, quest_id: i64) -> LedgerResult<Quest> {
        let state = self.state.lock().await;
        state
            .quests
            .get(&quest_id)
            .cloned()
            .ok_or(LedgerError::QuestNotFound(quest_id))
    }

    pub async fn list_quests(&self) -> LedgerResult<Vec<Quest>> {
        let state = self.state.lock().await;
        Ok(state.quests.values().cloned().collect())
    }

    pub async fn find_quest_by_name(&self, name: &str) -> LedgerResult<Option<Quest>> {
        let state = self.state.lock().await;
        Ok(state.quests.values().find(|q| q.name == name).cloned())
    }

    pub async fn accept(&self, character_id: i64, quest_id: i64) -> LedgerResult<Assignment> {
        let mut state = self.state.lock().await;
        state.character(character_id)?;
        if !state.quests.contains_key(&quest_id) {
            return Err(LedgerError::QuestNotFound(quest_id));
        }

        let queue = state.queues.entry(character_id).or_default();
        if queue.iter().any(|&id| id == quest_id) {
            return Err(LedgerError::DuplicateAssignment { character_id, quest_id });
        }
        queue.enqueue(quest_id);

        Ok(Assignment {
            character_id,
            quest_id,
            ordinal: queue.len() as i64,
        })
    }

    pub async fn complete(&self, character_id: i64) -> LedgerResult<Completion> {
        let mut state = self.state.lock().await;
        let character = state.character(character_id)?;

        let quest_id = *state
            .queues
            .get(&character_id)
            .and_then(|queue| queue.first())
            .ok_or(LedgerError::EmptyQueue(character_id))?;
        let quest = state
            .quests
            .get(&quest_id)
            .ok_or(LedgerError::QuestNotFound(quest_id))?;

        // Everything is validated before the first mutation
        let experience = character
            .experience
            .checked_add(quest.experience)
            .ok_or(LedgerError::ExperienceOverflow { character_id, quest_id })?;

        if let Some(queue) = state.queues.get_mut(&character_id) {
            queue.dequeue();
        }

        let quest = state
            .quests
            .get_mut(&quest_id)
            .ok_or(LedgerError::QuestNotFound(quest_id))?;
        if quest.state == QuestState::Pending {
            quest.state = QuestState::Completed;
        }
        let quest = quest.clone();

        let character = state
            .characters
            .get_mut(&character_id)
            .ok_or(LedgerError::CharacterNotFound(character_id))?;
        character.experience = experience;
        let character = character.clone();

        let remaining = state.active_quests(character_id);
        Ok(Completion {
            quest,
            character,
            remaining,
        })
    }

    pub async fn list(&self, character_id: i64) -> LedgerResult<Vec<Quest>> {
        let state = self.state.lock().await;
        state.character(character_id)?;

        Ok(state.active_quests(character_id))
    }

    pub async fn assignments(&self, character_id: i64) -> LedgerResult<Vec<Assignment>> {
        let state = self.state.lock().await;
        state.character(character_id)?;

        let Some(queue) = state.queues.get(&character_id) else {
            return Ok(Vec::new());
        };
        Ok(queue
            .iter()
            .enumerate()
            .map(|(i, &quest_id)| Assignment {
                character_id,
                quest_id,
                ordinal: i as i64 + 1,
            })
            .collect())
    }
}
