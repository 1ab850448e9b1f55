//! Ledger Records
//!
//! Characters, quests and the assignments linking them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a quest definition (shared by every character holding it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestState {
    /// No holder has completed the quest yet
    Pending,
    /// At least one holder has completed the quest
    Completed,
}

impl QuestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestState::Pending => "pending",
            QuestState::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QuestState::Pending),
            "completed" => Some(QuestState::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Character {
    pub id: i64,
    pub name: String,
    /// Accumulated experience, never decreases
    pub experience: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quest {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Experience granted on completion
    pub experience: i64,
    pub state: QuestState,
    pub created_at: DateTime<Utc>,
}

/// Active link between a character and an accepted quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub character_id: i64,
    pub quest_id: i64,
    /// 1-based FIFO position among the character's active assignments
    pub ordinal: i64,
}

/// Input for creating a quest
#[derive(Debug, Clone, Deserialize)]
pub struct NewQuest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub experience: i64,
}

/// Outcome of completing a character's earliest quest
#[derive(Debug, Clone)]
pub struct Completion {
    pub quest: Quest,
    pub character: Character,
    /// Quests still active after the completion, in FIFO order
    pub remaining: Vec<Quest>,
}

/// A character together with its active quests in FIFO order
#[derive(Debug, Clone, Serialize)]
pub struct CharacterView {
    #[serde(flatten)]
    pub character: Character,
    pub quests: Vec<Quest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quest_state_round_trip() {
        for state in [QuestState::Pending, QuestState::Completed] {
            assert_eq!(QuestState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(QuestState::from_str("abandoned"), None);
    }

    #[test]
    fn test_new_quest_defaults() {
        let quest: NewQuest = serde_json::from_str(r#"{"name": "Clear the cellar"}"#).unwrap();
        assert_eq!(quest.experience, 0);
        assert!(quest.description.is_none());
    }

    #[test]
    fn test_character_view_flattens_character() {
        let view = CharacterView {
            character: Character {
                id: 7,
                name: "Aria".to_string(),
                experience: 30,
                created_at: Utc::now(),
            },
            quests: Vec::new(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["experience"], 30);
        assert!(json["quests"].as_array().unwrap().is_empty());
    }
}
