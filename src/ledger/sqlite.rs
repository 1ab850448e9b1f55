use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;

use super::model::{Assignment, Character, Completion, NewQuest, Quest, QuestState};
use super::CharacterLocks;
use crate::error::{LedgerError, LedgerResult};

/// SQLite-backed ledger
pub struct SqliteLedger {
    pool: SqlitePool,
    locks: CharacterLocks,
}

impl SqliteLedger {
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self {
            pool,
            locks: CharacterLocks::default(),
        })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                experience INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                experience INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Ordinals are renumbered in place on completion, so (character_id, ordinal)
        // is indexed but not declared UNIQUE.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_quests (
                character_id INTEGER NOT NULL,
                quest_id INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                accepted_at TEXT NOT NULL,
                PRIMARY KEY(character_id, quest_id),
                FOREIGN KEY(character_id) REFERENCES characters(id),
                FOREIGN KEY(quest_id) REFERENCES quests(id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_character_quests_ordinal ON character_quests(character_id, ordinal)",
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_character(&self, name: &str) -> LedgerResult<Character> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO characters (name, experience, created_at) VALUES (?, 0, ?)")
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(Character {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            experience: 0,
            created_at: now,
        })
    }

    pub async fn get_character(&self, character_id: i64) -> LedgerResult<Character> {
        let mut conn = self.pool.acquire().await?;
        fetch_character(&mut conn, character_id)
            .await?
            .ok_or(LedgerError::CharacterNotFound(character_id))
    }

    pub async fn create_quest(&self, quest: &NewQuest) -> LedgerResult<Quest> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO quests (name, description, experience, state, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&quest.name)
        .bind(&quest.description)
        .bind(quest.experience)
        .bind(QuestState::Pending.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Quest {
            id: result.last_insert_rowid(),
            name: quest.name.clone(),
            description: quest.description.clone(),
            experience: quest.experience,
            state: QuestState::Pending,
            created_at: now,
        })
    }

    pub async fn get_quest(&self, quest_id: i64) -> LedgerResult<Quest> {
        let mut conn = self.pool.acquire().await?;
        fetch_quest(&mut conn, quest_id)
            .await?
            .ok_or(LedgerError::QuestNotFound(quest_id))
    }

    pub async fn list_quests(&self) -> LedgerResult<Vec<Quest>> {
        let rows = sqlx::query(
            "SELECT id, name, description, experience, state, created_at FROM quests ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(quest_from_row).collect::<Result<Vec<_>, sqlx::Error>>()?)
    }

    pub async fn find_quest_by_name(&self, name: &str) -> LedgerResult<Option<Quest>> {
        let row = sqlx::query(
            "SELECT id, name, description, experience, state, created_at FROM quests WHERE name = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(quest_from_row).transpose()?)
    }

    pub async fn accept(&self, character_id: i64, quest_id: i64) -> LedgerResult<Assignment> {
        let _guard = self.locks.lock(character_id).await;
        // IMMEDIATE takes the write lock up front; a deferred read-then-write
        // transaction fails with SQLITE_BUSY instead of waiting on busy_timeout.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        if fetch_character(&mut tx, character_id).await?.is_none() {
            return Err(LedgerError::CharacterNotFound(character_id));
        }
        if fetch_quest(&mut tx, quest_id).await?.is_none() {
            return Err(LedgerError::QuestNotFound(quest_id));
        }

        let existing = sqlx::query("SELECT 1 FROM character_quests WHERE character_id = ? AND quest_id = ?")
            .bind(character_id)
            .bind(quest_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(LedgerError::DuplicateAssignment { character_id, quest_id });
        }

        let max_ordinal: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(ordinal), 0) FROM character_quests WHERE character_id = ?",
        )
        .bind(character_id)
        .fetch_one(&mut *tx)
        .await?;
        let ordinal = max_ordinal + 1;

        sqlx::query(
            "INSERT INTO character_quests (character_id, quest_id, ordinal, accepted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(character_id)
        .bind(quest_id)
        .bind(ordinal)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Assignment {
            character_id,
            quest_id,
            ordinal,
        })
    }

    pub async fn complete(&self, character_id: i64) -> LedgerResult<Completion> {
        let _guard = self.locks.lock(character_id).await;
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let mut character = fetch_character(&mut tx, character_id)
            .await?
            .ok_or(LedgerError::CharacterNotFound(character_id))?;

        let head = sqlx::query(
            "SELECT quest_id, ordinal FROM character_quests WHERE character_id = ? ORDER BY ordinal ASC LIMIT 1",
        )
        .bind(character_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::EmptyQueue(character_id))?;
        let quest_id: i64 = head.try_get("quest_id")?;
        let ordinal: i64 = head.try_get("ordinal")?;

        let mut quest = fetch_quest(&mut tx, quest_id)
            .await?
            .ok_or(LedgerError::QuestNotFound(quest_id))?;

        // Checked before any write so an overflow leaves the ledger untouched
        let experience = character
            .experience
            .checked_add(quest.experience)
            .ok_or(LedgerError::ExperienceOverflow { character_id, quest_id })?;

        // Only the first completion flips the shared quest state
        sqlx::query("UPDATE quests SET state = ? WHERE id = ? AND state = ?")
            .bind(QuestState::Completed.as_str())
            .bind(quest_id)
            .bind(QuestState::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        quest.state = QuestState::Completed;

        sqlx::query("UPDATE characters SET experience = ? WHERE id = ?")
            .bind(experience)
            .bind(character_id)
            .execute(&mut *tx)
            .await?;
        character.experience = experience;

        sqlx::query("DELETE FROM character_quests WHERE character_id = ? AND quest_id = ?")
            .bind(character_id)
            .bind(quest_id)
            .execute(&mut *tx)
            .await?;

        // Close the gap left by the removed assignment
        sqlx::query("UPDATE character_quests SET ordinal = ordinal - 1 WHERE character_id = ? AND ordinal > ?")
            .bind(character_id)
            .bind(ordinal)
            .execute(&mut *tx)
            .await?;

        let remaining = fetch_active_quests(&mut tx, character_id).await?;

        tx.commit().await?;

        Ok(Completion {
            quest,
            character,
            remaining,
        })
    }

    pub async fn list(&self, character_id: i64) -> LedgerResult<Vec<Quest>> {
        let mut conn = self.pool.acquire().await?;
        if fetch_character(&mut conn, character_id).await?.is_none() {
            return Err(LedgerError::CharacterNotFound(character_id));
        }

        Ok(fetch_active_quests(&mut conn, character_id).await?)
    }

    pub async fn assignments(&self, character_id: i64) -> LedgerResult<Vec<Assignment>> {
        let mut conn = self.pool.acquire().await?;
        if fetch_character(&mut conn, character_id).await?.is_none() {
            return Err(LedgerError::CharacterNotFound(character_id));
        }

        let rows = sqlx::query(
            "SELECT character_id, quest_id, ordinal FROM character_quests WHERE character_id = ? ORDER BY ordinal ASC",
        )
        .bind(character_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut assignments = Vec::with_capacity(rows.len());
        for row in &rows {
            assignments.push(Assignment {
                character_id: row.try_get("character_id")?,
                quest_id: row.try_get("quest_id")?,
                ordinal: row.try_get("ordinal")?,
            });
        }
        Ok(assignments)
    }
}

async fn fetch_character(conn: &mut SqliteConnection, character_id: i64) -> Result<Option<Character>, sqlx::Error> {
    let row = sqlx::query("SELECT id, name, experience, created_at FROM characters WHERE id = ?")
        .bind(character_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(character_from_row).transpose()
}

async fn fetch_quest(conn: &mut SqliteConnection, quest_id: i64) -> Result<Option<Quest>, sqlx::Error> {
    let row = sqlx::query("SELECT id, name, description, experience, state, created_at FROM quests WHERE id = ?")
        .bind(quest_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(quest_from_row).transpose()
}

async fn fetch_active_quests(conn: &mut SqliteConnection, character_id: i64) -> Result<Vec<Quest>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT q.id, q.name, q.description, q.experience, q.state, q.created_at
        FROM quests q
        JOIN character_quests cq ON cq.quest_id = q.id
        WHERE cq.character_id = ?
        ORDER BY cq.ordinal ASC"#,
    )
    .bind(character_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(quest_from_row).collect()
}

fn character_from_row(r: &SqliteRow) -> Result<Character, sqlx::Error> {
    Ok(Character {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        experience: r.try_get("experience")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn quest_from_row(r: &SqliteRow) -> Result<Quest, sqlx::Error> {
    let state: String = r.try_get("state")?;
    let state = QuestState::from_str(&state)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown quest state '{}'", state).into()))?;

    Ok(Quest {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        description: r.try_get("description")?,
        experience: r.try_get("experience")?,
        state,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_ledger(dir: &TempDir) -> SqliteLedger {
        let url = format!("sqlite:{}", dir.path().join("ledger.db").display());
        SqliteLedger::new(&url, 5, Duration::from_secs(5)).await.unwrap()
    }

    fn new_quest(name: &str, experience: i64) -> NewQuest {
        NewQuest {
            name: name.to_string(),
            description: None,
            experience,
        }
    }

    #[tokio::test]
    async fn test_accept_assigns_dense_ordinals() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir).await;
        let hero = ledger.create_character("Aria").await.unwrap();

        for i in 1..=3 {
            let quest = ledger.create_quest(&new_quest(&format!("quest {}", i), 5)).await.unwrap();
            let assignment = ledger.accept(hero.id, quest.id).await.unwrap();
            assert_eq!(assignment.ordinal, i);
        }

        let ordinals: Vec<i64> = ledger
            .assignments(hero.id)
            .await
            .unwrap()
            .iter()
            .map(|a| a.ordinal)
            .collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_complete_renumbers_remaining() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir).await;
        let hero = ledger.create_character("Aria").await.unwrap();
        let a = ledger.create_quest(&new_quest("A", 10)).await.unwrap();
        let b = ledger.create_quest(&new_quest("B", 20)).await.unwrap();
        let c = ledger.create_quest(&new_quest("C", 30)).await.unwrap();
        for quest in [&a, &b, &c] {
            ledger.accept(hero.id, quest.id).await.unwrap();
        }

        let done = ledger.complete(hero.id).await.unwrap();
        assert_eq!(done.quest.id, a.id);
        assert_eq!(done.quest.state, QuestState::Completed);
        assert_eq!(done.character.experience, 10);

        let remaining = ledger.assignments(hero.id).await.unwrap();
        assert_eq!(
            remaining.iter().map(|a| (a.quest_id, a.ordinal)).collect::<Vec<_>>(),
            vec![(b.id, 1), (c.id, 2)]
        );

        // A new accept goes to the back of the renumbered queue
        ledger.accept(hero.id, a.id).await.unwrap();
        let ordinals: Vec<i64> = ledger.assignments(hero.id).await.unwrap().iter().map(|a| a.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_accept_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir).await;
        let hero = ledger.create_character("Aria").await.unwrap();
        let quest = ledger.create_quest(&new_quest("A", 10)).await.unwrap();

        ledger.accept(hero.id, quest.id).await.unwrap();
        let err = ledger.accept(hero.id, quest.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAssignment { .. }));

        let listed = ledger.list(hero.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, quest.id);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir).await;
        let hero = ledger.create_character("Aria").await.unwrap();

        assert!(matches!(ledger.accept(999, 1).await, Err(LedgerError::CharacterNotFound(999))));
        assert!(matches!(ledger.accept(hero.id, 42).await, Err(LedgerError::QuestNotFound(42))));
        assert!(matches!(ledger.complete(999).await, Err(LedgerError::CharacterNotFound(999))));
        assert!(matches!(ledger.list(999).await, Err(LedgerError::CharacterNotFound(999))));
        assert!(matches!(ledger.complete(hero.id).await, Err(LedgerError::EmptyQueue(_))));

        let hero = ledger.get_character(hero.id).await.unwrap();
        assert_eq!(hero.experience, 0);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let (hero_id, quest_id) = {
            let ledger = open_ledger(&dir).await;
            let hero = ledger.create_character("Aria").await.unwrap();
            let quest = ledger.create_quest(&new_quest("A", 10)).await.unwrap();
            ledger.accept(hero.id, quest.id).await.unwrap();
            ledger.close().await;
            (hero.id, quest.id)
        };

        let ledger = open_ledger(&dir).await;
        let listed = ledger.list(hero_id).await.unwrap();
        assert_eq!(listed.iter().map(|q| q.id).collect::<Vec<_>>(), vec![quest_id]);
        assert_eq!(ledger.find_quest_by_name("A").await.unwrap().map(|q| q.id), Some(quest_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_characters_do_not_fail_busy() {
        let dir = TempDir::new().unwrap();
        let ledger = std::sync::Arc::new(open_ledger(&dir).await);

        let mut handles = Vec::new();
        for i in 0..40 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let hero = ledger.create_character(&format!("Hero {}", i)).await?;
                let quest = ledger.create_quest(&new_quest(&format!("Q{}", i), i)).await?;
                ledger.accept(hero.id, quest.id).await?;
                let done = ledger.complete(hero.id).await?;
                Ok::<_, LedgerError>((done.character.experience, i))
            }));
        }

        for handle in handles {
            let (experience, expected) = handle.await.unwrap().unwrap();
            assert_eq!(experience, expected);
        }
        assert!(ledger.locks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_characters_leave_no_locks_behind() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir).await;

        for id in 1_000..1_500 {
            assert!(matches!(ledger.complete(id).await, Err(LedgerError::CharacterNotFound(_))));
            assert!(matches!(ledger.accept(id, 1).await, Err(LedgerError::CharacterNotFound(_))));
        }
        assert!(ledger.locks.is_empty());
    }
}
