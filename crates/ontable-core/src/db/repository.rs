//! Decision repository implementation

use crate::error::{Error, Result};
use crate::models::{Decision, DecisionId};
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for decision storage operations
pub trait DecisionRepository {
    /// Get a decision by ID
    fn load(&self, id: &DecisionId) -> Result<Option<Decision>>;

    /// Insert or replace a decision
    fn save(&self, decision: &Decision) -> Result<()>;

    /// Delete a decision
    fn delete(&self, id: &DecisionId) -> Result<()>;

    /// List decisions, most recently updated first
    fn list(&self) -> Result<Vec<Decision>>;
}

/// `SQLite` implementation of `DecisionRepository`
///
/// Decisions are stored as JSON documents next to the columns needed for
/// listing.
pub struct SqliteDecisionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDecisionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_document(raw: &str) -> Result<Decision> {
        let mut decision: Decision = serde_json::from_str(raw)?;
        if !decision.is_well_formed() {
            return Err(Error::Database(format!(
                "stored decision {} has no options",
                decision.id
            )));
        }
        decision.normalize();
        Ok(decision)
    }
}

impl DecisionRepository for SqliteDecisionRepository<'_> {
    fn load(&self, id: &DecisionId) -> Result<Option<Decision>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM decisions WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        document.as_deref().map(Self::parse_document).transpose()
    }

    fn save(&self, decision: &Decision) -> Result<()> {
        if !decision.is_well_formed() {
            return Err(Error::InvalidInput(
                "a decision needs at least one option".into(),
            ));
        }

        let document = serde_json::to_string(decision)?;
        self.conn.execute(
            "INSERT INTO decisions (id, title, document, created_at, updated_at, is_resolved)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                document = excluded.document,
                updated_at = excluded.updated_at,
                is_resolved = excluded.is_resolved",
            params![
                decision.id.as_str(),
                decision.title,
                document,
                decision.created_at,
                decision.updated_at,
                i32::from(decision.is_resolved())
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &DecisionId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM decisions WHERE id = ?", params![id.as_str()])?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn list(&self) -> Result<Vec<Decision>> {
        let mut stmt = self
            .conn
            .prepare("SELECT document FROM decisions ORDER BY updated_at DESC")?;

        let documents = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        documents
            .iter()
            .map(|raw| Self::parse_document(raw))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::DecisionOption;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let db = setup();
        let repo = SqliteDecisionRepository::new(db.connection());

        let mut decision = Decision::new("Which laptop", ["Air", "Pro"]).unwrap();
        decision.options[0] = decision.options[0].clone().with_pro("Light", 4);
        repo.save(&decision).unwrap();

        let fetched = repo.load(&decision.id).unwrap().unwrap();
        assert_eq!(fetched, decision);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let db = setup();
        let repo = SqliteDecisionRepository::new(db.connection());
        assert!(repo.load(&DecisionId::new()).unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_existing() {
        let db = setup();
        let repo = SqliteDecisionRepository::new(db.connection());

        let mut decision = Decision::new("Which laptop", ["Air", "Pro"]).unwrap();
        repo.save(&decision).unwrap();

        decision.rename("Which laptop for travel");
        decision.add_option(DecisionOption::new("Framework"));
        repo.save(&decision).unwrap();

        let all = repo.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Which laptop for travel");
        assert_eq!(all[0].options.len(), 3);
    }

    #[test]
    fn test_delete() {
        let db = setup();
        let repo = SqliteDecisionRepository::new(db.connection());

        let decision = Decision::new("To delete", ["A", "B"]).unwrap();
        repo.save(&decision).unwrap();
        repo.delete(&decision.id).unwrap();

        assert!(repo.load(&decision.id).unwrap().is_none());
        assert!(matches!(
            repo.delete(&decision.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_newest_first() {
        let db = setup();
        let repo = SqliteDecisionRepository::new(db.connection());

        let mut older = Decision::new("Older", ["A", "B"]).unwrap();
        older.updated_at = 1_000;
        let mut newer = Decision::new("Newer", ["A", "B"]).unwrap();
        newer.updated_at = 2_000;
        repo.save(&older).unwrap();
        repo.save(&newer).unwrap();

        let titles: Vec<String> = repo.list().unwrap().into_iter().map(|d| d.title).collect();
        assert_eq!(titles, vec!["Newer".to_string(), "Older".to_string()]);
    }

    #[test]
    fn test_save_rejects_empty_decision() {
        let db = setup();
        let repo = SqliteDecisionRepository::new(db.connection());

        let mut decision = Decision::new("Broken", ["A"]).unwrap();
        decision.options.clear();
        assert!(repo.save(&decision).is_err());
    }
}
