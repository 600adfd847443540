//! Table-oriented persistence used for the reference dataset and the
//! published match snapshot.
//!
//! Two backends ship: [`PostgrestStore`] (Supabase REST) and
//! [`PostgresStore`] (direct sqlx pool). [`MemoryStore`] backs tests and
//! dry runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod postgrest;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::{DbPoolConfig, PostgresStore};
pub use postgrest::PostgrestStore;

use crate::types::ReferenceProfile;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Every row of `table` as a JSON object.
    async fn select_all(&self, table: &str) -> Result<Vec<Value>>;

    /// Remove every row of `table`.
    async fn delete_all(&self, table: &str) -> Result<()>;

    /// Insert `rows` (JSON objects) and return how many were written.
    async fn insert_batch(&self, table: &str, rows: &[Value]) -> Result<usize>;

    fn name(&self) -> &str;
}

/// Accept plain SQL identifiers only (`name` or `schema.name`).
pub fn validate_identifier(identifier: &str) -> Result<&str> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(StoreError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(identifier)
}

/// Load the reference dataset, skipping rows without a usable name.
pub async fn load_reference_profiles(
    store: &dyn TableStore,
    table: &str,
    name_column: &str,
) -> Result<Vec<ReferenceProfile>> {
    let rows = store.select_all(table).await?;
    let total = rows.len();
    let profiles: Vec<ReferenceProfile> = rows
        .iter()
        .filter_map(|row| ReferenceProfile::from_row(row, name_column))
        .collect();

    if profiles.len() < total {
        warn!(
            "Skipped {} reference rows without a '{}' value",
            total - profiles.len(),
            name_column
        );
    }
    info!(store = store.name(), table, count = profiles.len(), "Loaded reference profiles");
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("upcoming_matches").is_ok());
        assert!(validate_identifier("public.atp_elo_ratings").is_ok());
        assert!(validate_identifier("_t1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("matches; DROP TABLE x").is_err());
        assert!(validate_identifier("\"quoted\"").is_err());
    }

    #[tokio::test]
    async fn test_load_reference_profiles_skips_nameless_rows() {
        let store = MemoryStore::new();
        store.seed(
            "atp_elo_ratings",
            vec![
                json!({"player": "Jane Doe", "elo": 2000}),
                json!({"player": null, "elo": 1500}),
                json!({"elo": 1400}),
                json!({"player": "Ann Lee", "elo": 1900}),
            ],
        );

        let profiles = load_reference_profiles(&store, "atp_elo_ratings", "player").await.unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["Jane Doe", "Ann Lee"]);
        assert_eq!(profiles[0].attributes["elo"], 2000);
    }
}
