//! Read-through schema catalog
//!
//! [`SchemaCatalog`] is the process-scoped handle through which the kernel
//! loads entity schemas and index state. Reads go through a TTL'd cache;
//! mutations persist first, then invalidate. There is exactly one
//! persisted registry, `/_schema/<entity>`, and one `persist` path.
//!
//! Stale reads within the TTL are permitted by contract: schema mutations
//! either wait out the TTL before relying on publication or call
//! `invalidate`/`clear_cache` on every process explicitly.

use std::time::Duration;
use tracing::debug;

use facet_core::{Error, Result, Subspace, Tuple};
use facet_kv::KvTransaction;

use crate::cache::TtlCache;
use crate::schema::EntitySchema;
use crate::state::IndexState;

/// Cached, persisted access to entity schemas and index state
#[derive(Debug)]
pub struct SchemaCatalog {
    schemas: TtlCache<String, EntitySchema>,
    states: TtlCache<String, IndexState>,
}

impl SchemaCatalog {
    /// Create a catalog whose cache entries stay fresh for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            schemas: TtlCache::new(ttl),
            states: TtlCache::new(ttl),
        }
    }

    /// The schema registry subspace: `/_schema/`
    pub fn schema_subspace() -> Subspace {
        Subspace::from_tuple(&Tuple::new().with("_schema"))
    }

    /// The data subspace of an entity: `/D/<entity>/`
    pub fn data_subspace(entity: &str) -> Subspace {
        Subspace::from_tuple(&Tuple::new().with("D").with(entity))
    }

    /// The state key of an index: `/I/<name>/_state`
    fn state_key(index_name: &str) -> Vec<u8> {
        Subspace::from_tuple(&Tuple::new().with("I").with(index_name))
            .pack(&Tuple::new().with("_state"))
    }

    /// Persist `schema` and invalidate its cache entry
    ///
    /// # Errors
    ///
    /// `Serialization` when the document cannot be encoded; KV errors
    /// propagate from the transaction.
    pub fn persist_schema(
        &self,
        tx: &mut dyn KvTransaction,
        schema: &EntitySchema,
    ) -> Result<()> {
        let key = Self::schema_subspace().pack(&Tuple::new().with(schema.name.as_str()));
        let doc = serde_json::to_vec(schema).map_err(|e| Error::Serialization(e.to_string()))?;
        tx.set(&key, &doc);
        self.schemas.invalidate(&schema.name);
        debug!(target: "facet::catalog", entity = %schema.name, "schema persisted");
        Ok(())
    }

    /// Load the schema of `entity`, read-through cached
    ///
    /// # Errors
    ///
    /// `NotFound` when no schema document exists for `entity`.
    pub fn load_schema(
        &self,
        tx: &mut dyn KvTransaction,
        entity: &str,
    ) -> Result<EntitySchema> {
        if let Some(schema) = self.schemas.get(&entity.to_string()) {
            return Ok(schema);
        }
        let key = Self::schema_subspace().pack(&Tuple::new().with(entity));
        let doc = tx
            .get(&key, true)?
            .ok_or_else(|| Error::NotFound(format!("no schema for entity '{}'", entity)))?;
        let schema: EntitySchema =
            serde_json::from_slice(&doc).map_err(|e| Error::Serialization(e.to_string()))?;
        self.schemas.insert(entity.to_string(), schema.clone());
        Ok(schema)
    }

    /// Persist the lifecycle state of `index_name` and invalidate it
    ///
    /// # Errors
    ///
    /// `Serialization` when the document cannot be encoded.
    pub fn store_index_state(
        &self,
        tx: &mut dyn KvTransaction,
        index_name: &str,
        state: &IndexState,
    ) -> Result<()> {
        let doc = serde_json::to_vec(state).map_err(|e| Error::Serialization(e.to_string()))?;
        tx.set(&Self::state_key(index_name), &doc);
        self.states.invalidate(&index_name.to_string());
        debug!(
            target: "facet::catalog",
            index = index_name,
            state = %state.state,
            "index state persisted"
        );
        Ok(())
    }

    /// Load the lifecycle state of `index_name`, read-through cached
    ///
    /// A missing state document reads as `ReadWrite`.
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn load_index_state(
        &self,
        tx: &mut dyn KvTransaction,
        index_name: &str,
    ) -> Result<IndexState> {
        if let Some(state) = self.states.get(&index_name.to_string()) {
            return Ok(state);
        }
        let state = match tx.get(&Self::state_key(index_name), true)? {
            Some(doc) => serde_json::from_slice(&doc)
                .map_err(|e| Error::Serialization(e.to_string()))?,
            None => IndexState::default(),
        };
        self.states.insert(index_name.to_string(), state.clone());
        Ok(state)
    }

    /// Drop every cached schema and state
    pub fn clear_cache(&self) {
        self.schemas.clear();
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{IndexDescriptor, IndexKind};
    use crate::expr::KeyExpression;
    use crate::schema::FieldType;
    use crate::state::IndexStateKind;
    use facet_kv::MemoryDatabase;

    fn sample_schema() -> EntitySchema {
        EntitySchema::new("user")
            .with_field("email", FieldType::String, false, false)
            .with_index(IndexDescriptor::new(
                "by_email",
                IndexKind::Scalar,
                KeyExpression::field("email"),
            ))
    }

    #[test]
    fn persist_then_load() {
        let db = MemoryDatabase::new();
        let catalog = SchemaCatalog::new(Duration::from_secs(60));
        db.run(|tx| catalog.persist_schema(tx, &sample_schema()))
            .unwrap();
        let loaded = db.run(|tx| catalog.load_schema(tx, "user")).unwrap();
        assert_eq!(loaded, sample_schema());
    }

    #[test]
    fn missing_schema_is_not_found() {
        let db = MemoryDatabase::new();
        let catalog = SchemaCatalog::new(Duration::from_secs(60));
        let err = db.run(|tx| catalog.load_schema(tx, "ghost")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn cache_serves_stale_until_invalidated() {
        let db = MemoryDatabase::new();
        let catalog = SchemaCatalog::new(Duration::from_secs(60));
        db.run(|tx| catalog.persist_schema(tx, &sample_schema()))
            .unwrap();
        db.run(|tx| catalog.load_schema(tx, "user")).unwrap();

        // Overwrite behind the cache's back.
        let mut changed = sample_schema();
        changed.fields[0].optional = true;
        let key = SchemaCatalog::schema_subspace().pack(&Tuple::new().with("user"));
        let doc = serde_json::to_vec(&changed).unwrap();
        db.run(|tx| {
            tx.set(&key, &doc);
            Ok(())
        })
        .unwrap();

        let cached = db.run(|tx| catalog.load_schema(tx, "user")).unwrap();
        assert!(!cached.fields[0].optional);

        catalog.clear_cache();
        let fresh = db.run(|tx| catalog.load_schema(tx, "user")).unwrap();
        assert!(fresh.fields[0].optional);
    }

    #[test]
    fn index_state_defaults_to_read_write() {
        let db = MemoryDatabase::new();
        let catalog = SchemaCatalog::new(Duration::from_secs(60));
        let state = db
            .run(|tx| catalog.load_index_state(tx, "by_email"))
            .unwrap();
        assert_eq!(state.state, IndexStateKind::ReadWrite);
    }

    #[test]
    fn index_state_round_trips() {
        let db = MemoryDatabase::new();
        let catalog = SchemaCatalog::new(Duration::from_secs(60));
        let state = IndexState::write_only(Some(vec![9, 9]));
        db.run(|tx| catalog.store_index_state(tx, "by_email", &state))
            .unwrap();
        let loaded = db
            .run(|tx| catalog.load_index_state(tx, "by_email"))
            .unwrap();
        assert_eq!(loaded, state);
    }
}
