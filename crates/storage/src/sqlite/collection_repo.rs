use vocab_core::model::{Collection, CollectionId, LearnerId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_collection_row};
use crate::repository::{CollectionRepository, StorageError};

#[async_trait::async_trait]
impl CollectionRepository for SqliteRepository {
    async fn upsert_collection(&self, collection: &Collection) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO collections (id, owner_id, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                description = excluded.description
            ",
        )
        .bind(id_i64("collection_id", collection.id().value())?)
        .bind(id_i64("owner_id", collection.owner().value())?)
        .bind(collection.name().to_owned())
        .bind(collection.description().map(ToOwned::to_owned))
        .bind(collection.created_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Collection, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, name, description, created_at
            FROM collections
            WHERE id = ?1
            ",
        )
        .bind(id_i64("collection_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_collection_row(&row)
    }

    async fn list_collections(&self, owner: LearnerId) -> Result<Vec<Collection>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, owner_id, name, description, created_at
            FROM collections
            WHERE owner_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("owner_id", owner.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_collection_row).collect()
    }
}
