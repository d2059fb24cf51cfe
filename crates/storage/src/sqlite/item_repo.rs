use std::collections::HashMap;

use vocab_core::model::{CollectionId, Item, ItemId, ValidatedItem};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, item_id_from_i64, map_item_row};
use crate::repository::{ItemRepository, StorageError};

#[async_trait::async_trait]
impl ItemRepository for SqliteRepository {
    async fn insert_new_item(&self, item: ValidatedItem) -> Result<Item, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO items (collection_id, prompt, aid, translation, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id_i64("collection_id", item.collection_id().value())?)
        .bind(item.prompt().to_owned())
        .bind(item.aid().to_owned())
        .bind(item.translation().to_owned())
        .bind(item.created_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = item_id_from_i64(res.last_insert_rowid())?;
        Ok(item.assign_id(id))
    }

    async fn get_items(
        &self,
        collection_id: CollectionId,
        ids: &[ItemId],
    ) -> Result<Vec<Item>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT id, collection_id, prompt, aid, translation, created_at
            FROM items
            WHERE collection_id = ?1 AND id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql).bind(id_i64("collection_id", collection_id.value())?);
        for id in ids {
            q = q.bind(id_i64("item_id", id.value())?);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut by_id: HashMap<ItemId, Item> = HashMap::with_capacity(rows.len());
        for row in rows {
            let item = map_item_row(&row)?;
            by_id.insert(item.id(), item);
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // Duplicated ids in the request resolve to the same row.
            match by_id.get(id) {
                Some(item) => out.push(item.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(out)
    }

    async fn list_items(&self, collection_id: CollectionId) -> Result<Vec<Item>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, collection_id, prompt, aid, translation, created_at
            FROM items
            WHERE collection_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("collection_id", collection_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_item_row).collect()
    }
}
