use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::StoredBlob;

impl Database {
    pub fn insert_blob(&self, blob: &StoredBlob) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO blobs (id, bucket, path, size, blake3_hash, content_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    blob.id.to_string(),
                    blob.bucket,
                    blob.path,
                    blob.size,
                    blob.blake3_hash,
                    blob.content_type,
                    blob.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::from_write(e, "blobs"))?;
        Ok(())
    }

    pub fn get_blob(&self, bucket: &str, path: &str) -> Result<StoredBlob> {
        self.conn()
            .query_row(
                "SELECT id, bucket, path, size, blake3_hash, content_type, created_at
                 FROM blobs
                 WHERE bucket = ?1 AND path = ?2",
                params![bucket, path],
                row_to_blob,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn delete_blob(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM blobs WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_blob(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredBlob> {
    let id_str: String = row.get(0)?;
    let ts_str: String = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredBlob {
        id,
        bucket: row.get(1)?,
        path: row.get(2)?,
        size: row.get(3)?,
        blake3_hash: row.get(4)?,
        content_type: row.get(5)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(path: &str) -> StoredBlob {
        StoredBlob {
            id: Uuid::new_v4(),
            bucket: "chat-media".into(),
            path: path.into(),
            size: 3,
            blake3_hash: blake3::hash(b"abc").to_hex().to_string(),
            content_type: "text/plain".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_blob_metadata_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let original = blob("anna/cv.txt");
        db.insert_blob(&original).unwrap();

        let fetched = db.get_blob("chat-media", "anna/cv.txt").unwrap();
        assert_eq!(fetched.id, original.id);
        assert_eq!(fetched.blake3_hash, original.blake3_hash);

        assert!(matches!(
            db.insert_blob(&blob("anna/cv.txt")),
            Err(StoreError::Conflict { .. })
        ));

        assert!(db.delete_blob(original.id).unwrap());
        assert!(matches!(
            db.get_blob("chat-media", "anna/cv.txt"),
            Err(StoreError::NotFound)
        ));
    }
}
