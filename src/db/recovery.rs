use super::{BEGIN_WRITE, Database};
use crate::models::RecoveryCodeRecord;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    /// Replaces every stored code of the user with the given hashes.
    pub async fn replace_recovery_codes(
        &self,
        user_id: &str,
        code_hashes: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for hash in code_hashes {
            sqlx::query(
                "INSERT INTO recovery_codes (id, user_id, code_hash, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn unused_recovery_codes(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecoveryCodeRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, code_hash FROM recovery_codes WHERE user_id = ? AND used_at IS NULL",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(RecoveryCodeRecord {
                    id: row.try_get("id")?,
                    code_hash: row.try_get("code_hash")?,
                })
            })
            .collect()
    }

    /// Returns false when the code had already been used.
    pub async fn mark_recovery_code_used(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE recovery_codes SET used_at = ? WHERE id = ? AND used_at IS NULL")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn codes_are_replaced_and_used_once() {
        let db = Database::in_memory().await.unwrap();
        db.replace_recovery_codes("u1", &["h1".to_string(), "h2".to_string()])
            .await
            .unwrap();
        db.replace_recovery_codes("u2", &["other".to_string()])
            .await
            .unwrap();

        let codes = db.unused_recovery_codes("u1").await.unwrap();
        assert_eq!(codes.len(), 2);
        assert!(codes.iter().all(|c| c.code_hash.starts_with('h')));

        assert!(db.mark_recovery_code_used(&codes[0].id).await.unwrap());
        assert!(!db.mark_recovery_code_used(&codes[0].id).await.unwrap());
        assert_eq!(db.unused_recovery_codes("u1").await.unwrap().len(), 1);

        db.replace_recovery_codes("u1", &["h3".to_string()]).await.unwrap();
        let codes = db.unused_recovery_codes("u1").await.unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code_hash, "h3");
        assert_eq!(db.unused_recovery_codes("u2").await.unwrap().len(), 1);
    }
}
