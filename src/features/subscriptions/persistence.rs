use super::models::{CategoryTotal, NewSubscription, Subscription, SubscriptionPatch};
use super::repository;
use crate::shared::database::{create_tables, open_database, StorageLocation};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// サブスクリプション永続化層の契約
///
/// LedgerStore はこのトレイトにのみ依存する
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// ストレージとスキーマを用意する（冪等）
    async fn initialize(&self) -> AppResult<()>;
    /// 全件を作成日時の新しい順で取得する
    async fn list_all(&self) -> AppResult<Vec<Subscription>>;
    async fn find_by_id(&self, id: i64) -> AppResult<Subscription>;
    async fn create(&self, new_subscription: NewSubscription) -> AppResult<Subscription>;
    /// 更新項目がない場合はIDを確認せずに成功する
    async fn update(&self, id: i64, patch: SubscriptionPatch) -> AppResult<()>;
    /// 存在しないIDでも成功する
    async fn delete(&self, id: i64) -> AppResult<()>;
    async fn category_totals(&self) -> AppResult<Vec<CategoryTotal>>;
    async fn monthly_total(&self) -> AppResult<f64>;
    /// 接続を閉じる。以降の操作は再初期化までNotInitializedになる
    async fn close(&self) -> AppResult<()>;
}

/// SQLiteによる永続化層の実装
///
/// rusqlite の同期APIをブロッキングスレッドプール上で実行する
pub struct SqliteSubscriptionRepository {
    location: StorageLocation,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteSubscriptionRepository {
    /// 未初期化の永続化層を作成する
    ///
    /// # 引数
    /// * `location` - データベースの保存先
    pub fn new(location: StorageLocation) -> Self {
        Self {
            location,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// メモリ上のデータベースを使用する永続化層を作成する
    pub fn in_memory() -> Self {
        Self::new(StorageLocation::InMemory)
    }

    /// 保存先を取得する
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// 接続をロックし、ブロッキングスレッド上で処理を実行する
    async fn with_connection<T, F>(&self, operation: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> AppResult<T> {
            let guard = conn
                .lock()
                .map_err(|e| AppError::storage(format!("データベースロックエラー: {e}")))?;
            let conn = guard.as_ref().ok_or(AppError::NotInitialized)?;
            operation(conn)
        })
        .await
        .map_err(|e| AppError::storage(format!("データベース処理の実行に失敗しました: {e}")))?
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn initialize(&self) -> AppResult<()> {
        let conn = Arc::clone(&self.conn);
        let location = self.location.clone();

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let mut guard = conn
                .lock()
                .map_err(|e| AppError::storage(format!("データベースロックエラー: {e}")))?;

            // 既に開いている場合はスキーマの確認のみ行う
            if let Some(existing) = guard.as_ref() {
                return create_tables(existing);
            }

            *guard = Some(open_database(&location)?);
            Ok(())
        })
        .await
        .map_err(|e| AppError::storage(format!("データベース初期化の実行に失敗しました: {e}")))?
    }

    async fn list_all(&self) -> AppResult<Vec<Subscription>> {
        self.with_connection(repository::find_all).await
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Subscription> {
        self.with_connection(move |conn| repository::find_by_id(conn, id))
            .await
    }

    async fn create(&self, new_subscription: NewSubscription) -> AppResult<Subscription> {
        self.with_connection(move |conn| repository::create(conn, new_subscription))
            .await
    }

    async fn update(&self, id: i64, patch: SubscriptionPatch) -> AppResult<()> {
        self.with_connection(move |conn| repository::update(conn, id, patch))
            .await
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        self.with_connection(move |conn| repository::delete(conn, id))
            .await
    }

    async fn category_totals(&self) -> AppResult<Vec<CategoryTotal>> {
        self.with_connection(repository::category_totals).await
    }

    async fn monthly_total(&self) -> AppResult<f64> {
        self.with_connection(repository::monthly_total).await
    }

    async fn close(&self) -> AppResult<()> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let mut guard = conn
                .lock()
                .map_err(|e| AppError::storage(format!("データベースロックエラー: {e}")))?;

            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| {
                    AppError::storage(format!("データベースのクローズに失敗しました: {e}"))
                })?;
                log::info!("データベース接続を閉じました");
            }

            Ok(())
        })
        .await
        .map_err(|e| AppError::storage(format!("データベースクローズの実行に失敗しました: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::models::BillingFrequency;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_operations_before_initialize_fail() {
        let repo = SqliteSubscriptionRepository::in_memory();

        assert!(matches!(repo.list_all().await, Err(AppError::NotInitialized)));
        assert!(matches!(
            repo.create(NewSubscription::new("Netflix", 1000.0, date(2024, 1, 1)))
                .await,
            Err(AppError::NotInitialized)
        ));
        assert!(matches!(
            repo.update(1, SubscriptionPatch::default()).await,
            Err(AppError::NotInitialized)
        ));
        assert!(matches!(repo.delete(1).await, Err(AppError::NotInitialized)));
        assert!(matches!(
            repo.category_totals().await,
            Err(AppError::NotInitialized)
        ));
        assert!(matches!(
            repo.monthly_total().await,
            Err(AppError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let repo = SqliteSubscriptionRepository::in_memory();
        repo.initialize().await.unwrap();

        repo.create(NewSubscription::new("Netflix", 1000.0, date(2024, 1, 1)))
            .await
            .unwrap();

        // 再初期化でデータが失われない
        repo.initialize().await.unwrap();
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_unavailable_storage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("subscriptions.db");
        let repo = SqliteSubscriptionRepository::new(StorageLocation::File(path));

        assert!(matches!(
            repo.initialize().await,
            Err(AppError::StorageUnavailable(_))
        ));
        assert!(matches!(repo.list_all().await, Err(AppError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("subscriptions.db");

        let repo = SqliteSubscriptionRepository::new(StorageLocation::File(path.clone()));
        repo.initialize().await.unwrap();

        let input = NewSubscription {
            currency: Some("EUR".to_string()),
            frequency: Some(BillingFrequency::Annual),
            payment_method: Some("Débito".to_string()),
            category: Some("Software".to_string()),
            ..NewSubscription::new("Plan Anual", 12000.0, date(2024, 12, 31))
        };
        let created = repo.create(input.clone()).await.unwrap();
        repo.close().await.unwrap();

        // 別インスタンスで開き直しても同じ内容が読める
        let reopened = SqliteSubscriptionRepository::new(StorageLocation::File(path));
        reopened.initialize().await.unwrap();
        let all = reopened.list_all().await.unwrap();

        assert_eq!(all.len(), 1);
        let stored = &all[0];
        assert_eq!(stored, &created);
        assert_eq!(stored.name, input.name);
        assert_eq!(stored.amount, input.amount);
        assert_eq!(stored.currency, "EUR");
        assert_eq!(stored.frequency, BillingFrequency::Annual);
        assert_eq!(stored.next_payment_date, input.next_payment_date);
        assert_eq!(stored.payment_method, input.payment_method);
        assert_eq!(stored.category, input.category);
        assert_eq!(stored.created_at, stored.updated_at);
    }

    #[tokio::test]
    async fn test_close_then_reinitialize() {
        let repo = SqliteSubscriptionRepository::in_memory();
        repo.initialize().await.unwrap();
        repo.close().await.unwrap();

        assert!(matches!(repo.list_all().await, Err(AppError::NotInitialized)));
        // 未接続のクローズは何もしない
        repo.close().await.unwrap();

        repo.initialize().await.unwrap();
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregates_at_storage_boundary() {
        let repo = SqliteSubscriptionRepository::in_memory();
        repo.initialize().await.unwrap();

        repo.create(NewSubscription::new("Netflix", 1000.0, date(2024, 1, 1)))
            .await
            .unwrap();
        repo.create(NewSubscription {
            frequency: Some(BillingFrequency::Annual),
            category: Some("Software".to_string()),
            ..NewSubscription::new("Plan Anual", 12000.0, date(2024, 6, 1))
        })
        .await
        .unwrap();

        assert_eq!(repo.monthly_total().await.unwrap(), 2000.0);

        let totals = repo.category_totals().await.unwrap();
        assert_eq!(totals.len(), 2);
        assert!(totals
            .iter()
            .any(|t| t.category == "uncategorized" && t.total == 1000.0));
        assert!(totals
            .iter()
            .any(|t| t.category == "Software" && t.total == 1000.0));
    }
}
