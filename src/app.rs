use crate::features::subscriptions::{
    CategoryTotal, LedgerSnapshot, LedgerStore, LedgerSummary, NewSubscription,
    SqliteSubscriptionRepository, Subscription, SubscriptionPatch, SubscriptionRepository,
};
use crate::shared::config::{
    initialize_application, initialize_logging_system, load_environment_variables,
    log_initialization_complete, EnvironmentConfig,
};
use crate::shared::database::StorageLocation;
use crate::shared::errors::AppResult;
use std::sync::Arc;

/// アプリケーションの構成ルート
///
/// 永続化層と LedgerStore を明示的に生成して保持する。
/// 表示層はこのインスタンスを参照で受け取って使用する
pub struct SubscriptionLedger {
    repository: Arc<dyn SubscriptionRepository>,
    store: LedgerStore,
}

impl SubscriptionLedger {
    /// 永続化層を指定して作成する（未初期化）
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        let store = LedgerStore::new(Arc::clone(&repository));
        Self { repository, store }
    }

    /// SQLiteの保存先を指定して作成する（未初期化）
    pub fn with_location(location: StorageLocation) -> Self {
        Self::new(Arc::new(SqliteSubscriptionRepository::new(location)))
    }

    /// 環境設定に従ってアプリケーションを起動する
    ///
    /// # 処理内容
    /// 1. ログシステムの初期化
    /// 2. .envファイルの読み込み
    /// 3. データディレクトリとデータベースパスの決定
    /// 4. データベースの初期化と一覧の読み込み
    pub async fn bootstrap() -> AppResult<Self> {
        initialize_logging_system();
        load_environment_variables();

        log::info!("アプリケーション初期化を開始します...");

        let config = EnvironmentConfig::from_env();
        let init_result = initialize_application(&config)?;

        let ledger = Self::with_location(StorageLocation::File(init_result.database_path.clone()));
        ledger.initialize().await.map_err(|e| {
            log::error!("データベースの初期化に失敗しました: {e}");
            e
        })?;

        log_initialization_complete(&init_result);

        Ok(ledger)
    }

    /// ストレージを初期化し、一覧を読み込む
    ///
    /// 読み込みの失敗はストアの error に反映され、ここではエラーにならない
    pub async fn initialize(&self) -> AppResult<()> {
        self.repository.initialize().await?;
        self.store.load().await;
        Ok(())
    }

    /// ストレージを閉じる
    pub async fn shutdown(&self) -> AppResult<()> {
        self.repository.close().await?;
        log::info!("アプリケーションを終了しました");
        Ok(())
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub async fn load_subscriptions(&self) {
        self.store.load().await;
    }

    pub async fn add_subscription(&self, subscription: NewSubscription) {
        self.store.add(subscription).await;
    }

    pub async fn update_subscription(&self, id: i64, patch: SubscriptionPatch) {
        self.store.update(id, patch).await;
    }

    pub async fn delete_subscription(&self, id: i64) {
        self.store.remove(id).await;
    }

    pub fn get_monthly_total(&self) -> f64 {
        self.store.monthly_total()
    }

    pub async fn get_subscriptions_by_category(&self) -> Vec<CategoryTotal> {
        self.store.category_totals().await
    }

    pub fn get_summary(&self) -> LedgerSummary {
        self.store.summary()
    }

    pub fn subscriptions(&self) -> Arc<[Subscription]> {
        self.store.subscriptions()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.store.error()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.store.snapshot()
    }
}
