use super::aggregates::{self, LedgerSummary};
use super::models::{CategoryTotal, NewSubscription, Subscription, SubscriptionPatch};
use super::persistence::SubscriptionRepository;
use crate::shared::errors::{AppError, AppResult};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// 表示層から発行される操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerIntent {
    Load,
    Add,
    Update,
    Remove,
}

impl LedgerIntent {
    /// 失敗時に表示するメッセージ
    pub fn failure_message(&self) -> &'static str {
        match self {
            LedgerIntent::Load => "サブスクリプションの読み込みに失敗しました",
            LedgerIntent::Add => "サブスクリプションの追加に失敗しました",
            LedgerIntent::Update => "サブスクリプションの更新に失敗しました",
            LedgerIntent::Remove => "サブスクリプションの削除に失敗しました",
        }
    }
}

/// LedgerStore の状態のスナップショット
///
/// subscriptions は丸ごと差し替えられるため、取得済みのスナップショットが
/// 途中まで更新された状態になることはない
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    /// 作成日時の新しい順に並んだサブスクリプション一覧
    pub subscriptions: Arc<[Subscription]>,
    /// 操作の実行中かどうか
    pub is_loading: bool,
    /// 直近の操作のエラーメッセージ
    pub error: Option<String>,
    /// 一度でも読み込みに成功したか
    pub is_loaded: bool,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            subscriptions: Arc::from(Vec::new()),
            is_loading: false,
            error: None,
            is_loaded: false,
        }
    }
}

/// サブスクリプション一覧のメモリ上の写し
///
/// 変更操作は永続化層に委譲し、成功したら一覧を丸ごと再取得する。
/// 失敗した場合は一覧をそのまま残し、error にメッセージを設定する。
/// 操作は一つずつ順番に実行される
pub struct LedgerStore {
    repository: Arc<dyn SubscriptionRepository>,
    state: RwLock<LedgerSnapshot>,
    intent_gate: Mutex<()>,
}

impl LedgerStore {
    /// 永続化層を受け取ってストアを作成する（未読み込み状態）
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self {
            repository,
            state: RwLock::new(LedgerSnapshot::default()),
            intent_gate: Mutex::new(()),
        }
    }

    /// 現在の状態を取得する
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscriptions(&self) -> Arc<[Subscription]> {
        Arc::clone(
            &self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .subscriptions,
        )
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.snapshot().error
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_loaded
    }

    /// 一覧を読み込む
    pub async fn load(&self) {
        self.run_intent(LedgerIntent::Load, async { Ok::<(), AppError>(()) })
            .await;
    }

    /// サブスクリプションを追加し、一覧を再取得する
    pub async fn add(&self, new_subscription: NewSubscription) {
        let repository = Arc::clone(&self.repository);
        self.run_intent(LedgerIntent::Add, async move {
            let created = repository.create(new_subscription).await?;
            log::info!("サブスクリプションを追加しました: id={}", created.id);
            Ok::<(), AppError>(())
        })
        .await;
    }

    /// サブスクリプションを部分更新し、一覧を再取得する
    pub async fn update(&self, id: i64, patch: SubscriptionPatch) {
        let repository = Arc::clone(&self.repository);
        self.run_intent(LedgerIntent::Update, async move {
            repository.update(id, patch).await?;
            log::info!("サブスクリプションを更新しました: id={id}");
            Ok::<(), AppError>(())
        })
        .await;
    }

    /// サブスクリプションを削除し、一覧を再取得する
    pub async fn remove(&self, id: i64) {
        let repository = Arc::clone(&self.repository);
        self.run_intent(LedgerIntent::Remove, async move {
            repository.delete(id).await?;
            log::info!("サブスクリプションを削除しました: id={id}");
            Ok::<(), AppError>(())
        })
        .await;
    }

    /// 現在の一覧から月額合計を計算する（永続化層には問い合わせない）
    pub fn monthly_total(&self) -> f64 {
        aggregates::monthly_total(&self.subscriptions())
    }

    /// 現在の一覧から統計情報を計算する
    pub fn summary(&self) -> LedgerSummary {
        aggregates::summarize(&self.subscriptions())
    }

    /// カテゴリ別の月額合計を永続化層から取得する
    ///
    /// 失敗した場合はログに記録して空の一覧を返す。ストアの状態は変更しない
    pub async fn category_totals(&self) -> Vec<CategoryTotal> {
        match self.repository.category_totals().await {
            Ok(totals) => totals,
            Err(e) => {
                log::error!("カテゴリ別合計の取得に失敗しました: {}", e.details());
                Vec::new()
            }
        }
    }

    /// 操作を一つ実行する
    ///
    /// 1. 他の操作が終わるまで待つ
    /// 2. Loading状態にする
    /// 3. 変更を実行し、成功したら一覧を再取得する
    /// 4. 結果に応じて一覧またはエラーを反映する
    async fn run_intent<F>(&self, intent: LedgerIntent, mutation: F)
    where
        F: Future<Output = AppResult<()>>,
    {
        let _gate = self.intent_gate.lock().await;
        self.begin(intent);

        let result = match mutation.await {
            Ok(()) => self.repository.list_all().await,
            Err(e) => Err(e),
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.is_loading = false;
        match result {
            Ok(subscriptions) => {
                log::debug!("{intent:?}: {}件のサブスクリプションを反映しました", subscriptions.len());
                state.subscriptions = Arc::from(subscriptions);
                state.is_loaded = true;
                state.error = None;
            }
            Err(e) => {
                log::error!("{}: {}", intent.failure_message(), e.details());
                state.error = Some(format!("{}（{}）", intent.failure_message(), e.user_message()));
            }
        }
    }

    fn begin(&self, intent: LedgerIntent) {
        log::debug!("{intent:?} を開始します");
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.is_loading = true;
        state.error = None;
    }
}
