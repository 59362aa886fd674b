/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - サブスクリプションの作成、読み取り、更新、削除
/// - 月額換算による合計・カテゴリ別集計
/// - 表示層向けのメモリ上の一覧（LedgerStore）
pub mod aggregates;
pub mod models;
pub mod persistence;
pub mod repository;
pub mod store;

// 公開インターフェース
pub use aggregates::{compensated_sum, summarize, LedgerSummary};

pub use models::{
    BillingFrequency, CategoryTotal, NewSubscription, Subscription, SubscriptionPatch,
    DEFAULT_CURRENCY, UNCATEGORIZED_LABEL,
};

pub use persistence::{SqliteSubscriptionRepository, SubscriptionRepository};

pub use store::{LedgerIntent, LedgerSnapshot, LedgerStore};
