//! サブスクリプション台帳と集計エンジン
//!
//! 定期支払い（サブスクリプション）を記録・永続化し、月額換算の合計や
//! カテゴリ別の内訳を計算する

pub mod app;
pub mod features;
pub mod shared;

pub use app::SubscriptionLedger;
pub use features::subscriptions::{
    BillingFrequency, CategoryTotal, LedgerSnapshot, LedgerStore, LedgerSummary,
    NewSubscription, SqliteSubscriptionRepository, Subscription, SubscriptionPatch,
    SubscriptionRepository, UNCATEGORIZED_LABEL,
};
pub use shared::database::StorageLocation;
pub use shared::errors::{AppError, AppResult, ErrorSeverity};
