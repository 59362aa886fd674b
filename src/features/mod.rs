/// サブスクリプション管理機能
pub mod subscriptions;
