use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// 通貨が指定されなかった場合の既定値
pub const DEFAULT_CURRENCY: &str = "ARS";

/// カテゴリ未設定のサブスクリプションを集計する際のラベル
pub const UNCATEGORIZED_LABEL: &str = "uncategorized";

/// 1年あたりの月数
pub const MONTHS_PER_YEAR: f64 = 12.0;

/// 月額換算のSQL式
///
/// `BillingFrequency::monthly_equivalent` と同じ規則をSQL上で表現したもの。
/// 片方を変更する場合は必ずもう片方も変更すること
pub const MONTHLY_EQUIVALENT_SQL: &str =
    "CASE WHEN frequency = 'annual' THEN amount / 12.0 ELSE amount END";

/// 支払いサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingFrequency {
    /// 毎月払い
    #[default]
    Monthly,
    /// 年払い
    Annual,
}

impl BillingFrequency {
    /// 保存時の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::Monthly => "monthly",
            BillingFrequency::Annual => "annual",
        }
    }

    /// 金額を月額換算する
    ///
    /// 年払いは12で割り、月払いはそのまま返す。
    /// すべての月額集計（合計・カテゴリ別・平均）はこの規則に従う
    pub fn monthly_equivalent(&self, amount: f64) -> f64 {
        match self {
            BillingFrequency::Monthly => amount,
            BillingFrequency::Annual => amount / MONTHS_PER_YEAR,
        }
    }
}

impl fmt::Display for BillingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingFrequency {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "monthly" => Ok(BillingFrequency::Monthly),
            "annual" => Ok(BillingFrequency::Annual),
            other => Err(AppError::validation(format!(
                "支払いサイクルは'monthly'または'annual'である必要があります: {other}"
            ))),
        }
    }
}

impl ToSql for BillingFrequency {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BillingFrequency {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: AppError| FromSqlError::Other(Box::new(e)))
    }
}

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub name: String,
    pub amount: f64,
    pub currency: String,
    pub frequency: BillingFrequency,
    pub next_payment_date: NaiveDate,
    pub payment_method: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// 月額換算した金額
    pub fn monthly_amount(&self) -> f64 {
        self.frequency.monthly_equivalent(self.amount)
    }

    /// 集計用のカテゴリラベル（未設定の場合は UNCATEGORIZED_LABEL）
    pub fn category_label(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED_LABEL)
    }
}

/// サブスクリプション作成用DTO
///
/// id・created_at・updated_at は永続化層が設定する
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewSubscription {
    pub name: String,
    pub amount: f64,
    /// 未指定の場合は DEFAULT_CURRENCY
    #[serde(default)]
    pub currency: Option<String>,
    /// 未指定の場合は毎月払い
    #[serde(default)]
    pub frequency: Option<BillingFrequency>,
    pub next_payment_date: NaiveDate,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewSubscription {
    /// 必須項目のみで作成用DTOを組み立てる
    pub fn new<S: Into<String>>(name: S, amount: f64, next_payment_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            amount,
            currency: None,
            frequency: None,
            next_payment_date,
            payment_method: None,
            category: None,
        }
    }

    /// JSONペイロードから作成用DTOを読み込む
    ///
    /// 不正な支払いサイクルや日付形式はバリデーションエラーになる
    pub fn from_json(payload: &str) -> AppResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| AppError::validation(format!("入力データが不正です: {e}")))
    }
}

/// サブスクリプション更新用DTO
///
/// 指定されたフィールドのみ更新する。payment_method と category は
/// キーが無ければ変更なし、`null` が指定されれば値を削除する
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<BillingFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_payment_date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_method: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Option<String>>,
}

impl SubscriptionPatch {
    /// 更新対象のフィールドが一つも指定されていないか
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.amount.is_none()
            && self.currency.is_none()
            && self.frequency.is_none()
            && self.next_payment_date.is_none()
            && self.payment_method.is_none()
            && self.category.is_none()
    }

    /// JSONペイロードから更新用DTOを読み込む
    ///
    /// id や created_at などの更新できないキーは無視される
    pub fn from_json(payload: &str) -> AppResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| AppError::validation(format!("入力データが不正です: {e}")))
    }
}

/// キーが存在すれば値が null でも Some にする
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// カテゴリ別の月額合計
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}
