//! メモリ上のサブスクリプション一覧に対する集計
//!
//! 永続化層のSQL集計とは独立した経路だが、月額換算の規則は
//! `BillingFrequency::monthly_equivalent` を共有する

use super::models::{BillingFrequency, Subscription, MONTHS_PER_YEAR};
use serde::{Deserialize, Serialize};

/// ダッシュボード・統計表示用の集計結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// サブスクリプション件数
    pub subscription_count: usize,
    /// 月額合計
    pub monthly_total: f64,
    /// 年額合計（月額合計の12倍）
    pub annual_total: f64,
    /// 1件あたりの平均月額（0件の場合は0）
    pub average_monthly: f64,
    /// 月払いの件数
    pub monthly_count: usize,
    /// 年払いの件数
    pub annual_count: usize,
}

/// 月額合計を計算する
///
/// # 引数
/// * `subscriptions` - 集計対象
///
/// # 戻り値
/// 月額換算した金額の合計（空の場合は0）
///
/// 永続化層の `SUM()` と同じ結果になるよう、ID昇順に補正付きで加算する
pub fn monthly_total(subscriptions: &[Subscription]) -> f64 {
    let mut amounts: Vec<(i64, f64)> = subscriptions
        .iter()
        .map(|s| (s.id, s.monthly_amount()))
        .collect();
    amounts.sort_unstable_by_key(|(id, _)| *id);

    compensated_sum(amounts.into_iter().map(|(_, amount)| amount))
}

/// Kahan-Babuska-Neumaier法による浮動小数点数の合計
///
/// SQLite の `SUM()` / `TOTAL()` と同じ手順で誤差を補正する。
/// 補正項が有限でない場合は補正せずに返す
pub fn compensated_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;

    for value in values {
        let t = sum + value;
        if sum.abs() > value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }

    if compensation.is_finite() {
        sum + compensation
    } else {
        sum
    }
}

/// 件数・合計・平均・支払いサイクル別件数をまとめて計算する
pub fn summarize(subscriptions: &[Subscription]) -> LedgerSummary {
    let subscription_count = subscriptions.len();
    let monthly_total = monthly_total(subscriptions);
    let annual_count = subscriptions
        .iter()
        .filter(|s| s.frequency == BillingFrequency::Annual)
        .count();

    let average_monthly = if subscription_count > 0 {
        monthly_total / subscription_count as f64
    } else {
        0.0
    };

    LedgerSummary {
        subscription_count,
        monthly_total,
        annual_total: monthly_total * MONTHS_PER_YEAR,
        average_monthly,
        monthly_count: subscription_count - annual_count,
        annual_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use quickcheck_macros::quickcheck;

    fn subscription(id: i64, amount: f64, frequency: BillingFrequency) -> Subscription {
        let now = Utc::now();
        Subscription {
            id,
            name: format!("sub-{id}"),
            amount,
            currency: "ARS".to_string(),
            frequency,
            next_payment_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            payment_method: None,
            category: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_monthly_total_empty() {
        assert_eq!(monthly_total(&[]), 0.0);
    }

    #[test]
    fn test_monthly_total_mixed_frequencies() {
        let subscriptions = vec![
            subscription(1, 1000.0, BillingFrequency::Monthly),
            subscription(2, 12000.0, BillingFrequency::Annual),
        ];
        assert_eq!(monthly_total(&subscriptions), 2000.0);
    }

    #[test]
    fn test_monthly_total_fractional_amounts() {
        // 単純な加算では 0.9999999999999999 になる
        let subscriptions: Vec<Subscription> = (1..=10)
            .map(|id| subscription(id, 0.1, BillingFrequency::Monthly))
            .collect();
        assert_eq!(monthly_total(&subscriptions), 1.0);
    }

    #[test]
    fn test_monthly_total_ignores_projection_order() {
        let mut subscriptions: Vec<Subscription> = [0.1, 1e16, 0.3, -1e16, 12.7]
            .iter()
            .enumerate()
            .map(|(i, amount)| subscription(i as i64 + 1, *amount, BillingFrequency::Monthly))
            .collect();
        let ascending = monthly_total(&subscriptions);

        subscriptions.reverse();
        assert_eq!(monthly_total(&subscriptions), ascending);
    }

    #[test]
    fn test_compensated_sum() {
        assert_eq!(compensated_sum(Vec::<f64>::new()), 0.0);
        assert_eq!(compensated_sum(vec![1.0, 1e100, 1.0, -1e100]), 2.0);
        assert_eq!(compensated_sum(vec![0.1; 10]), 1.0);
    }

    #[test]
    fn test_summarize() {
        let subscriptions = vec![
            subscription(1, 1000.0, BillingFrequency::Monthly),
            subscription(2, 12000.0, BillingFrequency::Annual),
            subscription(3, 500.0, BillingFrequency::Monthly),
            subscription(4, 2400.0, BillingFrequency::Annual),
        ];

        let summary = summarize(&subscriptions);
        assert_eq!(summary.subscription_count, 4);
        assert_eq!(summary.monthly_total, 2700.0);
        assert_eq!(summary.annual_total, 32400.0);
        assert_eq!(summary.average_monthly, 675.0);
        assert_eq!(summary.monthly_count, 2);
        assert_eq!(summary.annual_count, 2);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.subscription_count, 0);
        assert_eq!(summary.monthly_total, 0.0);
        assert_eq!(summary.average_monthly, 0.0);
    }

    #[quickcheck]
    fn prop_annual_contributes_one_twelfth(cents: u32) -> bool {
        let amount = f64::from(cents) / 100.0;
        let annual = monthly_total(&[subscription(1, amount, BillingFrequency::Annual)]);
        let monthly = monthly_total(&[subscription(1, amount, BillingFrequency::Monthly)]);
        annual == amount / 12.0 && monthly == amount
    }

    #[quickcheck]
    fn prop_total_equals_sum_of_monthly_amounts(amounts: Vec<(u16, bool)>) -> bool {
        let subscriptions: Vec<Subscription> = amounts
            .iter()
            .enumerate()
            .map(|(i, (amount, annual))| {
                let frequency = if *annual {
                    BillingFrequency::Annual
                } else {
                    BillingFrequency::Monthly
                };
                subscription(i as i64, f64::from(*amount), frequency)
            })
            .collect();

        let expected = compensated_sum(
            subscriptions
                .iter()
                .map(|s| s.frequency.monthly_equivalent(s.amount)),
        );
        monthly_total(&subscriptions) == expected
    }

    #[quickcheck]
    fn prop_summary_counts_partition(flags: Vec<bool>) -> bool {
        let subscriptions: Vec<Subscription> = flags
            .iter()
            .enumerate()
            .map(|(i, annual)| {
                let frequency = if *annual {
                    BillingFrequency::Annual
                } else {
                    BillingFrequency::Monthly
                };
                subscription(i as i64, 100.0, frequency)
            })
            .collect();

        let summary = summarize(&subscriptions);
        summary.monthly_count + summary.annual_count == summary.subscription_count
    }
}
