use super::models::{
    CategoryTotal, NewSubscription, Subscription, SubscriptionPatch, DEFAULT_CURRENCY,
    MONTHLY_EQUIVALENT_SQL, UNCATEGORIZED_LABEL,
};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};

const SELECT_COLUMNS: &str = "SELECT id, name, amount, currency, frequency, next_payment_date, payment_method, category, created_at, updated_at
     FROM subscriptions";

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
///
/// # エラー
/// * `AppError::Validation` - サービス名が空の場合
/// * `AppError::StorageUnavailable` - 書き込みに失敗した場合
pub fn create(conn: &Connection, dto: NewSubscription) -> AppResult<Subscription> {
    let name = validate_name(&dto.name)?;
    let currency = dto
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
        .to_string();
    let frequency = dto.frequency.unwrap_or_default();
    let now = current_timestamp();

    conn.execute(
        "INSERT INTO subscriptions (name, amount, currency, frequency, next_payment_date, payment_method, category, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            name,
            dto.amount,
            currency,
            frequency,
            dto.next_payment_date,
            normalize_tag(dto.payment_method),
            normalize_tag(dto.category),
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    log::debug!("サブスクリプションを作成しました: id={id}, frequency={frequency}");

    find_by_id(conn, id)
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または存在しない場合はNotFoundエラー
pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Subscription> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id],
        map_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("ID {id} のサブスクリプションが見つかりません"))
        }
        _ => AppError::from(e),
    })
}

/// サブスクリプション一覧を取得する
///
/// 作成日時の新しい順（同時刻の場合はIDの大きい順）で返す
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// サブスクリプションのリスト（存在しない場合は空）
pub fn find_all(conn: &Connection) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"
    ))?;
    let subscriptions = stmt.query_map([], map_row)?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)
}

/// サブスクリプションを更新する
///
/// 指定されたフィールドのみ更新し、id と created_at は変更しない。
/// 更新があった場合は updated_at を必ず前回値より後の時刻にする
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `patch` - サブスクリプション更新用DTO
///
/// 更新項目が一つもない場合はIDの存在も確認せずに成功する
///
/// # エラー
/// * `AppError::NotFound` - 指定IDが存在しない場合
/// * `AppError::Validation` - サービス名が空文字列で指定された場合
pub fn update(conn: &Connection, id: i64, patch: SubscriptionPatch) -> AppResult<()> {
    if patch.is_empty() {
        log::debug!("更新項目がないためスキップします: id={id}");
        return Ok(());
    }

    let existing = find_by_id(conn, id)?;

    // 更新するフィールドを決定
    let name = match patch.name {
        Some(ref name) => validate_name(name)?,
        None => existing.name,
    };
    let amount = patch.amount.unwrap_or(existing.amount);
    let currency = patch
        .currency
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or(existing.currency);
    let frequency = patch.frequency.unwrap_or(existing.frequency);
    let next_payment_date = patch.next_payment_date.unwrap_or(existing.next_payment_date);
    let payment_method = match patch.payment_method {
        Some(value) => normalize_tag(value),
        None => existing.payment_method,
    };
    let category = match patch.category {
        Some(value) => normalize_tag(value),
        None => existing.category,
    };
    let updated_at = next_timestamp(existing.updated_at);

    conn.execute(
        "UPDATE subscriptions
         SET name = ?1, amount = ?2, currency = ?3, frequency = ?4, next_payment_date = ?5,
             payment_method = ?6, category = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            name,
            amount,
            currency,
            frequency,
            next_payment_date,
            payment_method,
            category,
            updated_at,
            id
        ],
    )?;

    Ok(())
}

/// サブスクリプションを削除する
///
/// 存在しないIDを指定してもエラーにしない（再試行しやすくするため）
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
pub fn delete(conn: &Connection, id: i64) -> AppResult<()> {
    let rows_affected = conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;

    if rows_affected == 0 {
        log::debug!("削除対象が存在しませんでした: id={id}");
    }

    Ok(())
}

/// カテゴリ別の月額合計を計算する
///
/// カテゴリ未設定のレコードは UNCATEGORIZED_LABEL にまとめる。
/// 合計の降順（同額の場合はカテゴリ名の昇順）で返す
pub fn category_totals(conn: &Connection) -> AppResult<Vec<CategoryTotal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT COALESCE(category, ?1) AS label, SUM({MONTHLY_EQUIVALENT_SQL}) AS total
         FROM subscriptions
         GROUP BY label
         ORDER BY total DESC, label ASC"
    ))?;

    let totals = stmt.query_map(params![UNCATEGORIZED_LABEL], |row| {
        Ok(CategoryTotal {
            category: row.get(0)?,
            total: row.get(1)?,
        })
    })?;

    totals
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::from)
}

/// 全サブスクリプションの月額合計を計算する
///
/// 加算順序はID昇順に固定する
///
/// # 戻り値
/// 月額合計金額（レコードがない場合は0）
pub fn monthly_total(conn: &Connection) -> AppResult<f64> {
    let total = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(monthly), 0.0)
             FROM (SELECT {MONTHLY_EQUIVALENT_SQL} AS monthly FROM subscriptions ORDER BY id)"
        ),
        [],
        |row| row.get(0),
    )?;

    Ok(total)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        name: row.get(1)?,
        amount: row.get(2)?,
        currency: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        frequency: row.get(4)?,
        next_payment_date: row.get(5)?,
        payment_method: row.get(6)?,
        category: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// サービス名を検証し、前後の空白を除いた値を返す
fn validate_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }
    Ok(trimmed.to_string())
}

/// 空白のみのタグは未設定として扱う
fn normalize_tag(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 現在時刻（マイクロ秒精度）
fn current_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos() % 1_000))
}

/// 前回の更新日時より必ず後になる現在時刻
///
/// 時計が進んでいない場合は前回値に1マイクロ秒加える
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = current_timestamp();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}
