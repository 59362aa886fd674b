use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::PathBuf;

/// データベースの保存先
#[derive(Debug, Clone, PartialEq)]
pub enum StorageLocation {
    /// ファイルに保存する
    File(PathBuf),
    /// メモリ上に保持する（テスト・一時利用向け）
    InMemory,
}

/// データベース接続を開き、テーブルを作成する
///
/// # 引数
/// * `location` - データベースの保存先
///
/// # 戻り値
/// データベース接続、または失敗時はStorageUnavailableエラー
///
/// # 処理内容
/// 1. データベース接続の開設
/// 2. テーブル作成とマイグレーションの実行
pub fn open_database(location: &StorageLocation) -> AppResult<Connection> {
    let conn = match location {
        StorageLocation::File(path) => Connection::open(path),
        StorageLocation::InMemory => Connection::open_in_memory(),
    }
    .map_err(|e| AppError::storage(format!("データベースのオープンに失敗しました: {e}")))?;

    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {location:?}");

    Ok(conn)
}

/// データベーステーブルを作成する
///
/// 何度呼び出しても同じ結果になる（冪等）
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はStorageUnavailableエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    let table_exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='subscriptions'",
            [],
            |row| row.get(0),
        )
        .map_err(schema_error)?;

    if table_exists == 0 {
        create_subscriptions_table(conn)?;
        log::info!("subscriptionsテーブルを作成しました");
    } else {
        log::debug!("既存のデータベースを確認中...");
        migrate_existing_tables(conn)?;
    }

    create_indexes(conn)?;

    Ok(())
}

/// サブスクリプションテーブルを作成する
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT DEFAULT 'ARS',
            frequency TEXT CHECK(frequency IN ('monthly', 'annual')) DEFAULT 'monthly',
            next_payment_date TEXT NOT NULL,
            payment_method TEXT,
            category TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        )",
        [],
    )
    .map_err(schema_error)?;

    Ok(())
}

/// 既存テーブルのマイグレーションを実行する
///
/// 古いスキーマで欠けている任意カラムを追加する
fn migrate_existing_tables(conn: &Connection) -> AppResult<()> {
    let optional_columns = [
        ("currency", "TEXT DEFAULT 'ARS'"),
        ("payment_method", "TEXT"),
        ("category", "TEXT"),
    ];

    for (column, definition) in optional_columns {
        if !check_column_exists(conn, "subscriptions", column) {
            log::info!("{column}カラムを追加します...");
            conn.execute(
                &format!("ALTER TABLE subscriptions ADD COLUMN {column} {definition}"),
                [],
            )
            .map_err(schema_error)?;
        }
    }

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_created_at ON subscriptions(created_at)",
        [],
    )
    .map_err(schema_error)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_category ON subscriptions(category)",
        [],
    )
    .map_err(schema_error)?;

    Ok(())
}

/// テーブルに指定されたカラムが存在するかチェックする
///
/// # 戻り値
/// カラムが存在する場合はtrue、存在しないかエラーの場合はfalse
fn check_column_exists(conn: &Connection, table_name: &str, column_name: &str) -> bool {
    let query = format!("PRAGMA table_info({table_name})");

    let Ok(mut stmt) = conn.prepare(&query) else {
        return false;
    };

    let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) else {
        return false;
    };

    let exists = rows.flatten().any(|name| name == column_name);
    exists
}

/// スキーマ操作の失敗はすべてStorageUnavailableとして扱う
fn schema_error(error: rusqlite::Error) -> AppError {
    AppError::storage(format!("スキーマの作成に失敗しました: {error}"))
}
