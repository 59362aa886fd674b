use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// ストレージが初期化される前にアクセスされた
    #[error("ストレージが初期化されていません")]
    NotInitialized,

    /// ストレージのオープンまたはI/Oに失敗した
    #[error("ストレージエラー: {0}")]
    StorageUnavailable(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 高重要度（ストレージエラーなど）
    High,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::NotInitialized => "データベースが初期化されていません",
            AppError::StorageUnavailable(_) => "データベース操作でエラーが発生しました",
            AppError::Validation(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Configuration(_) => "設定エラーが発生しました",
        }
    }

    /// エラーの詳細情報を取得
    ///
    /// # 戻り値
    /// エラーの詳細情報（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    ///
    /// # 戻り値
    /// エラーの重要度レベル
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::NotInitialized => ErrorSeverity::High,
            AppError::StorageUnavailable(_) => ErrorSeverity::High,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::Configuration(_) => ErrorSeverity::High,
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// ストレージエラーを作成するヘルパー関数
    pub fn storage<S: Into<String>>(message: S) -> Self {
        AppError::StorageUnavailable(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }
}

/// rusqlite::ErrorからAppErrorへの変換
///
/// 行が見つからない場合はNotFound、CHECK制約・NOT NULL制約の違反は
/// 入力値の問題としてValidation、それ以外はStorageUnavailableとして扱う
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::QueryReturnedNoRows => AppError::not_found("レコード"),
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL =>
            {
                AppError::Validation(format!("制約違反: {error}"))
            }
            _ => AppError::StorageUnavailable(error.to_string()),
        }
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        // 各エラータイプの重要度をテスト
        assert_eq!(
            AppError::validation("テスト").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AppError::not_found("サブスクリプション").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(AppError::NotInitialized.severity(), ErrorSeverity::High);
        assert_eq!(
            AppError::storage("ディスクフル").severity(),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_user_message() {
        let validation_error = AppError::validation("サービス名を入力してください");
        assert_eq!(
            validation_error.user_message(),
            "サービス名を入力してください"
        );

        let not_found_error = AppError::not_found("サブスクリプション");
        assert_eq!(
            not_found_error.user_message(),
            "サブスクリプションが見つかりません"
        );

        // ストレージエラーの詳細はユーザーに表示しない
        let storage_error = AppError::storage("disk I/O error");
        assert_eq!(
            storage_error.user_message(),
            "データベース操作でエラーが発生しました"
        );
        assert!(storage_error.details().contains("disk I/O error"));
    }

    #[test]
    fn test_rusqlite_error_conversion() {
        let error: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(error, AppError::NotFound(_)));

        let error: AppError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(error, AppError::StorageUnavailable(_)));
    }

    #[test]
    fn test_check_constraint_maps_to_validation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE t (v TEXT CHECK(v IN ('a', 'b')))",
            [],
        )
        .unwrap();

        let error: AppError = conn
            .execute("INSERT INTO t (v) VALUES ('z')", [])
            .unwrap_err()
            .into();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn test_not_null_constraint_maps_to_validation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (v REAL NOT NULL)", []).unwrap();

        // SQLiteはNaNをNULLとして格納する
        let error: AppError = conn
            .execute("INSERT INTO t (v) VALUES (?1)", rusqlite::params![f64::NAN])
            .unwrap_err()
            .into();
        assert!(matches!(error, AppError::Validation(_)));
        assert_eq!(error.severity(), ErrorSeverity::Low);
    }
}
