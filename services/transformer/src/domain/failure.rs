/// 失敗の分類
///
/// すべてのエラー型はこの分類に写像される。再試行するかどうかは
/// 呼び出し側（バッチ失敗リスト、HTTPステータス、非同期呼び出しのエラー返却）が
/// この分類だけを見て決定する。
use serde::Serialize;

/// 失敗の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// 一時的な失敗（スロットリング、タイムアウト等）。トリガー側の再配信で回復しうる
    Transient,
    /// 恒久的な失敗（入力不正、権限不足、リソース不在等）。再試行しても結果は変わらない
    Permanent,
}

impl FailureClass {
    /// 再試行で回復しうるかどうか
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureClass::Transient)
    }

    /// ログ・エラーテーブル用の文字列表現
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
