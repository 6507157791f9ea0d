/// 恒久的な失敗の記録
///
/// 再試行しても成功しないレコードをエラーテーブルに書き込み、後から調査できるようにする。
/// 記録自体の失敗は元の失敗の扱いを変えない（呼び出し側でログに残すのみ）。
use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::Serialize;
use tracing::debug;

use super::sdk_error::{DownstreamError, classify};
use crate::domain::{FailureClass, TriggerKind};

/// エラーテーブルに保存するペイロードの上限（文字数）
const MAX_PAYLOAD_CHARS: usize = 16 * 1024;

/// エラーテーブルの1行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    /// 主キー
    pub error_id: String,
    pub trigger: String,
    /// メッセージID・シーケンス番号など
    pub item_identifier: String,
    pub error_code: String,
    pub error_message: String,
    pub class: FailureClass,
    /// 元のメッセージ本文（上限で切り詰める）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub recorded_at: String,
}

impl FailureEntry {
    pub fn new(
        trigger: TriggerKind,
        item_identifier: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        class: FailureClass,
        payload: Option<&str>,
    ) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            trigger: trigger.as_str().to_string(),
            item_identifier: item_identifier.into(),
            error_code: error_code.into(),
            error_message: error_message.into(),
            class,
            payload: payload.map(|p| p.chars().take(MAX_PAYLOAD_CHARS).collect()),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 失敗記録トレイト（テスト用の抽象化）
#[async_trait]
pub trait FailureRecorder: Send + Sync {
    async fn record(&self, entry: &FailureEntry) -> Result<(), DownstreamError>;
}

/// DynamoDBのエラーテーブルへ記録する実装
pub struct DynamoFailureRecorder {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoFailureRecorder {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl FailureRecorder for DynamoFailureRecorder {
    async fn record(&self, entry: &FailureEntry) -> Result<(), DownstreamError> {
        let item = serde_dynamo::to_item(entry)
            .map_err(|e| DownstreamError::permanent("SerializationError", e.to_string()))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(classify)?;

        debug!(
            table = %self.table_name,
            item_identifier = %entry.item_identifier,
            error_code = %entry.error_code,
            "エラーテーブルに記録"
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// 記録内容を保持するモック
    #[derive(Default)]
    pub struct MockFailureRecorder {
        entries: Mutex<Vec<FailureEntry>>,
        fail: bool,
    }

    impl MockFailureRecorder {
        pub fn new() -> Self {
            Self::default()
        }

        /// 記録が常に失敗するモック
        pub fn broken() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn entries(&self) -> Vec<FailureEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FailureRecorder for MockFailureRecorder {
        async fn record(&self, entry: &FailureEntry) -> Result<(), DownstreamError> {
            if self.fail {
                return Err(DownstreamError::transient("ServiceUnavailable", "error table down"));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }
}
