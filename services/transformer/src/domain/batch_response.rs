/// バッチトリガー（SQS / Kinesis / DynamoDB Streams）向けの部分失敗レスポンス
///
/// Lambdaのイベントソースマッピングに`ReportBatchItemFailures`を設定した場合の
/// 応答形式。失敗リストが空なら全件成功として扱われる。
use serde::{Deserialize, Serialize};

/// 失敗したレコード1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    /// SQSではメッセージID、Kinesis/DynamoDB Streamsではシーケンス番号
    pub item_identifier: String,
}

/// `{ "batchItemFailures": [{ "itemIdentifier": ... }] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    /// 全件成功のレスポンスを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 失敗したレコードを追加
    pub fn add_failure(&mut self, item_identifier: impl Into<String>) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: item_identifier.into(),
        });
    }

    /// 失敗件数
    pub fn failure_count(&self) -> usize {
        self.batch_item_failures.len()
    }

    /// 全件成功したかどうか
    pub fn is_success(&self) -> bool {
        self.batch_item_failures.is_empty()
    }

    /// 失敗したレコードの識別子一覧
    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_response_serializes_empty_list() {
        let response = BatchResponse::new();
        assert!(response.is_success());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "batchItemFailures": [] })
        );
    }

    #[test]
    fn test_failures_use_item_identifier_field() {
        let mut response = BatchResponse::new();
        response.add_failure("059f36b4-87a3-44ab-83d2-661975830a7d");

        assert_eq!(response.failure_count(), 1);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "batchItemFailures": [
                    { "itemIdentifier": "059f36b4-87a3-44ab-83d2-661975830a7d" }
                ]
            })
        );
    }

    #[test]
    fn test_failed_identifiers_preserve_order() {
        let mut response = BatchResponse::new();
        response.add_failure("b");
        response.add_failure("a");
        assert_eq!(response.failed_identifiers(), vec!["b", "a"]);
    }
}
