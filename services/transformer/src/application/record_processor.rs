/// メッセージ1件の処理（変換・検証 → 下流呼び出し → 集計）
///
/// すべてのトリガーハンドラーが共有する。トリガー固有の応答形式への変換は
/// 各ハンドラーが失敗分類（`FailureClass`）を見て行う。
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    FailureClass, InboundMessage, MessageDecodeError, TransformContext, TransformError,
    TransformRules, TriggerKind,
};
use crate::infrastructure::{
    AggregateCounter, Delivery, Destination, DownstreamError, FailureEntry, FailureRecorder,
};

/// メッセージ処理のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Decode(#[from] MessageDecodeError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl ProcessError {
    pub fn class(&self) -> FailureClass {
        match self {
            ProcessError::Decode(e) => e.class(),
            ProcessError::Transform(e) => e.class(),
            ProcessError::Downstream(e) => e.class(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ProcessError::Decode(e) => e.code(),
            ProcessError::Transform(e) => e.code(),
            ProcessError::Downstream(e) => e.code(),
        }
    }

    /// 既に書き込み済みのレコード（再配信）かどうか
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ProcessError::Downstream(DownstreamError::AlreadyExists(_)))
    }

    /// 入力側の問題（デコード・検証）かどうか
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProcessError::Decode(_) | ProcessError::Transform(_))
    }
}

/// 受信時刻（RFC 3339）
pub fn received_at_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub struct RecordProcessor {
    rules: TransformRules,
    destination: Arc<dyn Destination>,
    failure_recorder: Option<Arc<dyn FailureRecorder>>,
    aggregate_counter: Option<Arc<dyn AggregateCounter>>,
}

impl RecordProcessor {
    pub fn new(rules: TransformRules, destination: Arc<dyn Destination>) -> Self {
        Self {
            rules,
            destination,
            failure_recorder: None,
            aggregate_counter: None,
        }
    }

    pub fn with_failure_recorder(mut self, recorder: Arc<dyn FailureRecorder>) -> Self {
        self.failure_recorder = Some(recorder);
        self
    }

    pub fn with_aggregate_counter(mut self, counter: Arc<dyn AggregateCounter>) -> Self {
        self.aggregate_counter = Some(counter);
        self
    }

    /// デコード済みメッセージを変換して送信する
    ///
    /// 集計は新規送信時のみ行い、集計の失敗は送信結果に影響させない。
    pub async fn process(
        &self,
        message: &InboundMessage,
        context: &TransformContext,
    ) -> Result<Delivery, ProcessError> {
        let record = self.rules.apply(message, context)?;
        let delivery = self.destination.deliver(&record).await?;

        debug!(
            record_id = %record.id,
            destination = %delivery.target,
            "レコードを送信"
        );

        if let Some(counter) = &self.aggregate_counter {
            if let Err(e) = counter.increment(&record).await {
                warn!(record_id = %record.id, error = %e, "集計の更新に失敗");
            }
        }

        Ok(delivery)
    }

    /// デコード結果を受け取って処理する
    pub async fn process_decoded(
        &self,
        decoded: Result<InboundMessage, MessageDecodeError>,
        context: &TransformContext,
    ) -> Result<Delivery, ProcessError> {
        let message = decoded?;
        self.process(&message, context).await
    }

    /// 恒久的な失敗をエラーテーブルに記録する
    ///
    /// # 戻り値
    /// 記録できた場合は`true`。記録先が未設定、または記録に失敗した場合は`false`
    pub async fn record_failure(
        &self,
        trigger: TriggerKind,
        item_identifier: &str,
        error: &ProcessError,
        payload: Option<&str>,
    ) -> bool {
        let Some(recorder) = &self.failure_recorder else {
            return false;
        };

        let entry = FailureEntry::new(
            trigger,
            item_identifier,
            error.code(),
            error.to_string(),
            error.class(),
            payload,
        );

        match recorder.record(&entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    item_identifier = %item_identifier,
                    error = %e,
                    "エラーテーブルへの記録に失敗"
                );
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::domain::DecodeMode;
    use crate::infrastructure::destination::mock::MockDestination;
    use serde_json::json;

    fn context(id: &str) -> TransformContext {
        TransformContext::new(id, TriggerKind::Sqs, "2024-01-01T00:00:00+00:00")
    }

    fn message(value: serde_json::Value) -> InboundMessage {
        InboundMessage::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_process_delivers_and_counts() {
        let harness = Harness::new(MockDestination::new());

        let delivery = harness
            .processor
            .process(&message(json!({ "type": "order", "amount": 5 })), &context("m-1"))
            .await
            .unwrap();

        assert_eq!(delivery.record_id, "m-1");
        assert_eq!(delivery.target, "mock-table");
        assert_eq!(harness.destination.delivered_ids(), vec!["m-1"]);
        assert_eq!(harness.counter.count("order"), 1);
    }

    #[tokio::test]
    async fn test_invalid_message_never_reaches_destination() {
        let harness = Harness::new(MockDestination::new());

        let result = harness
            .processor
            .process(&message(json!({ "amount": -1 })), &context("m-1"))
            .await;

        assert!(matches!(result, Err(ProcessError::Transform(_))));
        assert_eq!(harness.destination.call_count(), 0);
    }

    #[tokio::test]
    async fn test_decode_error_is_permanent_client_error() {
        let harness = Harness::new(MockDestination::new());

        let error = harness
            .processor
            .process_decoded(
                InboundMessage::decode("{broken", DecodeMode::JsonOrText),
                &context("m-1"),
            )
            .await
            .unwrap_err();

        assert_eq!(error.class(), FailureClass::Permanent);
        assert!(error.is_client_error());
        assert_eq!(harness.destination.call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_is_not_counted() {
        let harness = Harness::new(MockDestination::new().with_existing("m-1"));

        let error = harness
            .processor
            .process(&message(json!({})), &context("m-1"))
            .await
            .unwrap_err();

        assert!(error.is_duplicate());
        assert_eq!(harness.counter.total(), 0);
    }

    #[tokio::test]
    async fn test_downstream_failure_keeps_class() {
        let harness = Harness::new(
            MockDestination::new()
                .failing("m-1", DownstreamError::transient("ThrottlingException", "slow down")),
        );

        let error = harness
            .processor
            .process(&message(json!({})), &context("m-1"))
            .await
            .unwrap_err();

        assert_eq!(error.class(), FailureClass::Transient);
        assert_eq!(error.code(), "ThrottlingException");
    }

    #[tokio::test]
    async fn test_record_failure() {
        let harness = Harness::new(MockDestination::new());
        let error = ProcessError::Transform(TransformError::Rejected("force an error".to_string()));

        let recorded = harness
            .processor
            .record_failure(TriggerKind::Sqs, "m-2", &error, Some("force an error"))
            .await;

        assert!(recorded);
        let entries = harness.recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item_identifier, "m-2");
        assert_eq!(entries[0].error_code, "Rejected");
    }

    #[tokio::test]
    async fn test_record_failure_without_recorder() {
        let harness = Harness::without_recorder(MockDestination::new());
        let error = ProcessError::Transform(TransformError::Rejected("x".to_string()));

        assert!(
            !harness
                .processor
                .record_failure(TriggerKind::Sns, "n-1", &error, None)
                .await
        );
    }

    #[tokio::test]
    async fn test_record_failure_with_unavailable_error_table() {
        let harness = Harness::with_broken_recorder(MockDestination::new());
        let error = ProcessError::Transform(TransformError::Rejected("x".to_string()));

        assert!(
            !harness
                .processor
                .record_failure(TriggerKind::Sns, "n-1", &error, None)
                .await
        );
        assert!(harness.recorder.entries().is_empty());
    }
}
