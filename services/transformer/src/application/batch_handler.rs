/// バッチトリガー（SQS / Kinesis / DynamoDB Streams）のハンドラー
///
/// 失敗したレコードだけを`batchItemFailures`で報告し、成功したレコードを再処理させない。
///
/// # 報告規則
/// - SQS: 全件を処理し、失敗したメッセージIDをすべて報告する。
///   FIFOキューでは最初の失敗以降を全件報告してグループ内の順序を守る。
/// - Kinesis / DynamoDB Streams: 最初の失敗で処理を止め、そのシーケンス番号を報告する。
///   以降のレコードはチェックポイントから再読み込みされる。
/// - 既に書き込み済み（再配信による重複）は成功として扱う。
use std::sync::Arc;
use std::time::Instant;

use aws_lambda_events::event::dynamodb;
use aws_lambda_events::event::kinesis::{KinesisEvent, KinesisEventRecord};
use aws_lambda_events::event::sqs::SqsEvent;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::record_processor::{ProcessError, RecordProcessor, received_at_now};
use crate::domain::{
    BatchResponse, DecodeMode, FailureClass, InboundMessage, MessageDecodeError, PayloadFormat,
    TransformContext, TriggerKind,
};
use crate::infrastructure::BatchMetrics;
use crate::infrastructure::destination::is_fifo;

/// DynamoDB Streamsの削除イベント
const DYNAMODB_REMOVE: &str = "REMOVE";

/// 1件の処理結果
enum ItemResult {
    Succeeded,
    Duplicate,
    Failed(ProcessError),
}

pub struct BatchHandler {
    processor: Arc<RecordProcessor>,
}

impl BatchHandler {
    pub fn new(processor: Arc<RecordProcessor>) -> Self {
        Self { processor }
    }

    /// SQSバッチを処理
    ///
    /// 処理後に形式別の成功・失敗件数をメトリクスとして出力する。
    pub async fn handle_sqs(&self, event: SqsEvent) -> BatchResponse {
        let started = Instant::now();
        let (response, metrics) = self.process_sqs(event).await;
        metrics.emit(started.elapsed());
        response
    }

    async fn process_sqs(&self, event: SqsEvent) -> (BatchResponse, BatchMetrics) {
        let mut response = BatchResponse::new();
        let mut metrics = BatchMetrics::new(event.records.len());
        let mut blocked = false;
        let total = event.records.len();

        for message in event.records {
            let message_id = message.message_id.unwrap_or_default();
            let body = message.body;
            let decoded = body
                .as_deref()
                .ok_or(MessageDecodeError::EmptyBody)
                .and_then(|b| InboundMessage::decode(b, DecodeMode::JsonOrText));
            let format = payload_format(&decoded);

            // FIFOキューで先行メッセージが失敗している
            if blocked {
                debug!(message_id = %message_id, "先行メッセージの失敗により未処理");
                metrics.record(format, false);
                response.add_failure(message_id);
                continue;
            }

            let fifo = message
                .event_source_arn
                .as_deref()
                .is_some_and(is_fifo);
            let context = TransformContext::new(&message_id, TriggerKind::Sqs, received_at_now());

            match self.run(decoded, &context).await {
                ItemResult::Failed(error) => {
                    self.report(TriggerKind::Sqs, &message_id, &error, body.as_deref())
                        .await;
                    metrics.record(format, false);
                    response.add_failure(message_id);
                    blocked = fifo;
                }
                ItemResult::Succeeded | ItemResult::Duplicate => metrics.record(format, true),
            }
        }

        self.summarize(TriggerKind::Sqs, total, &response);
        (response, metrics)
    }

    /// Kinesisバッチを処理
    pub async fn handle_kinesis(&self, event: KinesisEvent) -> BatchResponse {
        let mut response = BatchResponse::new();
        let total = event.records.len();

        for record in event.records {
            let sequence_number = kinesis_identifier(&record);
            let data = record.kinesis.data.0;

            let decoded = InboundMessage::decode_bytes(&data, DecodeMode::JsonOrText);
            let context =
                TransformContext::new(&sequence_number, TriggerKind::Kinesis, received_at_now());

            if let ItemResult::Failed(error) = self.run(decoded, &context).await {
                let payload = String::from_utf8_lossy(&data);
                self.report(TriggerKind::Kinesis, &sequence_number, &error, Some(&payload))
                    .await;
                response.add_failure(sequence_number);
                break;
            }
        }

        self.summarize(TriggerKind::Kinesis, total, &response);
        response
    }

    /// DynamoDB Streamsバッチを処理
    ///
    /// 新しいイメージをメッセージとして扱う。削除イベントとイメージのないレコードは読み飛ばす。
    pub async fn handle_dynamodb_stream(&self, event: dynamodb::Event) -> BatchResponse {
        let mut response = BatchResponse::new();
        let total = event.records.len();

        for record in event.records {
            let identifier = record
                .change
                .sequence_number
                .clone()
                .unwrap_or_else(|| record.event_id.clone());

            if record.event_name == DYNAMODB_REMOVE {
                debug!(sequence_number = %identifier, "削除イベントを読み飛ばし");
                continue;
            }

            let image: Value = match serde_dynamo::from_item(record.change.new_image) {
                Ok(image) => image,
                Err(e) => {
                    let error = ProcessError::Decode(MessageDecodeError::MalformedJson(e.to_string()));
                    self.report(TriggerKind::DynamoDbStream, &identifier, &error, None)
                        .await;
                    response.add_failure(identifier);
                    break;
                }
            };

            if image.as_object().is_none_or(|object| object.is_empty()) {
                debug!(sequence_number = %identifier, "新しいイメージがないため読み飛ばし");
                continue;
            }

            let payload = image.to_string();
            let decoded = InboundMessage::from_value(image);
            let context =
                TransformContext::new(&identifier, TriggerKind::DynamoDbStream, received_at_now());

            if let ItemResult::Failed(error) = self.run(decoded, &context).await {
                self.report(TriggerKind::DynamoDbStream, &identifier, &error, Some(&payload))
                    .await;
                response.add_failure(identifier);
                break;
            }
        }

        self.summarize(TriggerKind::DynamoDbStream, total, &response);
        response
    }

    async fn run(
        &self,
        decoded: Result<InboundMessage, MessageDecodeError>,
        context: &TransformContext,
    ) -> ItemResult {
        match self.processor.process_decoded(decoded, context).await {
            Ok(_) => ItemResult::Succeeded,
            Err(error) if error.is_duplicate() => {
                info!(item_identifier = %context.fallback_id, "重複レコードを確認済みとして扱う");
                ItemResult::Duplicate
            }
            Err(error) => ItemResult::Failed(error),
        }
    }

    /// 失敗をログに残し、恒久的な失敗はエラーテーブルにも記録する
    async fn report(
        &self,
        trigger: TriggerKind,
        item_identifier: &str,
        error: &ProcessError,
        payload: Option<&str>,
    ) {
        warn!(
            trigger = %trigger,
            item_identifier = %item_identifier,
            class = %error.class(),
            error = %error,
            "レコードの処理に失敗"
        );

        if error.class() == FailureClass::Permanent {
            self.processor
                .record_failure(trigger, item_identifier, error, payload)
                .await;
        }
    }

    fn summarize(&self, trigger: TriggerKind, total: usize, response: &BatchResponse) {
        if response.is_success() {
            info!(trigger = %trigger, record_count = total, "バッチ処理完了");
        } else {
            warn!(
                trigger = %trigger,
                record_count = total,
                failure_count = response.failure_count(),
                "部分バッチ失敗"
            );
        }
    }
}

/// Kinesisレコードの識別子
///
/// シーケンス番号、なければイベントIDを使う。どちらもなければ空文字列を返し、
/// 空の`itemIdentifier`としてバッチ全体を再試行させる。
pub(crate) fn kinesis_identifier(record: &KinesisEventRecord) -> String {
    record
        .kinesis
        .sequence_number
        .clone()
        .or_else(|| record.event_id.clone())
        .unwrap_or_default()
}

/// メトリクス用のペイロード形式（デコードに失敗した場合は推定）
fn payload_format(decoded: &Result<InboundMessage, MessageDecodeError>) -> PayloadFormat {
    match decoded {
        Ok(message) => message.format(),
        Err(MessageDecodeError::MalformedJson(_) | MessageDecodeError::NotAnObject) => {
            PayloadFormat::Json
        }
        Err(_) => PayloadFormat::Text,
    }
}
