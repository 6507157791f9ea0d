/// 非同期通知トリガー（SNS / EventBridge）のハンドラー
///
/// 非同期呼び出しは戻り値を誰も読まないため、失敗は呼び出しエラーで伝える。
/// 一時的な失敗はエラーを返してLambdaの非同期再試行に任せる。
/// 恒久的な失敗はエラーテーブルに記録できれば確認済みとし、
/// 記録先がなければエラーを返して失敗時の送信先（DLQ）に残す。
use std::sync::Arc;

use aws_lambda_events::event::eventbridge::EventBridgeEvent;
use aws_lambda_events::event::sns::SnsEvent;
use tracing::{info, warn};

use super::record_processor::{ProcessError, RecordProcessor, received_at_now};
use crate::domain::{DecodeMode, FailureClass, InboundMessage, TransformContext, TriggerKind};

pub struct NotificationHandler {
    processor: Arc<RecordProcessor>,
}

impl NotificationHandler {
    pub fn new(processor: Arc<RecordProcessor>) -> Self {
        Self { processor }
    }

    /// SNS通知を処理
    pub async fn handle_sns(&self, event: SnsEvent) -> Result<(), ProcessError> {
        for record in event.records {
            let message_id = record.sns.message_id;
            let body = record.sns.message;

            info!(
                message_id = %message_id,
                topic_arn = %record.sns.topic_arn,
                "SNS通知を受信"
            );

            let decoded = InboundMessage::decode(&body, DecodeMode::JsonOrText);
            let context = TransformContext::new(&message_id, TriggerKind::Sns, received_at_now());

            self.settle(
                TriggerKind::Sns,
                &message_id,
                self.processor.process_decoded(decoded, &context).await,
                &body,
            )
            .await?;
        }

        Ok(())
    }

    /// EventBridgeイベントを処理
    ///
    /// `detail`をメッセージとして扱う。`detail`にIDがない場合はイベントIDを使い、
    /// イベントIDもなければリクエストIDを使う。
    /// イベントIDは再配信でも変わらないため、再試行による二重書き込みは重複として扱われる。
    pub async fn handle_eventbridge(
        &self,
        event: EventBridgeEvent,
        request_id: &str,
    ) -> Result<(), ProcessError> {
        let event_id = event
            .id
            .clone()
            .unwrap_or_else(|| request_id.to_string());

        info!(
            event_id = %event_id,
            detail_type = %event.detail_type,
            source = %event.source,
            "EventBridgeイベントを受信"
        );

        let payload = event.detail.to_string();
        let decoded = InboundMessage::from_value(event.detail);
        let context = TransformContext::new(&event_id, TriggerKind::EventBridge, received_at_now());

        self.settle(
            TriggerKind::EventBridge,
            &event_id,
            self.processor.process_decoded(decoded, &context).await,
            &payload,
        )
        .await
    }

    /// 処理結果から呼び出しの成否を決める
    async fn settle<T>(
        &self,
        trigger: TriggerKind,
        item_identifier: &str,
        result: Result<T, ProcessError>,
        payload: &str,
    ) -> Result<(), ProcessError> {
        let error = match result {
            Ok(_) => return Ok(()),
            Err(error) if error.is_duplicate() => {
                info!(item_identifier = %item_identifier, "重複レコードを確認済みとして扱う");
                return Ok(());
            }
            Err(error) => error,
        };

        warn!(
            trigger = %trigger,
            item_identifier = %item_identifier,
            class = %error.class(),
            error = %error,
            "通知の処理に失敗"
        );

        if error.class() == FailureClass::Permanent
            && self
                .processor
                .record_failure(trigger, item_identifier, &error, Some(payload))
                .await
        {
            return Ok(());
        }

        Err(error)
    }
}
