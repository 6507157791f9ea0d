/// 保存したトリガーイベントの再生（下流呼び出しなし）
///
/// `replay`コマンドから使う。イベントに含まれる各メッセージをデコード・変換し、
/// 送信されるはずのレコード、または失敗内容を返す。
use serde::Serialize;
use serde_json::Value;

use super::batch_handler::kinesis_identifier;
use crate::domain::{
    DecodeMode, FailureClass, InboundMessage, MessageDecodeError, TransformContext,
    TransformRules, TransformedRecord, Trigger, TriggerKind,
};

/// 再生時に使うリクエストID・物理リソースIDの代わりの値
pub const REPLAY_REQUEST_ID: &str = "replay";

/// 失敗内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayFailure {
    pub code: String,
    pub class: FailureClass,
    pub message: String,
}

/// メッセージ1件の再生結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub item_identifier: String,
    pub trigger: TriggerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TransformedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplayFailure>,
}

impl ReplayOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 再生対象のメッセージ
struct ReplayItem {
    identifier: String,
    decoded: Result<InboundMessage, MessageDecodeError>,
}

impl ReplayItem {
    fn new(identifier: impl Into<String>, decoded: Result<InboundMessage, MessageDecodeError>) -> Self {
        Self {
            identifier: identifier.into(),
            decoded,
        }
    }
}

/// トリガーに含まれるすべてのメッセージを変換する
pub fn replay(trigger: Trigger, rules: &TransformRules, received_at: &str) -> Vec<ReplayOutcome> {
    let kind = trigger.kind();

    collect_items(trigger)
        .into_iter()
        .map(|item| {
            let context = TransformContext::new(&item.identifier, kind, received_at);
            let result = item
                .decoded
                .map_err(|e| ReplayFailure {
                    code: e.code().to_string(),
                    class: e.class(),
                    message: e.to_string(),
                })
                .and_then(|message| {
                    rules.apply(&message, &context).map_err(|e| ReplayFailure {
                        code: e.code().to_string(),
                        class: e.class(),
                        message: e.to_string(),
                    })
                });

            let (record, error) = match result {
                Ok(record) => (Some(record), None),
                Err(error) => (None, Some(error)),
            };

            ReplayOutcome {
                item_identifier: item.identifier,
                trigger: kind,
                record,
                error,
            }
        })
        .collect()
}

fn collect_items(trigger: Trigger) -> Vec<ReplayItem> {
    match trigger {
        Trigger::Http(request) => {
            let decoded = request
                .body
                .as_deref()
                .ok_or(MessageDecodeError::EmptyBody)
                .and_then(|body| InboundMessage::decode(body, DecodeMode::JsonOnly));
            vec![ReplayItem::new(REPLAY_REQUEST_ID, decoded)]
        }
        Trigger::Sqs(event) => event
            .records
            .into_iter()
            .map(|message| {
                let decoded = message
                    .body
                    .as_deref()
                    .ok_or(MessageDecodeError::EmptyBody)
                    .and_then(|body| InboundMessage::decode(body, DecodeMode::JsonOrText));
                ReplayItem::new(message.message_id.unwrap_or_default(), decoded)
            })
            .collect(),
        Trigger::Kinesis(event) => event
            .records
            .into_iter()
            .map(|record| {
                let decoded =
                    InboundMessage::decode_bytes(&record.kinesis.data.0, DecodeMode::JsonOrText);
                ReplayItem::new(kinesis_identifier(&record), decoded)
            })
            .collect(),
        Trigger::DynamoDbStream(event) => event
            .records
            .into_iter()
            .filter(|record| record.event_name != "REMOVE")
            .filter_map(|record| {
                let identifier = record
                    .change
                    .sequence_number
                    .clone()
                    .unwrap_or_else(|| record.event_id.clone());
                let image: Value = match serde_dynamo::from_item(record.change.new_image) {
                    Ok(image) => image,
                    Err(e) => {
                        return Some(ReplayItem::new(
                            identifier,
                            Err(MessageDecodeError::MalformedJson(e.to_string())),
                        ));
                    }
                };
                if image.as_object().is_none_or(|object| object.is_empty()) {
                    return None;
                }
                Some(ReplayItem::new(identifier, InboundMessage::from_value(image)))
            })
            .collect(),
        Trigger::Sns(event) => event
            .records
            .into_iter()
            .map(|record| {
                let decoded = InboundMessage::decode(&record.sns.message, DecodeMode::JsonOrText);
                ReplayItem::new(record.sns.message_id, decoded)
            })
            .collect(),
        Trigger::EventBridge(event) => {
            let event_id = event.id.unwrap_or_else(|| REPLAY_REQUEST_ID.to_string());
            vec![ReplayItem::new(event_id, InboundMessage::from_value(event.detail))]
        }
        Trigger::CustomResource(request) => {
            let physical_resource_id = request.physical_resource_id(REPLAY_REQUEST_ID);
            request
                .seed_records()
                .into_iter()
                .enumerate()
                .map(|(index, value)| {
                    ReplayItem::new(
                        format!("{}-{}", physical_resource_id, index),
                        InboundMessage::from_value(value),
                    )
                })
                .collect()
        }
    }
}
