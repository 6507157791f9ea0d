/// SNSトピックへのメッセージ発行
///
/// 件名にはレコードの種別を使う。FIFOトピックではグループIDと重複排除IDを付与する。
use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sns::operation::publish::PublishInput;
use tracing::{debug, warn};

use super::destination::{Delivery, Destination, is_fifo};
use super::sdk_error::{DownstreamError, classify};
use crate::domain::TransformedRecord;

/// SNSの件名の上限
const MAX_SUBJECT_LEN: usize = 100;

pub struct SnsPublisher {
    client: SnsClient,
    topic_arn: String,
    message_group_id: String,
}

impl SnsPublisher {
    pub fn new(client: SnsClient, topic_arn: String, message_group_id: String) -> Self {
        Self {
            client,
            topic_arn,
            message_group_id,
        }
    }

    /// Publishの入力を組み立てる
    fn request(&self, record: &TransformedRecord) -> Result<PublishInput, DownstreamError> {
        let message = record
            .to_json()
            .map_err(|e| DownstreamError::permanent("SerializationError", e.to_string()))?;
        let fifo = is_fifo(&self.topic_arn);

        PublishInput::builder()
            .topic_arn(&self.topic_arn)
            .set_subject(subject_for(record))
            .message(message)
            .set_message_group_id(fifo.then(|| self.message_group_id.clone()))
            .set_message_deduplication_id(fifo.then(|| record.id.clone()))
            .build()
            .map_err(|e| DownstreamError::permanent("InvalidRequest", e.to_string()))
    }
}

/// 種別から件名を作る
///
/// SNSの件名はASCIIのみで改行・制御文字を含められない。
/// 制御文字は空白に置き換え、ASCII以外の文字は取り除く。何も残らなければ件名を付けない。
fn subject_for(record: &TransformedRecord) -> Option<String> {
    let sanitized: String = record
        .record_type
        .chars()
        .map(|c| if c.is_ascii_control() { ' ' } else { c })
        .filter(char::is_ascii)
        .collect();

    let subject: String = sanitized.trim().chars().take(MAX_SUBJECT_LEN).collect();
    let subject = subject.trim_end().to_string();
    (!subject.is_empty()).then_some(subject)
}

#[async_trait]
impl Destination for SnsPublisher {
    fn target(&self) -> &str {
        &self.topic_arn
    }

    async fn deliver(&self, record: &TransformedRecord) -> Result<Delivery, DownstreamError> {
        let input = self.request(record)?;

        let result = self
            .client
            .publish()
            .set_topic_arn(input.topic_arn)
            .set_subject(input.subject)
            .set_message(input.message)
            .set_message_group_id(input.message_group_id)
            .set_message_deduplication_id(input.message_deduplication_id)
            .send()
            .await;

        match result {
            Ok(output) => {
                let message_id = output.message_id().map(str::to_string);
                debug!(topic_arn = %self.topic_arn, record_id = %record.id, message_id = ?message_id, "SNS Publish成功");
                Ok(Delivery {
                    record_id: record.id.clone(),
                    target: self.topic_arn.clone(),
                    reference: message_id,
                })
            }
            Err(err) => {
                let error = classify(err);
                warn!(topic_arn = %self.topic_arn, record_id = %record.id, error = %error, "SNS Publishエラー");
                Err(error)
            }
        }
    }
}
