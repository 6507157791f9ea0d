/// SQSキューへのメッセージ送信
///
/// FIFOキューではメッセージグループIDと、レコードIDを重複排除IDとして付与する。
use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use aws_sdk_sqs::operation::send_message::SendMessageInput;
use tracing::{debug, warn};

use super::destination::{Delivery, Destination, is_fifo};
use super::sdk_error::{DownstreamError, classify};
use crate::domain::TransformedRecord;

pub struct SqsPublisher {
    client: SqsClient,
    queue_url: String,
    message_group_id: String,
}

impl SqsPublisher {
    pub fn new(client: SqsClient, queue_url: String, message_group_id: String) -> Self {
        Self {
            client,
            queue_url,
            message_group_id,
        }
    }

    /// SendMessageの入力を組み立てる
    fn request(&self, record: &TransformedRecord) -> Result<SendMessageInput, DownstreamError> {
        let body = record
            .to_json()
            .map_err(|e| DownstreamError::permanent("SerializationError", e.to_string()))?;
        let fifo = is_fifo(&self.queue_url);

        SendMessageInput::builder()
            .queue_url(&self.queue_url)
            .message_body(body)
            .set_message_group_id(fifo.then(|| self.message_group_id.clone()))
            .set_message_deduplication_id(fifo.then(|| record.id.clone()))
            .build()
            .map_err(|e| DownstreamError::permanent("InvalidRequest", e.to_string()))
    }
}

#[async_trait]
impl Destination for SqsPublisher {
    fn target(&self) -> &str {
        &self.queue_url
    }

    async fn deliver(&self, record: &TransformedRecord) -> Result<Delivery, DownstreamError> {
        let input = self.request(record)?;

        let result = self
            .client
            .send_message()
            .set_queue_url(input.queue_url)
            .set_message_body(input.message_body)
            .set_message_group_id(input.message_group_id)
            .set_message_deduplication_id(input.message_deduplication_id)
            .send()
            .await;

        match result {
            Ok(output) => {
                let message_id = output.message_id().map(str::to_string);
                debug!(queue_url = %self.queue_url, record_id = %record.id, message_id = ?message_id, "SendMessage成功");
                Ok(Delivery {
                    record_id: record.id.clone(),
                    target: self.queue_url.clone(),
                    reference: message_id,
                })
            }
            Err(err) => {
                let error = classify(err);
                warn!(queue_url = %self.queue_url, record_id = %record.id, error = %error, "SendMessageエラー");
                Err(error)
            }
        }
    }
}
