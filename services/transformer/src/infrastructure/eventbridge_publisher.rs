/// EventBridgeへのイベント発行
///
/// PutEventsは呼び出し自体が成功しても、エントリ単位で失敗することがある
/// （`FailedEntryCount`）。その場合はエントリのエラーコードで分類する。
use async_trait::async_trait;
use aws_sdk_eventbridge::Client as EventBridgeClient;
use aws_sdk_eventbridge::types::PutEventsRequestEntry;
use tracing::{debug, warn};

use super::destination::{Delivery, Destination};
use super::sdk_error::{DownstreamError, classify, classify_code};
use crate::domain::TransformedRecord;

pub struct EventBridgePublisher {
    client: EventBridgeClient,
    event_bus_name: String,
    source: String,
    detail_type: String,
}

impl EventBridgePublisher {
    pub fn new(
        client: EventBridgeClient,
        event_bus_name: String,
        source: String,
        detail_type: String,
    ) -> Self {
        Self {
            client,
            event_bus_name,
            source,
            detail_type,
        }
    }

    fn entry(&self, record: &TransformedRecord) -> Result<PutEventsRequestEntry, DownstreamError> {
        let detail = record
            .to_json()
            .map_err(|e| DownstreamError::permanent("SerializationError", e.to_string()))?;

        Ok(PutEventsRequestEntry::builder()
            .event_bus_name(&self.event_bus_name)
            .source(&self.source)
            .detail_type(&self.detail_type)
            .detail(detail)
            .build())
    }
}

#[async_trait]
impl Destination for EventBridgePublisher {
    fn target(&self) -> &str {
        &self.event_bus_name
    }

    async fn deliver(&self, record: &TransformedRecord) -> Result<Delivery, DownstreamError> {
        let entry = self.entry(record)?;

        let output = self
            .client
            .put_events()
            .entries(entry)
            .send()
            .await
            .map_err(|err| {
                let error = classify(err);
                warn!(event_bus = %self.event_bus_name, record_id = %record.id, error = %error, "PutEventsエラー");
                error
            })?;

        if output.failed_entry_count() > 0 {
            let failed = output.entries().iter().find(|e| e.error_code().is_some());
            let code = failed.and_then(|e| e.error_code()).unwrap_or("Unknown");
            let message = failed
                .and_then(|e| e.error_message())
                .unwrap_or("event entry was rejected");

            let error = classify_code(code, message);
            warn!(
                event_bus = %self.event_bus_name,
                record_id = %record.id,
                error_code = %code,
                "PutEventsエントリ失敗"
            );
            return Err(error);
        }

        let event_id = output
            .entries()
            .first()
            .and_then(|e| e.event_id())
            .map(str::to_string);
        debug!(event_bus = %self.event_bus_name, record_id = %record.id, event_id = ?event_id, "PutEvents成功");

        Ok(Delivery {
            record_id: record.id.clone(),
            target: self.event_bus_name.clone(),
            reference: event_id,
        })
    }
}
