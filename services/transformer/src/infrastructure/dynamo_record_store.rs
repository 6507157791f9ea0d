/// DynamoDBテーブルへのレコード書き込み
///
/// `attribute_not_exists(id)`による条件付きPutItemで、同じIDのレコードを上書きしない。
/// 再配信された重複レコードは`DownstreamError::AlreadyExists`になる。
use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, warn};

use super::destination::{Delivery, Destination};
use super::sdk_error::{DownstreamError, classify};
use crate::domain::TransformedRecord;

/// 重複書き込みを防ぐ条件式
const CONDITION_ID_NOT_EXISTS: &str = "attribute_not_exists(id)";

pub struct DynamoRecordStore {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoRecordStore {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }
}

/// レコードをDynamoDBのアイテムに変換
///
/// `attributes`はMap型の属性としてそのまま保存される。
pub fn record_to_item(
    record: &TransformedRecord,
) -> Result<HashMap<String, AttributeValue>, DownstreamError> {
    serde_dynamo::to_item(record)
        .map_err(|e| DownstreamError::permanent("SerializationError", e.to_string()))
}

#[async_trait]
impl Destination for DynamoRecordStore {
    fn target(&self) -> &str {
        &self.table_name
    }

    async fn deliver(&self, record: &TransformedRecord) -> Result<Delivery, DownstreamError> {
        let item = record_to_item(record)?;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression(CONDITION_ID_NOT_EXISTS)
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(table = %self.table_name, record_id = %record.id, "PutItem成功");
                Ok(Delivery {
                    record_id: record.id.clone(),
                    target: self.table_name.clone(),
                    reference: None,
                })
            }
            Err(err) => {
                let is_duplicate = err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception());
                if is_duplicate {
                    debug!(table = %self.table_name, record_id = %record.id, "既存のレコード");
                    return Err(DownstreamError::AlreadyExists(record.id.clone()));
                }

                let error = classify(err);
                warn!(
                    table = %self.table_name,
                    record_id = %record.id,
                    error = %error,
                    "PutItemエラー"
                );
                Err(error)
            }
        }
    }
}
