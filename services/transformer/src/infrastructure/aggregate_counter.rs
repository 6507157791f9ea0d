/// 種別ごとの集計カウンター
///
/// 新規に送信できたレコードについて、種別をキーに件数と金額合計を
/// `UpdateItem`の`ADD`で加算する。同時実行時の整合性はDynamoDBの原子的更新に任せる。
use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::debug;

use super::sdk_error::{DownstreamError, classify};
use crate::domain::TransformedRecord;

/// 集計テーブルのパーティションキー
pub const AGGREGATE_KEY: &str = "record_type";

/// 集計トレイト（テスト用の抽象化）
#[async_trait]
pub trait AggregateCounter: Send + Sync {
    async fn increment(&self, record: &TransformedRecord) -> Result<(), DownstreamError>;
}

pub struct DynamoAggregateCounter {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoAggregateCounter {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }
}

/// 更新式と値を組み立てる
///
/// 金額がないレコードは件数のみ加算する。
fn update_expression(record: &TransformedRecord) -> (String, Vec<(&'static str, AttributeValue)>) {
    let mut values = vec![(":one", AttributeValue::N("1".to_string()))];
    match record.amount {
        Some(amount) => {
            values.push((":amount", AttributeValue::N(amount.to_string())));
            ("ADD #count :one, #total :amount".to_string(), values)
        }
        None => ("ADD #count :one".to_string(), values),
    }
}

#[async_trait]
impl AggregateCounter for DynamoAggregateCounter {
    async fn increment(&self, record: &TransformedRecord) -> Result<(), DownstreamError> {
        let (expression, values) = update_expression(record);

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(AGGREGATE_KEY, AttributeValue::S(record.record_type.clone()))
            .update_expression(expression)
            .expression_attribute_names("#count", "count");

        if record.amount.is_some() {
            request = request.expression_attribute_names("#total", "total_amount");
        }
        for (name, value) in values {
            request = request.expression_attribute_values(name, value);
        }

        request.send().await.map_err(classify)?;

        debug!(table = %self.table_name, record_type = %record.record_type, "集計を更新");
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 種別ごとの加算回数を保持するモック
    #[derive(Default)]
    pub struct MockAggregateCounter {
        counts: Mutex<HashMap<String, usize>>,
    }

    impl MockAggregateCounter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self, record_type: &str) -> usize {
            self.counts
                .lock()
                .unwrap()
                .get(record_type)
                .copied()
                .unwrap_or(0)
        }

        pub fn total(&self) -> usize {
            self.counts.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl AggregateCounter for MockAggregateCounter {
        async fn increment(&self, record: &TransformedRecord) -> Result<(), DownstreamError> {
            *self
                .counts
                .lock()
                .unwrap()
                .entry(record.record_type.clone())
                .or_default() += 1;
            Ok(())
        }
    }
}
