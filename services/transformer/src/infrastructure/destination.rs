/// 下流呼び出しの抽象化
///
/// 変換済みレコード1件につきSDK呼び出しを1回だけ行う。
/// 実装はDynamoDB（条件付き書き込み）、EventBridge、SQS、SNSの4種類。
use std::sync::Arc;

use async_trait::async_trait;

use super::aws_clients::AwsClients;
use super::config::DestinationConfig;
use super::dynamo_record_store::DynamoRecordStore;
use super::eventbridge_publisher::EventBridgePublisher;
use super::sdk_error::DownstreamError;
use super::sns_publisher::SnsPublisher;
use super::sqs_publisher::SqsPublisher;
use crate::domain::TransformedRecord;

/// 下流呼び出しの結果
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// 送信したレコードのID
    pub record_id: String,
    /// 送信先リソース（テーブル名・バス名・キューURL・トピックARN）
    pub target: String,
    /// 下流が採番したID（メッセージID・イベントID）
    pub reference: Option<String>,
}

/// 送信先トレイト（テスト用の抽象化）
#[async_trait]
pub trait Destination: Send + Sync {
    /// 送信先リソースの識別子
    fn target(&self) -> &str;

    /// レコードを1件送信する
    ///
    /// # 戻り値
    /// * `Ok(Delivery)` - 送信成功
    /// * `Err(DownstreamError)` - 分類済みの失敗
    async fn deliver(&self, record: &TransformedRecord) -> Result<Delivery, DownstreamError>;
}

/// 設定に従って送信先を作成
pub fn build_destination(config: &DestinationConfig, clients: &AwsClients) -> Arc<dyn Destination> {
    match config {
        DestinationConfig::Table { table_name } => Arc::new(DynamoRecordStore::new(
            clients.dynamodb.clone(),
            table_name.clone(),
        )),
        DestinationConfig::EventBus {
            event_bus_name,
            source,
            detail_type,
        } => Arc::new(EventBridgePublisher::new(
            clients.eventbridge.clone(),
            event_bus_name.clone(),
            source.clone(),
            detail_type.clone(),
        )),
        DestinationConfig::Queue {
            queue_url,
            message_group_id,
        } => Arc::new(SqsPublisher::new(
            clients.sqs.clone(),
            queue_url.clone(),
            message_group_id.clone(),
        )),
        DestinationConfig::Topic {
            topic_arn,
            message_group_id,
        } => Arc::new(SnsPublisher::new(
            clients.sns.clone(),
            topic_arn.clone(),
            message_group_id.clone(),
        )),
    }
}

/// FIFOキュー・トピックかどうか（URL/ARNが`.fifo`で終わる）
pub fn is_fifo(resource: &str) -> bool {
    resource.ends_with(".fifo")
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// テスト用のモック送信先
    ///
    /// 送信されたレコードを記録し、IDごとに失敗を仕込める。
    /// 同じIDの2回目以降は条件付き書き込みと同様に`AlreadyExists`を返す。
    pub struct MockDestination {
        target: String,
        failures: HashMap<String, DownstreamError>,
        seen: Mutex<HashSet<String>>,
        delivered: Mutex<Vec<TransformedRecord>>,
        call_count: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockDestination {
        pub fn new() -> Self {
            Self {
                target: "mock-table".to_string(),
                failures: HashMap::new(),
                seen: Mutex::new(HashSet::new()),
                delivered: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
                delay: None,
            }
        }

        /// 送信ごとに待たせる（応答の遅い下流）
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// 指定IDの送信を失敗させる
        pub fn failing(mut self, id: &str, error: DownstreamError) -> Self {
            self.failures.insert(id.to_string(), error);
            self
        }

        /// 既に書き込み済みのIDとして登録する
        pub fn with_existing(self, id: &str) -> Self {
            self.seen.lock().unwrap().insert(id.to_string());
            self
        }

        /// 成功したレコード
        pub fn delivered(&self) -> Vec<TransformedRecord> {
            self.delivered.lock().unwrap().clone()
        }

        pub fn delivered_ids(&self) -> Vec<String> {
            self.delivered().into_iter().map(|r| r.id).collect()
        }

        /// deliverの呼び出し回数（失敗を含む）
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Destination for MockDestination {
        fn target(&self) -> &str {
            &self.target
        }

        async fn deliver(&self, record: &TransformedRecord) -> Result<Delivery, DownstreamError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = self.failures.get(&record.id) {
                return Err(error.clone());
            }

            if !self.seen.lock().unwrap().insert(record.id.clone()) {
                return Err(DownstreamError::AlreadyExists(record.id.clone()));
            }

            self.delivered.lock().unwrap().push(record.clone());
            Ok(Delivery {
                record_id: record.id.clone(),
                target: self.target.clone(),
                reference: None,
            })
        }
    }
}
