/// トリガーディスパッチャ
///
/// 受け取ったイベントの種別を判定し、種別ごとのハンドラーへ振り分ける。
/// ハンドラーの結果はLambdaの応答形式（HTTPレスポンス / batchItemFailures / 空）に変換する。
use std::sync::Arc;

use lambda_runtime::LambdaEvent;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};

use super::batch_handler::BatchHandler;
use super::custom_resource_handler::CustomResourceHandler;
use super::http_handler::HttpHandler;
use super::notification_handler::NotificationHandler;
use super::record_processor::{ProcessError, RecordProcessor};
use crate::domain::{BatchResponse, HttpResponse, Trigger, TriggerDecodeError};
use crate::infrastructure::{
    AwsClients, CustomResourceResponder, DynamoAggregateCounter, DynamoFailureRecorder,
    HttpCustomResourceResponder, ResponderError, TransformerConfig, build_destination,
};

/// Lambdaへ返す応答
///
/// タグなしでシリアライズする（`Empty`は`null`）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InvocationResponse {
    Http(HttpResponse),
    Batch(BatchResponse),
    Empty,
}

/// 呼び出しエラー（Lambdaの再試行・DLQの対象）
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Trigger(#[from] TriggerDecodeError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("custom resource response failed: {0}")]
    Responder(#[from] ResponderError),
}

pub struct TriggerDispatcher {
    http: HttpHandler,
    batch: BatchHandler,
    notification: NotificationHandler,
    custom_resource: CustomResourceHandler,
}

impl TriggerDispatcher {
    pub fn new(
        processor: Arc<RecordProcessor>,
        responder: Arc<dyn CustomResourceResponder>,
        allowed_origin: impl Into<String>,
    ) -> Self {
        Self {
            http: HttpHandler::new(processor.clone(), allowed_origin),
            batch: BatchHandler::new(processor.clone()),
            notification: NotificationHandler::new(processor.clone()),
            custom_resource: CustomResourceHandler::new(processor, responder),
        }
    }

    /// 設定とSDKクライアントから本番用の依存関係を組み立てる
    pub fn from_config(
        config: &TransformerConfig,
        clients: &AwsClients,
    ) -> Result<Self, ResponderError> {
        let destination = build_destination(&config.destination, clients);
        let mut processor = RecordProcessor::new(config.rules.clone(), destination);

        if let Some(table_name) = &config.error_table_name {
            processor = processor.with_failure_recorder(Arc::new(DynamoFailureRecorder::new(
                clients.dynamodb.clone(),
                table_name.clone(),
            )));
        }

        if let Some(table_name) = &config.aggregate_table_name {
            processor = processor.with_aggregate_counter(Arc::new(DynamoAggregateCounter::new(
                clients.dynamodb.clone(),
                table_name.clone(),
            )));
        }

        info!(
            destination = config.destination.kind(),
            error_table = config.error_table_name.is_some(),
            aggregate_table = config.aggregate_table_name.is_some(),
            "ディスパッチャを初期化"
        );

        Ok(Self::new(
            Arc::new(processor),
            Arc::new(HttpCustomResourceResponder::new()?),
            config.allowed_origin.clone(),
        ))
    }

    /// Lambdaイベントを処理
    pub async fn dispatch(
        &self,
        event: LambdaEvent<Value>,
    ) -> Result<InvocationResponse, DispatchError> {
        self.dispatch_value(
            event.payload,
            &event.context.request_id,
            Some(event.context.deadline),
        )
        .await
    }

    /// イベント本体とリクエストIDを受け取って処理
    ///
    /// `deadline_ms`はLambdaの実行期限（エポックミリ秒）。
    pub async fn dispatch_value(
        &self,
        payload: Value,
        request_id: &str,
        deadline_ms: Option<u64>,
    ) -> Result<InvocationResponse, DispatchError> {
        let trigger = match Trigger::decode(payload) {
            Ok(trigger) => trigger,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "イベントを解釈できない");
                return Err(e.into());
            }
        };

        let span = info_span!("invocation", request_id = %request_id, trigger = %trigger.kind());
        self.route(trigger, request_id, deadline_ms)
            .instrument(span)
            .await
    }

    async fn route(
        &self,
        trigger: Trigger,
        request_id: &str,
        deadline_ms: Option<u64>,
    ) -> Result<InvocationResponse, DispatchError> {
        let response = match trigger {
            Trigger::Http(request) => {
                InvocationResponse::Http(self.http.handle(request, request_id).await)
            }
            Trigger::Sqs(event) => InvocationResponse::Batch(self.batch.handle_sqs(event).await),
            Trigger::Kinesis(event) => {
                InvocationResponse::Batch(self.batch.handle_kinesis(event).await)
            }
            Trigger::DynamoDbStream(event) => {
                InvocationResponse::Batch(self.batch.handle_dynamodb_stream(event).await)
            }
            Trigger::Sns(event) => {
                self.notification.handle_sns(event).await?;
                InvocationResponse::Empty
            }
            Trigger::EventBridge(event) => {
                self.notification
                    .handle_eventbridge(event, request_id)
                    .await?;
                InvocationResponse::Empty
            }
            Trigger::CustomResource(request) => {
                self.custom_resource.handle(request, deadline_ms).await?;
                InvocationResponse::Empty
            }
        };

        Ok(response)
    }
}
