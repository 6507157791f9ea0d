/// HTTPトリガー（API Gateway / Function URL）のハンドラー
///
/// 同期呼び出しなので、失敗は必ず構造化されたJSONボディ付きのHTTPステータスで返す。
/// 呼び出し自体をエラーにすることはない。
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::record_processor::{ProcessError, RecordProcessor, received_at_now};
use crate::domain::{
    DecodeMode, FailureClass, HttpRequest, HttpResponse, InboundMessage, MessageDecodeError,
    TransformContext, TriggerKind,
};
use crate::infrastructure::DownstreamError;

/// 一時的な失敗時にクライアントへ提示する再試行間隔（秒）
const RETRY_AFTER_SECS: &str = "1";

pub struct HttpHandler {
    processor: Arc<RecordProcessor>,
    allowed_origin: String,
}

impl HttpHandler {
    pub fn new(processor: Arc<RecordProcessor>, allowed_origin: impl Into<String>) -> Self {
        Self {
            processor,
            allowed_origin: allowed_origin.into(),
        }
    }

    /// リクエストを処理してレスポンスを返す
    ///
    /// # ステータスコード
    /// - 200: 送信成功
    /// - 204: CORSプリフライト（OPTIONS）
    /// - 400: デコード・検証エラー
    /// - 405: POST・OPTIONS以外のメソッド
    /// - 409: 同じIDのレコードが既に存在する
    /// - 500: 恒久的な下流エラー
    /// - 503: 一時的な下流エラー（`Retry-After`付き）
    pub async fn handle(&self, request: HttpRequest, request_id: &str) -> HttpResponse {
        if request.method == "OPTIONS" {
            return HttpResponse::no_content().with_cors(&self.allowed_origin);
        }

        if request.method != "POST" {
            return HttpResponse::error(
                405,
                "MethodNotAllowed",
                format!("method {} is not allowed", request.method),
            )
            .with_header("Allow", "POST, OPTIONS")
            .with_cors(&self.allowed_origin);
        }

        let decoded = request
            .body
            .as_deref()
            .ok_or(MessageDecodeError::EmptyBody)
            .and_then(|body| InboundMessage::decode(body, DecodeMode::JsonOnly));

        let context = TransformContext::new(request_id, TriggerKind::Http, received_at_now());

        let response = match self.processor.process_decoded(decoded, &context).await {
            Ok(delivery) => {
                info!(record_id = %delivery.record_id, destination = %delivery.target, "HTTPリクエストを処理");
                HttpResponse::json(
                    200,
                    &json!({
                        "id": delivery.record_id,
                        "destination": delivery.target,
                        "reference": delivery.reference,
                    }),
                )
            }
            Err(error) => error_response(&error),
        };

        response.with_cors(&self.allowed_origin)
    }
}

/// 処理エラーをHTTPレスポンスに変換
pub fn error_response(error: &ProcessError) -> HttpResponse {
    if error.is_client_error() {
        return HttpResponse::error(400, error.code(), error.to_string());
    }

    match error {
        ProcessError::Downstream(DownstreamError::AlreadyExists(id)) => {
            HttpResponse::error(409, "AlreadyExists", format!("record {} already exists", id))
        }
        _ if error.class() == FailureClass::Transient => {
            warn!(error = %error, "一時的な下流エラー");
            HttpResponse::error(503, error.code(), error.to_string())
                .with_header("Retry-After", RETRY_AFTER_SECS)
        }
        _ => {
            warn!(error = %error, "恒久的な下流エラー");
            HttpResponse::error(500, error.code(), error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::record_processor::test_support::Harness;
    use crate::domain::trigger::fixtures::http_event;
    use crate::infrastructure::destination::mock::MockDestination;

    const REQUEST_ID: &str = "c6af9ac6-7b61-11e6-9a41-93e8deadbeef";

    fn request(method: &str, body: Option<&str>) -> HttpRequest {
        HttpRequest::from_value(&http_event(method, body)).unwrap()
    }

    fn handler(harness: &Harness) -> HttpHandler {
        HttpHandler::new(harness.processor.clone(), "*")
    }

    #[tokio::test]
    async fn test_valid_post_returns_200() {
        let harness = Harness::new(MockDestination::new());

        let response = handler(&harness)
            .handle(
                request("POST", Some(r#"{"id":"order-1","type":"order","amount":10}"#)),
                REQUEST_ID,
            )
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body_json().unwrap()["id"], "order-1");
        assert_eq!(
            response.headers.get("Access-Control-Allow-Origin").map(String::as_str),
            Some("*")
        );
        assert_eq!(harness.destination.delivered_ids(), vec!["order-1"]);
    }

    #[tokio::test]
    async fn test_request_id_is_fallback_id() {
        let harness = Harness::new(MockDestination::new());

        let response = handler(&harness)
            .handle(request("POST", Some(r#"{"message":"hi"}"#)), REQUEST_ID)
            .await;

        assert_eq!(response.body_json().unwrap()["id"], REQUEST_ID);
    }

    #[tokio::test]
    async fn test_malformed_json_returns_400_without_downstream_call() {
        let harness = Harness::new(MockDestination::new());

        let response = handler(&harness)
            .handle(request("POST", Some("{not json")), REQUEST_ID)
            .await;

        assert_eq!(response.status_code, 400);
        let body = response.body_json().unwrap();
        assert_eq!(body["error"], "InvalidJson");
        assert!(body["message"].is_string());
        assert_eq!(harness.destination.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_body_returns_400() {
        let harness = Harness::new(MockDestination::new());

        let response = handler(&harness).handle(request("POST", None), REQUEST_ID).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(response.body_json().unwrap()["error"], "EmptyBody");
    }

    #[tokio::test]
    async fn test_validation_error_returns_400() {
        let harness = Harness::new(MockDestination::new());

        let response = handler(&harness)
            .handle(request("POST", Some(r#"{"amount":0}"#)), REQUEST_ID)
            .await;

        assert_eq!(response.status_code, 400);
        assert_eq!(response.body_json().unwrap()["error"], "InvalidAmount");
    }

    #[tokio::test]
    async fn test_non_post_returns_405() {
        let harness = Harness::new(MockDestination::new());

        let response = handler(&harness).handle(request("GET", None), REQUEST_ID).await;

        assert_eq!(response.status_code, 405);
        assert_eq!(
            response.headers.get("Allow").map(String::as_str),
            Some("POST, OPTIONS")
        );
        assert_eq!(harness.destination.call_count(), 0);
    }

    #[tokio::test]
    async fn test_preflight_returns_204_with_cors() {
        let harness = Harness::new(MockDestination::new());

        let response = HttpHandler::new(harness.processor.clone(), "https://example.com")
            .handle(request("OPTIONS", None), REQUEST_ID)
            .await;

        assert_eq!(response.status_code, 204);
        assert!(response.body.is_empty());
        assert_eq!(
            response.headers.get("Access-Control-Allow-Origin").map(String::as_str),
            Some("https://example.com")
        );
        assert_eq!(
            response.headers.get("Access-Control-Allow-Methods").map(String::as_str),
            Some("POST, OPTIONS")
        );
        assert_eq!(harness.destination.call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_returns_409() {
        let harness = Harness::new(MockDestination::new().with_existing("order-1"));

        let response = handler(&harness)
            .handle(request("POST", Some(r#"{"id":"order-1"}"#)), REQUEST_ID)
            .await;

        assert_eq!(response.status_code, 409);
        assert_eq!(response.body_json().unwrap()["error"], "AlreadyExists");
    }

    #[tokio::test]
    async fn test_transient_downstream_returns_503_with_retry_after() {
        let harness = Harness::new(MockDestination::new().failing(
            "order-1",
            DownstreamError::transient("ProvisionedThroughputExceededException", "throttled"),
        ));

        let response = handler(&harness)
            .handle(request("POST", Some(r#"{"id":"order-1"}"#)), REQUEST_ID)
            .await;

        assert_eq!(response.status_code, 503);
        assert_eq!(response.headers.get("Retry-After").map(String::as_str), Some("1"));
        assert_eq!(
            response.body_json().unwrap()["error"],
            "ProvisionedThroughputExceededException"
        );
    }

    #[tokio::test]
    async fn test_permanent_downstream_returns_500() {
        let harness = Harness::new(MockDestination::new().failing(
            "order-1",
            DownstreamError::permanent("AccessDeniedException", "not authorized"),
        ));

        let response = handler(&harness)
            .handle(request("POST", Some(r#"{"id":"order-1"}"#)), REQUEST_ID)
            .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body_json().unwrap()["error"], "AccessDeniedException");
    }
}
