// CustomResourceResponder - CloudFormationへの完了通知
//
// 署名付きResponseURLへ応答JSONをPUTする。
// 一時的な失敗は指数バックオフで再試行し、送信できなければ呼び出し全体を失敗させる。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::domain::CustomResourceResponse;

/// 最大再試行回数
const MAX_RETRIES: u32 = 3;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// 応答送信のエラー型
#[derive(Debug, Error)]
pub enum ResponderError {
    /// ResponseURLが不正（HTTPS以外を含む）
    #[error("invalid response url: {0}")]
    InvalidUrl(String),

    /// 送信先がエラーステータスを返した
    #[error("response rejected: status={status}, body={body}")]
    HttpError { status: u16, body: String },

    /// 接続失敗・再試行回数超過
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    /// HTTPクライアントの初期化失敗
    #[error("http client build error: {0}")]
    ClientBuild(String),
}

/// 応答送信トレイト（テスト用の抽象化）
#[async_trait]
pub trait CustomResourceResponder: Send + Sync {
    async fn send(
        &self,
        response_url: &str,
        response: &CustomResourceResponse,
    ) -> Result<(), ResponderError>;
}

/// ResponseURLを検証する（HTTPSのみ許可）
pub fn validate_response_url(response_url: &str) -> Result<Url, ResponderError> {
    let url = Url::parse(response_url).map_err(|e| ResponderError::InvalidUrl(e.to_string()))?;
    if url.scheme() != "https" {
        return Err(ResponderError::InvalidUrl(format!(
            "scheme must be https: {}",
            url.scheme()
        )));
    }
    Ok(url)
}

/// reqwestによる実装
#[derive(Clone)]
pub struct HttpCustomResourceResponder {
    client: ClientWithMiddleware,
}

impl std::fmt::Debug for HttpCustomResourceResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCustomResourceResponder")
            .finish_non_exhaustive()
    }
}

impl HttpCustomResourceResponder {
    pub fn new() -> Result<Self, ResponderError> {
        let base_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ResponderError::ClientBuild(e.to_string()))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);

        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client })
    }
}

#[async_trait]
impl CustomResourceResponder for HttpCustomResourceResponder {
    async fn send(
        &self,
        response_url: &str,
        response: &CustomResourceResponse,
    ) -> Result<(), ResponderError> {
        let url = validate_response_url(response_url)?;
        let body = serde_json::to_vec(response)
            .map_err(|e| ResponderError::SerializationError(e.to_string()))?;

        // 署名にContent-Typeが含まれないため空にする
        let result = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(
                    request_id = %response.request_id,
                    status = ?response.status,
                    "カスタムリソース応答を送信"
                );
                Ok(())
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                warn!(status = status, "カスタムリソース応答が拒否された");
                Err(ResponderError::HttpError { status, body })
            }
            Err(e) => {
                warn!(error = %e, "カスタムリソース応答の送信に失敗");
                Err(ResponderError::NetworkError(e.to_string()))
            }
        }
    }
}
