/// HTTPトリガー（API Gateway REST v1 / HTTP API v2 / Function URL）の
/// リクエスト・レスポンス表現
///
/// 受信イベントは`serde_json::Value`から直接読み取り、v1とv2の差異はここで吸収する。
use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// HTTPリクエスト解析のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HttpRequestError {
    /// HTTPメソッドが見つからない
    #[error("missing http method")]
    MissingMethod,

    /// base64エンコードされたボディのデコードに失敗
    #[error("invalid base64 body: {0}")]
    InvalidBase64(String),

    /// ボディがUTF-8ではない
    #[error("body is not valid UTF-8")]
    InvalidUtf8,
}

/// 正規化済みHTTPリクエスト
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRequest {
    /// 大文字のHTTPメソッド（例: "POST"）
    pub method: String,
    /// リクエストパス
    pub path: String,
    /// 小文字化したヘッダー名 → 値
    pub headers: BTreeMap<String, String>,
    /// デコード済みボディ
    pub body: Option<String>,
}

impl HttpRequest {
    /// API GatewayプロキシイベントからHttpRequestを作成
    ///
    /// REST API（v1）は`httpMethod`/`path`、HTTP API（v2）とFunction URLは
    /// `requestContext.http.method`/`rawPath`を参照する。
    pub fn from_value(event: &Value) -> Result<Self, HttpRequestError> {
        let method = event
            .get("httpMethod")
            .and_then(Value::as_str)
            .or_else(|| {
                event
                    .pointer("/requestContext/http/method")
                    .and_then(Value::as_str)
            })
            .ok_or(HttpRequestError::MissingMethod)?
            .to_ascii_uppercase();

        let path = event
            .get("path")
            .and_then(Value::as_str)
            .or_else(|| event.get("rawPath").and_then(Value::as_str))
            .unwrap_or("/")
            .to_string();

        let headers = string_map(event.get("headers"))
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        let is_base64 = event
            .get("isBase64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let body = match event.get("body").and_then(Value::as_str) {
            Some(raw) if is_base64 => {
                let bytes = STANDARD
                    .decode(raw)
                    .map_err(|e| HttpRequestError::InvalidBase64(e.to_string()))?;
                Some(String::from_utf8(bytes).map_err(|_| HttpRequestError::InvalidUtf8)?)
            }
            Some(raw) => Some(raw.to_string()),
            None => None,
        };

        Ok(Self {
            method,
            path,
            headers,
            body,
        })
    }
}

/// 文字列値のみを持つJSONオブジェクトをマップに変換（nullは空マップ）
fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// API Gatewayへ返すHTTPレスポンス
///
/// `{ "statusCode", "headers", "body" }`の形でシリアライズされる。
/// エラー時も必ず構造化されたJSONボディを返す。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// JSONボディのレスポンスを作成
    pub fn json(status_code: u16, body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    /// エラーレスポンスを作成
    ///
    /// ボディは`{"error": <code>, "message": <message>}`
    pub fn error(status_code: u16, code: &str, message: impl Into<String>) -> Self {
        Self::json(
            status_code,
            &serde_json::json!({
                "error": code,
                "message": message.into(),
            }),
        )
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// CORSヘッダーを追加
    pub fn with_cors(self, allowed_origin: &str) -> Self {
        self.with_header("Access-Control-Allow-Origin", allowed_origin)
            .with_header("Access-Control-Allow-Headers", "Content-Type")
            .with_header("Access-Control-Allow-Methods", "POST, OPTIONS")
    }

    /// ボディなしのレスポンスを作成（CORSプリフライト用）
    pub fn no_content() -> Self {
        Self {
            status_code: 204,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// ボディをJSONとして解析（テスト・ログ用）
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}
