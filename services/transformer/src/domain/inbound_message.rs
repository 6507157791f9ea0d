/// 受信メッセージのデコード
///
/// トリガーのエンベロープから取り出したボディ（文字列またはJSON値）を
/// 論理メッセージに変換する。不正な入力は恒久的なクライアントエラーとして扱う。
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::failure::FailureClass;

/// メッセージデコードのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MessageDecodeError {
    /// ボディが空
    #[error("message body is empty")]
    EmptyBody,

    /// JSONとして解析できない
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// JSONだがオブジェクトではない
    #[error("message must be a JSON object")]
    NotAnObject,

    /// ボディがUTF-8ではない
    #[error("message body is not valid UTF-8")]
    InvalidUtf8,
}

impl MessageDecodeError {
    /// デコードエラーは常に恒久的な失敗
    pub fn class(&self) -> FailureClass {
        FailureClass::Permanent
    }

    /// HTTPエラーレスポンス用のエラーコード
    pub fn code(&self) -> &'static str {
        match self {
            MessageDecodeError::EmptyBody => "EmptyBody",
            MessageDecodeError::MalformedJson(_) => "InvalidJson",
            MessageDecodeError::NotAnObject => "InvalidJson",
            MessageDecodeError::InvalidUtf8 => "InvalidEncoding",
        }
    }
}

/// デコードモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// JSONオブジェクトのみ受け付ける（HTTP API）
    JsonOnly,
    /// JSONオブジェクトまたはプレーンテキスト（キュー・ストリーム・通知）
    JsonOrText,
}

/// ペイロード形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    Text,
}

impl PayloadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadFormat::Json => "json",
            PayloadFormat::Text => "text",
        }
    }
}

/// デコード済みの論理メッセージ
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// JSONオブジェクト
    Json(Map<String, Value>),
    /// プレーンテキスト
    Text(String),
}

impl InboundMessage {
    /// 文字列ボディをデコード
    ///
    /// `JsonOrText`では先頭の非空白文字が`{`または`[`の場合のみJSONとして扱い、
    /// それ以外はプレーンテキストとする。
    ///
    /// # 例
    /// ```
    /// use transformer::domain::{DecodeMode, InboundMessage};
    ///
    /// let message = InboundMessage::decode("hello", DecodeMode::JsonOrText).unwrap();
    /// assert_eq!(message, InboundMessage::Text("hello".to_string()));
    /// ```
    pub fn decode(body: &str, mode: DecodeMode) -> Result<Self, MessageDecodeError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(MessageDecodeError::EmptyBody);
        }

        let looks_like_json = trimmed.starts_with('{') || trimmed.starts_with('[');
        if mode == DecodeMode::JsonOrText && !looks_like_json {
            return Ok(InboundMessage::Text(body.to_string()));
        }

        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| MessageDecodeError::MalformedJson(e.to_string()))?;

        match value {
            Value::Object(object) => Ok(InboundMessage::Json(object)),
            _ => Err(MessageDecodeError::NotAnObject),
        }
    }

    /// バイト列ボディをデコード（Kinesisのdata等）
    pub fn decode_bytes(bytes: &[u8], mode: DecodeMode) -> Result<Self, MessageDecodeError> {
        let body = std::str::from_utf8(bytes).map_err(|_| MessageDecodeError::InvalidUtf8)?;
        Self::decode(body, mode)
    }

    /// 既にJSON値として渡されたペイロードを変換（EventBridgeのdetail等）
    ///
    /// 文字列値はボディ文字列として`JsonOrText`でデコードする。
    pub fn from_value(value: Value) -> Result<Self, MessageDecodeError> {
        match value {
            Value::Object(object) => Ok(InboundMessage::Json(object)),
            Value::String(body) => Self::decode(&body, DecodeMode::JsonOrText),
            Value::Null => Err(MessageDecodeError::EmptyBody),
            _ => Err(MessageDecodeError::NotAnObject),
        }
    }

    /// ペイロード形式
    pub fn format(&self) -> PayloadFormat {
        match self {
            InboundMessage::Json(_) => PayloadFormat::Json,
            InboundMessage::Text(_) => PayloadFormat::Text,
        }
    }
}
