/// 変換・検証ルール
///
/// デコード済みメッセージを下流呼び出し用のレコードに変換する純粋関数。
/// 副作用を持たず、同じ入力とコンテキストに対して常に同じ結果を返す。
use serde_json::{Map, Value};
use thiserror::Error;

use super::failure::FailureClass;
use super::inbound_message::{InboundMessage, PayloadFormat};
use super::transformed_record::TransformedRecord;
use super::trigger::TriggerKind;

/// 既定のメッセージ種別
pub const DEFAULT_MESSAGE_TYPE: &str = "generic";

/// テキストペイロードのメッセージ種別
pub const TEXT_MESSAGE_TYPE: &str = "text";

/// 本文が指定されなかった場合の既定文
pub const DEFAULT_MESSAGE_TEXT: &str = "No message provided";

/// 既定の拒否テキスト（部分バッチ失敗の動作確認用）
pub const DEFAULT_REJECT_TEXT: &str = "force an error";

/// 変換処理が自身で解釈するフィールド
const KNOWN_FIELDS: [&str; 5] = ["id", "type", "amount", "message", "prompt"];

/// 変換・検証エラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// 必須フィールドがない
    #[error("missing required field: {0}")]
    MissingField(String),

    /// フィールドの型が不正
    #[error("field `{field}` must be {expected}")]
    InvalidField { field: String, expected: String },

    /// 許可されていないメッセージ種別
    #[error("message type `{0}` is not allowed")]
    DisallowedType(String),

    /// 金額が正の有限値ではない
    #[error("amount must be positive: {0}")]
    NonPositiveAmount(String),

    /// 拒否テキストに一致した
    #[error("message rejected: {0}")]
    Rejected(String),
}

impl TransformError {
    /// 変換エラーは常に恒久的な失敗
    pub fn class(&self) -> FailureClass {
        FailureClass::Permanent
    }

    /// HTTPエラーレスポンス用のエラーコード
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::MissingField(_) => "MissingField",
            TransformError::InvalidField { .. } => "InvalidField",
            TransformError::DisallowedType(_) => "DisallowedType",
            TransformError::NonPositiveAmount(_) => "InvalidAmount",
            TransformError::Rejected(_) => "Rejected",
        }
    }

    fn invalid(field: &str, expected: &str) -> Self {
        TransformError::InvalidField {
            field: field.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// ペイロード外から与える変換コンテキスト
#[derive(Debug, Clone, PartialEq)]
pub struct TransformContext {
    /// ペイロードに`id`がない場合のID（メッセージID、シーケンス番号等）
    pub fallback_id: String,
    /// 受信元トリガー
    pub source: TriggerKind,
    /// 受信時刻（RFC 3339）
    pub received_at: String,
}

impl TransformContext {
    pub fn new(
        fallback_id: impl Into<String>,
        source: TriggerKind,
        received_at: impl Into<String>,
    ) -> Self {
        Self {
            fallback_id: fallback_id.into(),
            source,
            received_at: received_at.into(),
        }
    }
}

/// 変換・検証ルール
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRules {
    /// JSONペイロードに必須のフィールド
    pub required_fields: Vec<String>,
    /// 許可するメッセージ種別（Noneなら制限なし）
    pub allowed_types: Option<Vec<String>>,
    /// `type`がない場合の種別
    pub default_type: String,
    /// `message`も`prompt`もない場合の本文
    pub default_text: String,
    /// この本文のメッセージは拒否する
    pub reject_text: Option<String>,
}

impl Default for TransformRules {
    fn default() -> Self {
        Self {
            required_fields: Vec::new(),
            allowed_types: None,
            default_type: DEFAULT_MESSAGE_TYPE.to_string(),
            default_text: DEFAULT_MESSAGE_TEXT.to_string(),
            reject_text: Some(DEFAULT_REJECT_TEXT.to_string()),
        }
    }
}

impl TransformRules {
    /// メッセージを検証してレコードに変換
    pub fn apply(
        &self,
        message: &InboundMessage,
        context: &TransformContext,
    ) -> Result<TransformedRecord, TransformError> {
        match message {
            InboundMessage::Json(object) => self.apply_json(object, context),
            InboundMessage::Text(text) => self.apply_text(text, context),
        }
    }

    fn apply_json(
        &self,
        object: &Map<String, Value>,
        context: &TransformContext,
    ) -> Result<TransformedRecord, TransformError> {
        for field in &self.required_fields {
            if object.get(field).is_none_or(Value::is_null) {
                return Err(TransformError::MissingField(field.clone()));
            }
        }

        let id = match object.get("id") {
            None | Some(Value::Null) => context.fallback_id.clone(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(_) => return Err(TransformError::invalid("id", "a non-empty string or an integer")),
        };

        let record_type = match object.get("type") {
            None | Some(Value::Null) => self.default_type.clone(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => return Err(TransformError::invalid("type", "a non-empty string")),
        };
        self.check_type(&record_type)?;

        let amount = match object.get("amount") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => {
                let amount = n
                    .as_f64()
                    .ok_or_else(|| TransformError::invalid("amount", "a number"))?;
                if !amount.is_finite() || amount <= 0.0 {
                    return Err(TransformError::NonPositiveAmount(n.to_string()));
                }
                Some(amount)
            }
            Some(_) => return Err(TransformError::invalid("amount", "a number")),
        };

        // message → prompt → 既定文
        let text = match Self::text_field(object, "message")? {
            Some(text) => text,
            None => Self::text_field(object, "prompt")?.unwrap_or_else(|| self.default_text.clone()),
        };
        self.check_rejected(&text)?;

        let attributes = object
            .iter()
            .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(TransformedRecord {
            id,
            record_type,
            format: PayloadFormat::Json,
            text,
            amount,
            attributes,
            source: context.source.as_str().to_string(),
            received_at: context.received_at.clone(),
        })
    }

    fn apply_text(
        &self,
        text: &str,
        context: &TransformContext,
    ) -> Result<TransformedRecord, TransformError> {
        // テキストにはフィールドがないため、必須フィールドがあれば満たせない
        if let Some(field) = self.required_fields.first() {
            return Err(TransformError::MissingField(field.clone()));
        }

        self.check_type(TEXT_MESSAGE_TYPE)?;

        let text = if text.trim().is_empty() {
            self.default_text.clone()
        } else {
            text.to_string()
        };
        self.check_rejected(&text)?;

        Ok(TransformedRecord {
            id: context.fallback_id.clone(),
            record_type: TEXT_MESSAGE_TYPE.to_string(),
            format: PayloadFormat::Text,
            text,
            amount: None,
            attributes: Map::new(),
            source: context.source.as_str().to_string(),
            received_at: context.received_at.clone(),
        })
    }

    /// 空文字列は未指定とみなす
    fn text_field(object: &Map<String, Value>, field: &str) -> Result<Option<String>, TransformError> {
        match object.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(TransformError::invalid(field, "a string")),
        }
    }

    fn check_type(&self, record_type: &str) -> Result<(), TransformError> {
        match &self.allowed_types {
            Some(allowed) if !allowed.iter().any(|t| t == record_type) => {
                Err(TransformError::DisallowedType(record_type.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_rejected(&self, text: &str) -> Result<(), TransformError> {
        match &self.reject_text {
            Some(reject) if !reject.is_empty() && text.trim() == reject => {
                Err(TransformError::Rejected(reject.clone()))
            }
            _ => Ok(()),
        }
    }
}
