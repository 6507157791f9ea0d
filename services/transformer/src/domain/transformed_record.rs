/// 変換済みレコード
///
/// 下流サービス（DynamoDB / EventBridge / SQS / SNS）へ渡す形。呼び出しごとに新しく作られ、
/// 呼び出しをまたいで保持されることはない。
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::inbound_message::PayloadFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    /// レコードID（条件付き書き込み・重複排除のキー）
    pub id: String,
    /// メッセージ種別
    #[serde(rename = "type")]
    pub record_type: String,
    /// 元のペイロード形式
    pub format: PayloadFormat,
    /// 本文（message → prompt → 既定文の順に採用）
    pub text: String,
    /// 金額（指定時は正の数）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// 既知フィールド以外の属性
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// 受信元トリガー種別
    pub source: String,
    /// 受信時刻（RFC 3339）
    pub received_at: String,
}

impl TransformedRecord {
    /// JSON文字列にシリアライズ（メッセージ本文・イベントdetail用）
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
