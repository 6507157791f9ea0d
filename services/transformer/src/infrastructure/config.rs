/// 環境変数からの設定読み込み
///
/// 送信先・補助テーブル・変換ルールはすべて環境変数で指定する。
/// 設定が不正な場合は初期化時にエラーとし、呼び出しを受け付けない。
use thiserror::Error;

use crate::domain::TransformRules;

/// 送信先の種別（`DESTINATION`）
pub const DESTINATION: &str = "DESTINATION";
pub const TABLE_NAME: &str = "TABLE_NAME";
pub const EVENT_BUS_NAME: &str = "EVENT_BUS_NAME";
pub const EVENT_SOURCE: &str = "EVENT_SOURCE";
pub const EVENT_DETAIL_TYPE: &str = "EVENT_DETAIL_TYPE";
pub const QUEUE_URL: &str = "QUEUE_URL";
pub const TOPIC_ARN: &str = "TOPIC_ARN";
pub const MESSAGE_GROUP_ID: &str = "MESSAGE_GROUP_ID";
pub const ERROR_TABLE_NAME: &str = "ERROR_TABLE_NAME";
pub const AGGREGATE_TABLE_NAME: &str = "AGGREGATE_TABLE_NAME";
pub const DOWNSTREAM_MAX_ATTEMPTS: &str = "DOWNSTREAM_MAX_ATTEMPTS";
pub const ALLOWED_ORIGIN: &str = "ALLOWED_ORIGIN";
pub const ALLOWED_MESSAGE_TYPES: &str = "ALLOWED_MESSAGE_TYPES";
pub const REQUIRED_FIELDS: &str = "REQUIRED_FIELDS";
pub const DEFAULT_MESSAGE_TYPE: &str = "DEFAULT_MESSAGE_TYPE";
pub const DEFAULT_MESSAGE_TEXT: &str = "DEFAULT_MESSAGE_TEXT";
pub const REJECT_MESSAGE_TEXT: &str = "REJECT_MESSAGE_TEXT";

const DEFAULT_EVENT_SOURCE: &str = "transformer";
const DEFAULT_EVENT_DETAIL_TYPE: &str = "RecordTransformed";
const DEFAULT_MESSAGE_GROUP_ID: &str = "default";
const DEFAULT_ALLOWED_ORIGIN: &str = "*";
const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// 設定のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// 送信先の設定
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationConfig {
    /// DynamoDBテーブルへの条件付き書き込み
    Table { table_name: String },
    /// EventBridgeイベントバスへのPutEvents
    EventBus {
        event_bus_name: String,
        source: String,
        detail_type: String,
    },
    /// SQSキューへのSendMessage
    Queue {
        queue_url: String,
        message_group_id: String,
    },
    /// SNSトピックへのPublish
    Topic {
        topic_arn: String,
        message_group_id: String,
    },
}

impl DestinationConfig {
    /// ログ出力用の送信先種別
    pub fn kind(&self) -> &'static str {
        match self {
            DestinationConfig::Table { .. } => "table",
            DestinationConfig::EventBus { .. } => "event_bus",
            DestinationConfig::Queue { .. } => "queue",
            DestinationConfig::Topic { .. } => "topic",
        }
    }
}

/// サービス全体の設定
#[derive(Debug, Clone, PartialEq)]
pub struct TransformerConfig {
    pub destination: DestinationConfig,
    /// 恒久的な失敗を記録するテーブル（任意）
    pub error_table_name: Option<String>,
    /// 種別ごとの件数を集計するテーブル（任意）
    pub aggregate_table_name: Option<String>,
    /// SDK内部の最大試行回数
    pub downstream_max_attempts: u32,
    /// HTTPレスポンスの`Access-Control-Allow-Origin`
    pub allowed_origin: String,
    pub rules: TransformRules,
}

impl TransformerConfig {
    /// プロセスの環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let destination = match env.required(DESTINATION)?.as_str() {
            "table" => DestinationConfig::Table {
                table_name: env.required(TABLE_NAME)?,
            },
            "event_bus" => DestinationConfig::EventBus {
                event_bus_name: env.required(EVENT_BUS_NAME)?,
                source: env.or(EVENT_SOURCE, DEFAULT_EVENT_SOURCE),
                detail_type: env.or(EVENT_DETAIL_TYPE, DEFAULT_EVENT_DETAIL_TYPE),
            },
            "queue" => DestinationConfig::Queue {
                queue_url: env.required(QUEUE_URL)?,
                message_group_id: env.or(MESSAGE_GROUP_ID, DEFAULT_MESSAGE_GROUP_ID),
            },
            "topic" => DestinationConfig::Topic {
                topic_arn: env.required(TOPIC_ARN)?,
                message_group_id: env.or(MESSAGE_GROUP_ID, DEFAULT_MESSAGE_GROUP_ID),
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    name: DESTINATION.to_string(),
                    value: other.to_string(),
                });
            }
        };

        let downstream_max_attempts = match env.optional(DOWNSTREAM_MAX_ATTEMPTS) {
            None => DEFAULT_MAX_ATTEMPTS,
            Some(raw) => match raw.parse::<u32>() {
                Ok(attempts) if attempts >= 1 => attempts,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: DOWNSTREAM_MAX_ATTEMPTS.to_string(),
                        value: raw,
                    });
                }
            },
        };

        Ok(Self {
            destination,
            error_table_name: env.optional(ERROR_TABLE_NAME),
            aggregate_table_name: env.optional(AGGREGATE_TABLE_NAME),
            downstream_max_attempts,
            allowed_origin: env.or(ALLOWED_ORIGIN, DEFAULT_ALLOWED_ORIGIN),
            rules: rules_from_lookup(&lookup),
        })
    }
}

/// 変換ルールのみを読み込む（送信先を必要としないreplay CLI用）
pub fn rules_from_lookup<F>(lookup: &F) -> TransformRules
where
    F: Fn(&str) -> Option<String>,
{
    let env = Lookup(lookup);
    let defaults = TransformRules::default();

    let allowed_types = env
        .optional(ALLOWED_MESSAGE_TYPES)
        .map(|raw| split_list(&raw))
        .filter(|types| !types.is_empty());

    // 空文字列を明示した場合は拒否テキストを無効にする
    let reject_text = match lookup(REJECT_MESSAGE_TEXT) {
        None => defaults.reject_text,
        Some(raw) if raw.trim().is_empty() => None,
        Some(raw) => Some(raw.trim().to_string()),
    };

    TransformRules {
        required_fields: env
            .optional(REQUIRED_FIELDS)
            .map(|raw| split_list(&raw))
            .unwrap_or_default(),
        allowed_types,
        default_type: env.or(DEFAULT_MESSAGE_TYPE, &defaults.default_type),
        default_text: env.or(DEFAULT_MESSAGE_TEXT, &defaults.default_text),
        reject_text,
    }
}

/// プロセスの環境変数から変換ルールを読み込む
pub fn rules_from_env() -> TransformRules {
    rules_from_lookup(&|name: &str| std::env::var(name).ok())
}

/// カンマ区切りのリストを分割（空要素は除く）
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// 空文字列を未設定とみなす参照ヘルパー
struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }
}
