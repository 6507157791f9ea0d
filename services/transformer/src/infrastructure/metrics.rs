/// SQSバッチのメトリクス
///
/// CloudWatch Embedded Metric Format（EMF）のJSON行を標準出力へ書き出す。
/// CloudWatch Logsが取り込み時にメトリクスへ変換するため、PutMetricDataは呼ばない。
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use crate::domain::PayloadFormat;

/// メトリクスの名前空間
pub const METRICS_NAMESPACE: &str = "SQSProcessor";

/// `service`ディメンションの値
const SERVICE_NAME: &str = "transformer";

/// バッチ1回分の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchMetrics {
    pub batch_size: usize,
    pub successful_json: usize,
    pub successful_text: usize,
    pub failed_json: usize,
    pub failed_text: usize,
}

impl BatchMetrics {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    /// メッセージ1件の結果を加算
    pub fn record(&mut self, format: PayloadFormat, succeeded: bool) {
        let counter = match (format, succeeded) {
            (PayloadFormat::Json, true) => &mut self.successful_json,
            (PayloadFormat::Text, true) => &mut self.successful_text,
            (PayloadFormat::Json, false) => &mut self.failed_json,
            (PayloadFormat::Text, false) => &mut self.failed_text,
        };
        *counter += 1;
    }

    pub fn successful(&self) -> usize {
        self.successful_json + self.successful_text
    }

    pub fn failed(&self) -> usize {
        self.failed_json + self.failed_text
    }

    /// EMF形式のドキュメントを組み立てる
    pub fn to_emf(&self, timestamp_ms: i64, elapsed: Duration) -> Value {
        json!({
            "_aws": {
                "Timestamp": timestamp_ms,
                "CloudWatchMetrics": [{
                    "Namespace": METRICS_NAMESPACE,
                    "Dimensions": [["service"]],
                    "Metrics": [
                        { "Name": "SuccessfulMessages", "Unit": "Count" },
                        { "Name": "FailedMessages", "Unit": "Count" },
                        { "Name": "SuccessfulJSONMessages", "Unit": "Count" },
                        { "Name": "SuccessfulTEXTMessages", "Unit": "Count" },
                        { "Name": "FailedJSONMessages", "Unit": "Count" },
                        { "Name": "FailedTEXTMessages", "Unit": "Count" },
                        { "Name": "BatchSize", "Unit": "Count" },
                        { "Name": "BatchProcessingTime", "Unit": "Milliseconds" }
                    ]
                }]
            },
            "service": SERVICE_NAME,
            "SuccessfulMessages": self.successful(),
            "FailedMessages": self.failed(),
            "SuccessfulJSONMessages": self.successful_json,
            "SuccessfulTEXTMessages": self.successful_text,
            "FailedJSONMessages": self.failed_json,
            "FailedTEXTMessages": self.failed_text,
            "BatchSize": self.batch_size,
            "BatchProcessingTime": elapsed.as_millis() as u64,
        })
    }

    /// 標準出力へ書き出す
    ///
    /// tracingのJSONレイヤーはフィールドを文字列化するため、EMFはそのまま1行で出力する。
    pub fn emit(&self, elapsed: Duration) {
        println!("{}", self.to_emf(Utc::now().timestamp_millis(), elapsed));
    }
}
