/// トリガー種別の判定とエンベロープのデコード
///
/// 1つの関数が複数のイベントソースから呼ばれるため、受信したJSONの
/// 明示的な判別フィールドだけを見て種別を決め、対応する型にデコードする。
use std::fmt;
use std::str::FromStr;

use aws_lambda_events::event::dynamodb;
use aws_lambda_events::event::eventbridge::EventBridgeEvent;
use aws_lambda_events::event::kinesis::KinesisEvent;
use aws_lambda_events::event::sns::SnsEvent;
use aws_lambda_events::event::sqs::SqsEvent;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use super::custom_resource::CustomResourceRequest;
use super::http::{HttpRequest, HttpRequestError};

/// トリガー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Http,
    Sqs,
    Sns,
    EventBridge,
    Kinesis,
    DynamoDbStream,
    CustomResource,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 7] = [
        TriggerKind::Http,
        TriggerKind::Sqs,
        TriggerKind::Sns,
        TriggerKind::EventBridge,
        TriggerKind::Kinesis,
        TriggerKind::DynamoDbStream,
        TriggerKind::CustomResource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Http => "http",
            TriggerKind::Sqs => "sqs",
            TriggerKind::Sns => "sns",
            TriggerKind::EventBridge => "eventbridge",
            TriggerKind::Kinesis => "kinesis",
            TriggerKind::DynamoDbStream => "dynamodb",
            TriggerKind::CustomResource => "custom_resource",
        }
    }

    /// イベントJSONからトリガー種別を判定
    ///
    /// # 判定規則
    /// - `Records[0].eventSource`: `aws:sqs` / `aws:kinesis` / `aws:dynamodb`
    /// - `Records[0].EventSource`: `aws:sns`
    /// - `detail-type`と`source`: EventBridge
    /// - `RequestType`と`ResponseURL`: CloudFormationカスタムリソース
    /// - `httpMethod`または`requestContext.http.method`: HTTP
    pub fn detect(event: &Value) -> Option<Self> {
        if let Some(first) = event.pointer("/Records/0") {
            let source = first
                .get("eventSource")
                .or_else(|| first.get("EventSource"))
                .and_then(Value::as_str)?;
            return match source {
                "aws:sqs" => Some(TriggerKind::Sqs),
                "aws:sns" => Some(TriggerKind::Sns),
                "aws:kinesis" => Some(TriggerKind::Kinesis),
                "aws:dynamodb" => Some(TriggerKind::DynamoDbStream),
                _ => None,
            };
        }

        if event.get("detail-type").is_some() && event.get("source").is_some() {
            return Some(TriggerKind::EventBridge);
        }

        if event.get("RequestType").is_some() && event.get("ResponseURL").is_some() {
            return Some(TriggerKind::CustomResource);
        }

        let has_method = event.get("httpMethod").is_some()
            || event.pointer("/requestContext/http/method").is_some();
        if has_method {
            return Some(TriggerKind::Http);
        }

        None
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TriggerKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 未知のトリガー種別名
#[derive(Debug, Error, Clone, PartialEq)]
#[error("unknown trigger kind: {0}")]
pub struct UnknownTriggerKind(pub String);

impl FromStr for TriggerKind {
    type Err = UnknownTriggerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTriggerKind(s.to_string()))
    }
}

/// トリガーのデコードエラー
///
/// 自前のイベントソースは常に正しいエンベロープを送るため、
/// これは呼び出し全体の失敗として扱う。
#[derive(Debug, Error)]
pub enum TriggerDecodeError {
    /// どのトリガー種別にも該当しない
    #[error("unrecognized trigger envelope")]
    Unrecognized,

    /// 種別は判定できたがデコードに失敗
    #[error("malformed {kind} envelope: {source}")]
    Malformed {
        kind: TriggerKind,
        #[source]
        source: serde_json::Error,
    },

    /// HTTPリクエストの解析に失敗
    #[error("malformed http request: {0}")]
    Http(#[from] HttpRequestError),
}

/// デコード済みトリガー
#[derive(Debug)]
pub enum Trigger {
    Http(HttpRequest),
    Sqs(SqsEvent),
    Sns(SnsEvent),
    EventBridge(EventBridgeEvent),
    Kinesis(KinesisEvent),
    DynamoDbStream(dynamodb::Event),
    CustomResource(CustomResourceRequest),
}

impl Trigger {
    /// 種別を判定してデコード
    pub fn decode(event: Value) -> Result<Self, TriggerDecodeError> {
        let kind = TriggerKind::detect(&event).ok_or(TriggerDecodeError::Unrecognized)?;
        Self::decode_as(kind, event)
    }

    /// 指定した種別としてデコード
    pub fn decode_as(kind: TriggerKind, event: Value) -> Result<Self, TriggerDecodeError> {
        let malformed = |source| TriggerDecodeError::Malformed { kind, source };

        let trigger = match kind {
            TriggerKind::Http => Trigger::Http(HttpRequest::from_value(&event)?),
            TriggerKind::Sqs => Trigger::Sqs(serde_json::from_value(event).map_err(malformed)?),
            TriggerKind::Sns => Trigger::Sns(serde_json::from_value(event).map_err(malformed)?),
            TriggerKind::EventBridge => {
                Trigger::EventBridge(serde_json::from_value(event).map_err(malformed)?)
            }
            TriggerKind::Kinesis => {
                Trigger::Kinesis(serde_json::from_value(event).map_err(malformed)?)
            }
            TriggerKind::DynamoDbStream => {
                Trigger::DynamoDbStream(serde_json::from_value(event).map_err(malformed)?)
            }
            TriggerKind::CustomResource => {
                Trigger::CustomResource(serde_json::from_value(event).map_err(malformed)?)
            }
        };

        Ok(trigger)
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Http(_) => TriggerKind::Http,
            Trigger::Sqs(_) => TriggerKind::Sqs,
            Trigger::Sns(_) => TriggerKind::Sns,
            Trigger::EventBridge(_) => TriggerKind::EventBridge,
            Trigger::Kinesis(_) => TriggerKind::Kinesis,
            Trigger::DynamoDbStream(_) => TriggerKind::DynamoDbStream,
            Trigger::CustomResource(_) => TriggerKind::CustomResource,
        }
    }
}

/// テスト用のAWSサンプルイベント
#[cfg(test)]
pub mod fixtures {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::{Value, json};

    /// SQSレコード1件
    pub fn sqs_record(message_id: &str, body: &str, queue_arn: &str) -> Value {
        json!({
            "messageId": message_id,
            "receiptHandle": format!("AQEB-{}", message_id),
            "body": body,
            "attributes": {
                "ApproximateReceiveCount": "1",
                "SentTimestamp": "1545082649183",
                "SenderId": "AIDAIENQZJOLO23YVJ4VO",
                "ApproximateFirstReceiveTimestamp": "1545082649185"
            },
            "messageAttributes": {},
            "md5OfBody": "e4e68fb7bd0e697a0ae8f1bb342846b3",
            "eventSource": "aws:sqs",
            "eventSourceARN": queue_arn,
            "awsRegion": "us-east-2"
        })
    }

    /// SQSイベント（標準キュー）
    pub fn sqs_event(messages: &[(&str, &str)]) -> Value {
        sqs_event_for_queue("arn:aws:sqs:us-east-2:123456789012:my-queue", messages)
    }

    pub fn sqs_event_for_queue(queue_arn: &str, messages: &[(&str, &str)]) -> Value {
        let records: Vec<Value> = messages
            .iter()
            .map(|(id, body)| sqs_record(id, body, queue_arn))
            .collect();
        json!({ "Records": records })
    }

    /// Kinesisイベント（dataはbase64エンコードされる）
    pub fn kinesis_event(records: &[(&str, &str)]) -> Value {
        let records: Vec<Value> = records
            .iter()
            .map(|(sequence_number, data)| {
                json!({
                    "kinesis": {
                        "kinesisSchemaVersion": "1.0",
                        "partitionKey": "1",
                        "sequenceNumber": sequence_number,
                        "data": STANDARD.encode(data),
                        "approximateArrivalTimestamp": 1545084650.987
                    },
                    "eventSource": "aws:kinesis",
                    "eventVersion": "1.0",
                    "eventID": format!("shardId-000000000006:{}", sequence_number),
                    "eventName": "aws:kinesis:record",
                    "invokeIdentityArn": "arn:aws:iam::123456789012:role/lambda-role",
                    "awsRegion": "us-east-2",
                    "eventSourceARN": "arn:aws:kinesis:us-east-2:123456789012:stream/lambda-stream"
                })
            })
            .collect();
        json!({ "Records": records })
    }

    /// DynamoDB Streamsレコード1件
    pub fn dynamodb_record(event_name: &str, sequence_number: &str, new_image: Option<Value>) -> Value {
        let mut change = json!({
            "Keys": { "id": { "S": sequence_number } },
            "ApproximateCreationDateTime": 1428537600.0,
            "SequenceNumber": sequence_number,
            "SizeBytes": 26,
            "StreamViewType": "NEW_AND_OLD_IMAGES"
        });
        if let Some(image) = new_image {
            change["NewImage"] = image;
        }
        json!({
            "eventID": format!("event-{}", sequence_number),
            "eventName": event_name,
            "eventVersion": "1.1",
            "eventSource": "aws:dynamodb",
            "awsRegion": "us-east-1",
            "dynamodb": change,
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:123456789012:table/orders/stream/2015-06-27T00:48:05.899"
        })
    }

    pub fn dynamodb_event(records: Vec<Value>) -> Value {
        json!({ "Records": records })
    }

    /// SNSイベント
    pub fn sns_event(message_id: &str, message: &str) -> Value {
        json!({
            "Records": [{
                "EventVersion": "1.0",
                "EventSubscriptionArn": "arn:aws:sns:us-east-1:123456789012:orders:2bcfbf39-05c3-41de-beaa-fcfcc21c8f55",
                "EventSource": "aws:sns",
                "Sns": {
                    "SignatureVersion": "1",
                    "Timestamp": "2019-01-02T12:45:07.000Z",
                    "Signature": "tcc6faL2yUC6dgZdmrwh1Y4cGa/ebXEkAi6RibDsvpi+tE/1+82j...65r==",
                    "SigningCertUrl": "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-ac565b8b1a6c5d002d285f9598aa1d9b.pem",
                    "MessageId": message_id,
                    "Message": message,
                    "MessageAttributes": {},
                    "Type": "Notification",
                    "UnsubscribeUrl": "https://sns.us-east-1.amazonaws.com/?Action=Unsubscribe",
                    "TopicArn": "arn:aws:sns:us-east-1:123456789012:orders",
                    "Subject": "order"
                }
            }]
        })
    }

    /// EventBridgeイベント
    pub fn eventbridge_event(id: &str, detail: Value) -> Value {
        json!({
            "version": "0",
            "id": id,
            "detail-type": "OrderPlaced",
            "source": "com.example.orders",
            "account": "123456789012",
            "time": "2024-01-01T00:00:00Z",
            "region": "us-east-1",
            "resources": [],
            "detail": detail
        })
    }

    /// API Gateway REST（v1）プロキシイベント
    pub fn http_event(method: &str, body: Option<&str>) -> Value {
        json!({
            "resource": "/messages",
            "path": "/messages",
            "httpMethod": method,
            "headers": { "Content-Type": "application/json" },
            "queryStringParameters": null,
            "requestContext": { "requestId": "c6af9ac6-7b61-11e6-9a41-93e8deadbeef", "stage": "prod" },
            "body": body,
            "isBase64Encoded": false
        })
    }

    /// カスタムリソースのリクエスト
    pub fn custom_resource_event(request_type: &str, response_url: &str, records: Value) -> Value {
        json!({
            "RequestType": request_type,
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:transformer",
            "ResponseURL": response_url,
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/seed-stack/5b918d10-cd98-11ea-90d5-0a9cd3354c10",
            "RequestId": "5d478078-13e9-baf0-464a-7ef285ecc786",
            "LogicalResourceId": "SeedRecords",
            "ResourceType": "Custom::SeedRecords",
            "ResourceProperties": { "Records": records }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    // ==================== 判定テスト ====================

    #[test]
    fn test_detect_all_kinds() {
        let cases = [
            (sqs_event(&[("m1", "hi")]), TriggerKind::Sqs),
            (sns_event("n1", "hi"), TriggerKind::Sns),
            (kinesis_event(&[("1", "hi")]), TriggerKind::Kinesis),
            (
                dynamodb_event(vec![dynamodb_record("INSERT", "100", None)]),
                TriggerKind::DynamoDbStream,
            ),
            (eventbridge_event("e1", json!({})), TriggerKind::EventBridge),
            (http_event("POST", Some("{}")), TriggerKind::Http),
            (
                custom_resource_event("Create", "https://example.com", json!([])),
                TriggerKind::CustomResource,
            ),
        ];

        for (event, expected) in cases {
            assert_eq!(TriggerKind::detect(&event), Some(expected));
        }
    }

    #[test]
    fn test_detect_http_v2() {
        let event = json!({
            "version": "2.0",
            "rawPath": "/messages",
            "requestContext": { "http": { "method": "POST" } }
        });
        assert_eq!(TriggerKind::detect(&event), Some(TriggerKind::Http));
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(TriggerKind::detect(&json!({ "hello": "world" })), None);
        assert_eq!(
            TriggerKind::detect(&json!({ "Records": [{ "eventSource": "aws:s3" }] })),
            None
        );
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("sqs".parse::<TriggerKind>(), Ok(TriggerKind::Sqs));
        assert_eq!("DynamoDB".parse::<TriggerKind>(), Ok(TriggerKind::DynamoDbStream));
        assert!("s3".parse::<TriggerKind>().is_err());
    }

    // ==================== デコードテスト ====================

    #[test]
    fn test_decode_sqs() {
        let trigger = Trigger::decode(sqs_event(&[("m1", "a"), ("m2", "b")])).unwrap();
        match trigger {
            Trigger::Sqs(event) => {
                assert_eq!(event.records.len(), 2);
                assert_eq!(event.records[1].message_id.as_deref(), Some("m2"));
                assert_eq!(event.records[0].body.as_deref(), Some("a"));
            }
            other => panic!("予期しないトリガー: {:?}", other.kind()),
        }
    }

    #[test]
    fn test_decode_kinesis_data() {
        let trigger = Trigger::decode(kinesis_event(&[("4954", "payload")])).unwrap();
        match trigger {
            Trigger::Kinesis(event) => {
                assert_eq!(event.records[0].kinesis.sequence_number.as_deref(), Some("4954"));
                assert_eq!(event.records[0].kinesis.data.0, b"payload".to_vec());
            }
            other => panic!("予期しないトリガー: {:?}", other.kind()),
        }
    }

    #[test]
    fn test_decode_sns_and_eventbridge() {
        assert_eq!(
            Trigger::decode(sns_event("n1", "hi")).unwrap().kind(),
            TriggerKind::Sns
        );
        assert_eq!(
            Trigger::decode(eventbridge_event("e1", json!({ "a": 1 })))
                .unwrap()
                .kind(),
            TriggerKind::EventBridge
        );
    }

    #[test]
    fn test_decode_unrecognized() {
        assert!(matches!(
            Trigger::decode(json!({})),
            Err(TriggerDecodeError::Unrecognized)
        ));
    }

    #[test]
    fn test_decode_malformed_custom_resource() {
        // StackIdなどの必須フィールドが欠けている
        let event = json!({ "RequestType": "Create", "ResponseURL": "https://example.com" });
        assert!(matches!(
            Trigger::decode(event),
            Err(TriggerDecodeError::Malformed { kind: TriggerKind::CustomResource, .. })
        ));
    }
}
