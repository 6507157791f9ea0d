/// 実行環境ごとに一度だけ作るAWS SDKクライアント群
///
/// `main`で作成してディスパッチャに注入し、呼び出しごとに作り直さない。
/// SDK内部の再試行回数は`DOWNSTREAM_MAX_ATTEMPTS`で制御する（既定は1回）。
/// 再試行はトリガー側（SQSの再配信、ストリームの再読み込み、非同期呼び出しの再試行）に任せる。
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_eventbridge::Client as EventBridgeClient;
use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sqs::Client as SqsClient;

#[derive(Debug, Clone)]
pub struct AwsClients {
    pub dynamodb: DynamoDbClient,
    pub eventbridge: EventBridgeClient,
    pub sqs: SqsClient,
    pub sns: SnsClient,
}

impl AwsClients {
    /// 環境から認証情報・リージョンを読み込んでクライアントを作成
    pub async fn load(max_attempts: u32) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::standard().with_max_attempts(max_attempts))
            .load()
            .await;
        Self::from_sdk_config(&config)
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self {
            dynamodb: DynamoDbClient::new(config),
            eventbridge: EventBridgeClient::new(config),
            sqs: SqsClient::new(config),
            sns: SnsClient::new(config),
        }
    }
}
