/// イベント変換Lambda関数
///
/// HTTP / SQS / SNS / EventBridge / Kinesis / DynamoDB Streams / CloudFormationカスタムリソースの
/// いずれのトリガーからも呼び出せる単一のエントリポイント。
///
/// # 環境変数
/// - DESTINATION: 送信先の種別（`table` / `event_bus` / `queue` / `topic`、必須）
/// - TABLE_NAME / EVENT_BUS_NAME / QUEUE_URL / TOPIC_ARN: 送信先ごとのリソース
/// - ERROR_TABLE_NAME: 恒久的な失敗の記録先（任意）
/// - AGGREGATE_TABLE_NAME: 種別ごとの集計先（任意）
/// - DOWNSTREAM_MAX_ATTEMPTS: SDK内部の最大試行回数（デフォルト: 1）
/// - ALLOWED_ORIGIN: HTTPレスポンスのCORSオリジン（デフォルト: *）
use lambda_runtime::{Error, LambdaEvent, service_fn};
use serde_json::Value;
use tracing::{error, info};
use transformer::application::{InvocationResponse, TriggerDispatcher};
use transformer::infrastructure::{AwsClients, TransformerConfig, init_logging};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    // 設定の誤りは初期化エラーとして即座に失敗させる
    let config = TransformerConfig::from_env().map_err(|e| {
        error!(error = %e, "設定読み込み失敗");
        Error::from(e.to_string())
    })?;

    // SDKクライアントは実行環境ごとに一度だけ作成する
    let clients = AwsClients::load(config.downstream_max_attempts).await;

    let dispatcher = TriggerDispatcher::from_config(&config, &clients).map_err(|e| {
        error!(error = %e, "ディスパッチャ初期化失敗");
        Error::from(e.to_string())
    })?;

    info!(destination = config.destination.kind(), "Lambda関数を起動");

    let dispatcher_ref = &dispatcher;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handler(dispatcher_ref, event).await
    }))
    .await?;

    Ok(())
}

/// Lambda関数のメインハンドラー
///
/// 呼び出しエラーはSNS / EventBridge / カスタムリソースの失敗時、
/// またはイベントを解釈できなかった場合のみ返す。
async fn handler(
    dispatcher: &TriggerDispatcher,
    event: LambdaEvent<Value>,
) -> Result<InvocationResponse, Error> {
    dispatcher.dispatch(event).await.map_err(|e| {
        error!(error = %e, "呼び出しに失敗");
        Error::from(e)
    })
}
