/// 保存したトリガーイベントをローカルで再生するCLI
///
/// 下流サービスは呼び出さず、デコードと変換の結果だけを1行1件のJSONで標準出力に書く。
/// 変換ルールは本番と同じ環境変数（REQUIRED_FIELDS, ALLOWED_MESSAGE_TYPES など）から読み込む。
///
/// # 実行例
/// ```bash
/// # 種別を自動判定
/// cargo run --bin replay -- --event events/sqs.json
///
/// # 種別を指定
/// REQUIRED_FIELDS=id cargo run --bin replay -- --event events/order.json --kind eventbridge
/// ```
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use transformer::application::{ReplayOutcome, received_at_now, replay};
use transformer::domain::{Trigger, TriggerDecodeError, TriggerKind};
use transformer::infrastructure::config::rules_from_env;
use transformer::infrastructure::init_cli_logging;

/// コマンドライン引数
#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "保存したトリガーイベントを下流呼び出しなしで変換")]
struct CliArgs {
    /// イベントJSONファイル
    #[arg(long, short = 'e')]
    event: PathBuf,

    /// トリガー種別（省略時は自動判定）
    /// http, sqs, sns, eventbridge, kinesis, dynamodb, custom_resource
    #[arg(long, short = 'k')]
    kind: Option<TriggerKind>,
}

/// 再生処理のエラー
#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Trigger(#[from] TriggerDecodeError),

    #[error("failed to serialize outcome: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn main() -> ExitCode {
    init_cli_logging();

    let args = CliArgs::parse();

    match run(&args) {
        Ok(outcomes) if outcomes.iter().all(ReplayOutcome::is_success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "再生に失敗");
            ExitCode::from(2)
        }
    }
}

fn run(args: &CliArgs) -> Result<Vec<ReplayOutcome>, ReplayError> {
    let event = load_event(&args.event)?;
    let trigger = decode(event, args.kind)?;

    info!(trigger = %trigger.kind(), "イベントを再生");

    let outcomes = replay(trigger, &rules_from_env(), &received_at_now());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for outcome in &outcomes {
        writeln!(out, "{}", serde_json::to_string(outcome)?)?;
    }

    Ok(outcomes)
}

/// イベントファイルを読み込む
fn load_event(path: &Path) -> Result<Value, ReplayError> {
    let content = std::fs::read_to_string(path).map_err(|e| ReplayError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ReplayError::Json {
        path: path.display().to_string(),
        source: e,
    })
}

fn decode(event: Value, kind: Option<TriggerKind>) -> Result<Trigger, TriggerDecodeError> {
    match kind {
        Some(kind) => Trigger::decode_as(kind, event),
        None => Trigger::decode(event),
    }
}
