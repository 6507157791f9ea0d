/// CloudFormationカスタムリソースのハンドラー
///
/// Create/Updateでは`ResourceProperties.Records`を通常のメッセージと同じ変換・送信経路で投入する。
/// 結果は成否にかかわらず署名付きURLへ送信し、送信できなかった場合のみ呼び出しエラーとする
/// （応答がないとスタック操作がタイムアウトまで待たされるため）。
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, json};
use tracing::{info, warn};

use super::record_processor::{RecordProcessor, received_at_now};
use crate::domain::{
    CustomResourceRequest, CustomResourceResponse, InboundMessage, RequestType, TransformContext,
    TriggerKind,
};
use crate::infrastructure::{CustomResourceResponder, ResponderError};

/// 物理リソースIDの乱数部分の長さ
const PHYSICAL_ID_SUFFIX_LEN: usize = 8;

/// 応答送信のために残しておく時間
const RESPONSE_MARGIN: Duration = Duration::from_millis(500);

/// 期限切れ時の失敗理由
const TIMED_OUT_REASON: &str = "Execution timed out";

pub struct CustomResourceHandler {
    processor: Arc<RecordProcessor>,
    responder: Arc<dyn CustomResourceResponder>,
}

impl CustomResourceHandler {
    pub fn new(processor: Arc<RecordProcessor>, responder: Arc<dyn CustomResourceResponder>) -> Self {
        Self {
            processor,
            responder,
        }
    }

    /// リクエストを処理して応答を送信する
    ///
    /// `deadline_ms`（Lambdaの実行期限、エポックミリ秒）が与えられた場合、
    /// 期限の少し前に投入を打ち切ってFAILEDを送信する。
    pub async fn handle(
        &self,
        request: CustomResourceRequest,
        deadline_ms: Option<u64>,
    ) -> Result<CustomResourceResponse, ResponderError> {
        let physical_resource_id = request.physical_resource_id(&random_suffix());

        info!(
            request_type = request.request_type.as_str(),
            logical_resource_id = %request.logical_resource_id,
            physical_resource_id = %physical_resource_id,
            "カスタムリソースリクエストを受信"
        );

        let outcome = match request.request_type {
            RequestType::Delete => Ok(0),
            RequestType::Create | RequestType::Update => {
                let seeding = self.seed(&request, &physical_resource_id);
                match deadline_ms {
                    Some(deadline_ms) => {
                        let budget = remaining_budget(deadline_ms, Utc::now().timestamp_millis());
                        tokio::time::timeout(budget, seeding)
                            .await
                            .unwrap_or_else(|_| Err(TIMED_OUT_REASON.to_string()))
                    }
                    None => seeding.await,
                }
            }
        };

        let response = match outcome {
            Ok(count) => {
                let mut data = Map::new();
                data.insert("RecordCount".to_string(), json!(count));
                CustomResourceResponse::success(&request, physical_resource_id, data)
            }
            Err(reason) => {
                warn!(reason = %reason, "カスタムリソース処理に失敗");
                CustomResourceResponse::failed(&request, physical_resource_id, reason)
            }
        };

        self.responder.send(&request.response_url, &response).await?;
        Ok(response)
    }

    /// 初期レコードを投入する
    ///
    /// 既に存在するレコードは投入済みとして数える（Updateでの再投入）。
    async fn seed(
        &self,
        request: &CustomResourceRequest,
        physical_resource_id: &str,
    ) -> Result<usize, String> {
        let records = request.seed_records();

        for (index, value) in records.iter().enumerate() {
            let fallback_id = format!("{}-{}", physical_resource_id, index);
            let context =
                TransformContext::new(fallback_id, TriggerKind::CustomResource, received_at_now());

            let result = self
                .processor
                .process_decoded(InboundMessage::from_value(value.clone()), &context)
                .await;

            match result {
                Ok(_) => {}
                Err(error) if error.is_duplicate() => {}
                Err(error) => return Err(format!("record {}: {}", index, error)),
            }
        }

        Ok(records.len())
    }
}

/// 期限までの残り時間から応答用の余裕を引いた時間
fn remaining_budget(deadline_ms: u64, now_ms: i64) -> Duration {
    let now_ms = u64::try_from(now_ms).unwrap_or_default();
    Duration::from_millis(deadline_ms.saturating_sub(now_ms)).saturating_sub(RESPONSE_MARGIN)
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(PHYSICAL_ID_SUFFIX_LEN)
        .collect()
}
