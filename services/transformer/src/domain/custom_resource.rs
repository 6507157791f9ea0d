/// CloudFormationカスタムリソースのリクエスト・レスポンス
///
/// 完了通知は署名付き`ResponseURL`へのPUTで行う。送信処理は
/// `infrastructure::custom_resource_responder`が担当する。
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// リクエスト種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Create => "Create",
            RequestType::Update => "Update",
            RequestType::Delete => "Delete",
        }
    }
}

/// カスタムリソースのリクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceRequest {
    pub request_type: RequestType,
    /// 完了通知の送信先（署名付きS3 URL）
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    pub logical_resource_id: String,
    /// Update/Deleteでのみ渡される
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default)]
    pub old_resource_properties: Option<Value>,
}

impl CustomResourceRequest {
    /// スタックIDのARNからスタック名を取り出す
    ///
    /// `arn:aws:cloudformation:<region>:<account>:stack/<name>/<guid>`
    pub fn stack_name(&self) -> &str {
        self.stack_id
            .split('/')
            .nth(1)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.stack_id)
    }

    /// 応答に使う物理リソースID
    ///
    /// 既存のIDがあればそれを引き継ぎ、なければ
    /// `{スタック名}_{論理ID}_{suffix}`を生成する。
    pub fn physical_resource_id(&self, suffix: &str) -> String {
        match &self.physical_resource_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!(
                "{}_{}_{}",
                self.stack_name(),
                self.logical_resource_id,
                suffix
            ),
        }
    }

    /// `ResourceProperties.Records`（投入するメッセージ一覧）
    pub fn seed_records(&self) -> Vec<Value> {
        self.resource_properties
            .get("Records")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

/// 応答ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// カスタムリソースの応答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_echo: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl CustomResourceResponse {
    /// 成功応答
    pub fn success(
        request: &CustomResourceRequest,
        physical_resource_id: String,
        data: Map<String, Value>,
    ) -> Self {
        Self::build(request, ResponseStatus::Success, String::new(), physical_resource_id, data)
    }

    /// 失敗応答
    ///
    /// 長すぎる理由は末尾だけを残して切り詰める。
    pub fn failed(
        request: &CustomResourceRequest,
        physical_resource_id: String,
        reason: impl Into<String>,
    ) -> Self {
        Self::build(
            request,
            ResponseStatus::Failed,
            truncate_reason(reason.into()),
            physical_resource_id,
            Map::new(),
        )
    }

    fn build(
        request: &CustomResourceRequest,
        status: ResponseStatus,
        reason: String,
        physical_resource_id: String,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            status,
            reason,
            physical_resource_id,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            no_echo: false,
            data,
        }
    }
}

/// 失敗理由の最大文字数
const MAX_REASON_CHARS: usize = 256;

/// 切り詰め時に残す末尾の文字数
const REASON_TAIL_CHARS: usize = 240;

/// 失敗理由を切り詰める（例外メッセージは末尾に原因が来ることが多い）
fn truncate_reason(reason: String) -> String {
    let len = reason.chars().count();
    if len <= MAX_REASON_CHARS {
        return reason;
    }

    let tail: String = reason.chars().skip(len - REASON_TAIL_CHARS).collect();
    format!("ERROR: (truncated) {}", tail)
}
