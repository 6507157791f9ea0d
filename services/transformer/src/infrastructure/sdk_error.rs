/// AWS SDKエラーの分類
///
/// 下流呼び出しの失敗を「再試行で回復しうる（Transient）」か
/// 「再試行しても同じ結果になる（Permanent）」かに分類する。
/// バッチ応答・HTTPステータス・非同期呼び出しのエラー伝播はすべてこの分類だけを見る。
use std::error::Error as StdError;
use std::fmt::Debug;

use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

use crate::domain::FailureClass;

/// 再試行で回復しうるエラーコード（スロットリング・サーバー側障害）
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "ProvisionedThroughputExceededException",
    "TransactionConflictException",
    "KMSThrottlingException",
    "SlowDown",
    "RequestTimeout",
    "RequestTimeoutException",
    "InternalError",
    "InternalFailure",
    "InternalServerError",
    "InternalServiceError",
    "InternalException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
];

/// 条件付き書き込みの競合
const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";

/// 下流呼び出しのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DownstreamError {
    /// 一時的な失敗（ネットワーク・タイムアウト・スロットリング・5xx）
    #[error("transient downstream failure ({code}): {message}")]
    Transient { code: String, message: String },

    /// 恒久的な失敗（権限不足・リソースなし・入力不正）
    #[error("permanent downstream failure ({code}): {message}")]
    Permanent { code: String, message: String },

    /// 同じIDのレコードが既に存在する
    #[error("record already exists: {0}")]
    AlreadyExists(String),
}

impl DownstreamError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        DownstreamError::Transient {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        DownstreamError::Permanent {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            DownstreamError::Transient { .. } => FailureClass::Transient,
            DownstreamError::Permanent { .. } | DownstreamError::AlreadyExists(_) => {
                FailureClass::Permanent
            }
        }
    }

    /// エラーコード（エラーテーブル・HTTPレスポンス用）
    pub fn code(&self) -> &str {
        match self {
            DownstreamError::Transient { code, .. } | DownstreamError::Permanent { code, .. } => {
                code
            }
            DownstreamError::AlreadyExists(_) => "AlreadyExists",
        }
    }
}

/// サービスが返したエラーコードを分類
pub fn classify_code(code: &str, message: impl Into<String>) -> DownstreamError {
    let message = message.into();
    if code == CONDITIONAL_CHECK_FAILED {
        DownstreamError::AlreadyExists(message)
    } else if TRANSIENT_CODES.contains(&code) {
        DownstreamError::transient(code, message)
    } else {
        DownstreamError::permanent(code, message)
    }
}

/// SDK呼び出しのエラーを分類
///
/// 応答が得られなかった失敗（タイムアウト・接続失敗・応答の解釈失敗）は一時的とみなす。
/// リクエストを組み立てられなかった場合は何度試しても同じなので恒久的とする。
pub fn classify<E, R>(error: SdkError<E, R>) -> DownstreamError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + 'static,
{
    let message = DisplayErrorContext(&error).to_string();

    match &error {
        SdkError::ServiceError(service) => {
            let err = service.err();
            let code = err.code().unwrap_or("Unknown");
            classify_code(code, err.message().unwrap_or(&message))
        }
        SdkError::ConstructionFailure(_) => {
            DownstreamError::permanent("ConstructionFailure", message)
        }
        SdkError::TimeoutError(_) => DownstreamError::transient("Timeout", message),
        SdkError::DispatchFailure(_) => DownstreamError::transient("DispatchFailure", message),
        SdkError::ResponseError(_) => DownstreamError::transient("ResponseError", message),
        _ => DownstreamError::transient("Unknown", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::error::ErrorMetadata;
    use aws_sdk_dynamodb::operation::put_item::PutItemError;

    fn service_error(code: &str) -> SdkError<PutItemError, ()> {
        let err = PutItemError::generic(
            ErrorMetadata::builder()
                .code(code)
                .message("service says no")
                .build(),
        );
        SdkError::service_error(err, ())
    }

    #[test]
    fn test_throttling_is_transient() {
        for code in [
            "ProvisionedThroughputExceededException",
            "ThrottlingException",
            "InternalServerError",
            "ServiceUnavailable",
        ] {
            let error = classify(service_error(code));
            assert_eq!(error.class(), FailureClass::Transient, "{}", code);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for code in [
            "AccessDeniedException",
            "ResourceNotFoundException",
            "ValidationException",
        ] {
            let error = classify(service_error(code));
            assert_eq!(error.class(), FailureClass::Permanent, "{}", code);
        }
    }

    #[test]
    fn test_conditional_check_failed_is_already_exists() {
        let error = classify(service_error("ConditionalCheckFailedException"));
        assert_eq!(
            error,
            DownstreamError::AlreadyExists("service says no".to_string())
        );
        assert_eq!(error.class(), FailureClass::Permanent);
    }

    #[test]
    fn test_timeout_is_transient() {
        let error: SdkError<PutItemError, ()> = SdkError::timeout_error("operation timed out");
        let classified = classify(error);
        assert_eq!(classified.class(), FailureClass::Transient);
        assert_eq!(classified.code(), "Timeout");
    }

    #[test]
    fn test_construction_failure_is_permanent() {
        let error: SdkError<PutItemError, ()> =
            SdkError::construction_failure("missing required field");
        assert_eq!(classify(error).class(), FailureClass::Permanent);
    }

    #[test]
    fn test_classify_code_for_entry_errors() {
        assert_eq!(
            classify_code("ThrottlingException", "slow down").class(),
            FailureClass::Transient
        );
        assert_eq!(
            classify_code("AccessDeniedException", "nope").class(),
            FailureClass::Permanent
        );
    }
}
