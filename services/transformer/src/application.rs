// アプリケーション層モジュール
pub mod batch_handler;
pub mod custom_resource_handler;
pub mod dispatcher;
pub mod http_handler;
pub mod notification_handler;
pub mod record_processor;
pub mod replay;

// 再エクスポート
pub use batch_handler::BatchHandler;
pub use custom_resource_handler::CustomResourceHandler;
pub use dispatcher::{DispatchError, InvocationResponse, TriggerDispatcher};
pub use http_handler::{HttpHandler, error_response};
pub use notification_handler::NotificationHandler;
pub use record_processor::{ProcessError, RecordProcessor, received_at_now};
pub use replay::{REPLAY_REQUEST_ID, ReplayFailure, ReplayOutcome, replay};
