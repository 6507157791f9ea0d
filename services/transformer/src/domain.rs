// Domain layer modules
pub mod batch_response;
pub mod custom_resource;
pub mod failure;
pub mod http;
pub mod inbound_message;
pub mod transform_rules;
pub mod transformed_record;
pub mod trigger;

// Re-exports
pub use batch_response::{BatchItemFailure, BatchResponse};
pub use custom_resource::{
    CustomResourceRequest, CustomResourceResponse, RequestType, ResponseStatus,
};
pub use failure::FailureClass;
pub use http::{HttpRequest, HttpRequestError, HttpResponse};
pub use inbound_message::{DecodeMode, InboundMessage, MessageDecodeError, PayloadFormat};
pub use transform_rules::{TransformContext, TransformError, TransformRules};
pub use transformed_record::TransformedRecord;
pub use trigger::{Trigger, TriggerDecodeError, TriggerKind, UnknownTriggerKind};
