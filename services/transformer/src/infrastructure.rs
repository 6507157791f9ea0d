// Infrastructure layer modules
pub mod aggregate_counter;
pub mod aws_clients;
pub mod config;
pub mod custom_resource_responder;
pub mod destination;
pub mod dynamo_record_store;
pub mod eventbridge_publisher;
pub mod failure_recorder;
pub mod logging;
pub mod metrics;
pub mod sdk_error;
pub mod sns_publisher;
pub mod sqs_publisher;

// Re-exports
pub use aggregate_counter::{AggregateCounter, DynamoAggregateCounter};
pub use aws_clients::AwsClients;
pub use config::{ConfigError, DestinationConfig, TransformerConfig};
pub use custom_resource_responder::{
    CustomResourceResponder, HttpCustomResourceResponder, ResponderError,
};
pub use destination::{Delivery, Destination, build_destination};
pub use dynamo_record_store::DynamoRecordStore;
pub use eventbridge_publisher::EventBridgePublisher;
pub use failure_recorder::{DynamoFailureRecorder, FailureEntry, FailureRecorder};
pub use logging::{init_cli_logging, init_logging};
pub use metrics::{BatchMetrics, METRICS_NAMESPACE};
pub use sdk_error::{DownstreamError, classify, classify_code};
pub use sns_publisher::SnsPublisher;
pub use sqs_publisher::SqsPublisher;
