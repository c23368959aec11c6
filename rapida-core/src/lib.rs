pub mod async_logger;
pub mod callback;
pub mod config;
pub mod error;
pub mod facade;
pub mod feedback;
pub mod headers;
pub mod http_client;
pub mod log_record;
pub mod proxy;
pub mod runs;
pub mod telemetry;
pub mod timing;

pub use async_logger::{AsyncLogger, Provider};
pub use callback::{Callbacks, ResponseHook};
pub use config::RapidaConfig;
pub use error::{CoreResult, RapidaError};
pub use facade::RapidaLogger;
pub use feedback::{FeedbackClient, FeedbackDataType, Rating};
pub use http_client::DeliveredResponse;
pub use log_record::{LogBuilder, LogRecord};
pub use proxy::{ProxyMeta, RapidaProxy};
pub use runs::{Job, JobConfig, Node, NodeConfig, RunStatus, RunsClient};
