//! 基础设施：日志、HTTP 客户端

pub mod http;
pub mod logging;

pub use http::HttpClient;
pub use logging::{init_default_logging, init_logging};
