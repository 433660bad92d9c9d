pub mod http;
pub mod retry;

pub use http::{HttpBody, HttpCall, HttpDispatch};
pub use retry::RetryPolicy;
