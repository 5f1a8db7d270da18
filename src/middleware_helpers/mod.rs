pub mod error_log;
pub mod request_id;

pub use error_log::error_log_middleware;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
