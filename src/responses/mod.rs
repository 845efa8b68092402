pub mod errors;
pub mod files;
pub mod json;

pub use errors::{error_to_response, ResultResp};
pub use files::{attachment_response, static_response};
pub use json::json_response;
