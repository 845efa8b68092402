use crate::errors::ServerError;
use astra::{Body, Response, ResponseBuilder};
use tracing::error;

pub type ResultResp = Result<Response, ServerError>;

/// Convert a ServerError into a response. API paths get a JSON body,
/// everything else plain text.
pub fn error_to_response(err: ServerError, as_json: bool) -> Response {
    let status = err.status_code();
    if status >= 500 {
        error!("request failed: {err}");
    }

    let message = match &err {
        ServerError::NotFound => "Not Found".to_string(),
        ServerError::BadRequest(msg) => msg.clone(),
        // Internals stay in the log.
        _ => "Internal Server Error".to_string(),
    };

    if as_json {
        json_error_response(status, &message)
    } else {
        text_error_response(status, &message)
    }
}

pub fn json_error_response(status: u16, message: &str) -> Response {
    let body = serde_json::json!({ "error": message }).to_string();

    ResponseBuilder::new()
        .status(status)
        .header("Content-Type", "application/json; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")))
}

pub fn text_error_response(status: u16, message: &str) -> Response {
    ResponseBuilder::new()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Body::from(format!("{status} {message}")))
        .unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")))
}
