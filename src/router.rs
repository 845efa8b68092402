use crate::api::{self, AppState};
use crate::errors::ServerError;
use crate::responses::{attachment_response, error_to_response, static_response, ResultResp};
use astra::{Request, Response};

pub fn handle(req: Request, app: &AppState) -> ResultResp {
    let method = req.method().as_str();
    let path = req.uri().path();

    match (method, path) {
        ("GET", "/api/lists") => api::lists(&req, app),
        ("GET", "/api/status") => api::status(&req, app),
        ("GET", "/api/model") => api::model(&req, app),
        ("GET", "/rss") | ("GET", "/rss.xml") => api::rss(&req, app),
        ("GET", p) if is_backup_download(p, app) => {
            let backups = app.watcher.backups();
            let name = app.watcher.config().backup_download_name();
            attachment_response(&backups.gz_path(), &name, "application/gzip")
        }
        ("GET", p) if p.starts_with("/api/") => Err(ServerError::NotFound),
        ("GET", p) => static_response(&app.watcher.config().static_dir, p),
        _ => Err(ServerError::NotFound),
    }
}

/// Routes and renders errors; this is what the server calls per request.
pub fn serve(req: Request, app: &AppState) -> Response {
    let as_json = req.uri().path().starts_with("/api/");
    match handle(req, app) {
        Ok(resp) => resp,
        Err(err) => error_to_response(err, as_json),
    }
}

fn is_backup_download(path: &str, app: &AppState) -> bool {
    path.strip_prefix('/') == Some(app.watcher.config().backup_download_name().as_str())
}
