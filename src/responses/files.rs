// responses/files.rs
use crate::errors::ServerError;
use crate::responses::ResultResp;
use astra::{Body, ResponseBuilder};
use std::path::{Component, Path, PathBuf};

/// Return a file as a download.
pub fn attachment_response(path: &Path, filename: &str, content_type: &str) -> ResultResp {
    let buffer = read_existing(path)?;

    ResponseBuilder::new()
        .status(200)
        .header("Content-Type", content_type)
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(buffer))
        .map_err(|_| ServerError::InternalError)
}

/// Serve `request_path` from `root`. `/` maps to `index.html`; anything that
/// tries to leave `root` is treated as missing.
pub fn static_response(root: &Path, request_path: &str) -> ResultResp {
    let path = resolve_static(root, request_path).ok_or(ServerError::NotFound)?;
    if !path.is_file() {
        return Err(ServerError::NotFound);
    }
    let buffer = read_existing(&path)?;

    ResponseBuilder::new()
        .status(200)
        .header("Content-Type", content_type_for(&path))
        .body(Body::from(buffer))
        .map_err(|_| ServerError::InternalError)
}

pub fn resolve_static(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() || relative.ends_with('/') {
        format!("{relative}index.html")
    } else {
        relative.to_string()
    };

    let mut out = root.to_path_buf();
    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

pub fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let mime = match ext.as_str() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" | "mjs" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "json" | "webmanifest" => mime::APPLICATION_JSON,
        "svg" => mime::IMAGE_SVG,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "txt" => mime::TEXT_PLAIN_UTF_8,
        "xml" => mime::TEXT_XML,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        "ico" => return "image/x-icon".to_string(),
        "gz" => return "application/gzip".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM,
    };
    mime.to_string()
}

fn read_existing(path: &Path) -> Result<Vec<u8>, ServerError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ServerError::NotFound,
        _ => ServerError::Io(e.to_string()),
    })
}
