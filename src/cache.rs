// src/cache.rs
use astra::{Body, Request, ResponseBuilder};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::domain::{from_millis, http_date, Timestamp};
use crate::errors::ServerError;
use crate::responses::ResultResp;

/// Temp files older than this are leftovers from a crashed regeneration.
const ABANDONED_TMP_AFTER: Duration = Duration::from_secs(60);

/// One cacheable resource as served by the router.
pub struct Resource<'a> {
    /// File name inside the cache directory, e.g. `lists.json`.
    pub name: &'a str,
    pub content_type: &'a str,
    /// Cached output older than this is regenerated. `None` means any copy is fresh.
    pub basis: Option<Timestamp>,
    pub max_age: Duration,
}

/// Generated JSON / RSS kept on disk next to a gzip copy and its ETag.
pub struct ContentCache {
    dir: PathBuf,
}

enum Entry {
    OnDisk {
        body: PathBuf,
        gz: Option<PathBuf>,
        etag: String,
        modified: SystemTime,
    },
    /// Another request is regenerating and there is nothing on disk yet.
    InMemory {
        body: Vec<u8>,
        etag: String,
        modified: SystemTime,
    },
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Serves `resource`, regenerating it through `generate` when the cached
    /// copy is missing or older than its freshness basis.
    pub fn serve<F>(&self, req: &Request, resource: &Resource<'_>, generate: F) -> ResultResp
    where
        F: FnOnce() -> Result<Vec<u8>, ServerError>,
    {
        let entry = match self.fresh_entry(resource)? {
            Some(entry) => entry,
            None => self.regenerate(resource, generate)?,
        };
        respond(req, resource, entry)
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf, PathBuf) {
        (
            self.dir.join(name),
            self.dir.join(format!("{name}.gz")),
            self.dir.join(format!("{name}.etag")),
        )
    }

    /// A copy is fresh when the basis it was generated for is at least the
    /// requested one. The file's mtime says nothing about what it contains.
    fn fresh_entry(&self, resource: &Resource<'_>) -> Result<Option<Entry>, ServerError> {
        let (body, gz, etag_path) = self.paths(resource.name);

        let Some(modified) = modified_time(&body) else {
            return Ok(None);
        };
        let Some((etag, generated_for)) = read_sidecar(&etag_path) else {
            return Ok(None);
        };
        if let Some(basis) = resource.basis {
            if generated_for.map_or(true, |at| at < basis) {
                return Ok(None);
            }
        }

        Ok(Some(Entry::OnDisk {
            gz: fresh_gzip(&gz, modified),
            body,
            etag,
            modified,
        }))
    }

    fn regenerate<F>(&self, resource: &Resource<'_>, generate: F) -> Result<Entry, ServerError>
    where
        F: FnOnce() -> Result<Vec<u8>, ServerError>,
    {
        fs::create_dir_all(&self.dir)?;

        let (body_path, gz_path, etag_path) = self.paths(resource.name);
        let body_tmp = tmp_path(&body_path);
        let gz_tmp = tmp_path(&gz_path);
        let etag_tmp = tmp_path(&etag_path);

        clear_abandoned(&body_tmp);

        // Claim the regeneration; losing the race is fine.
        let mut claim = match OpenOptions::new().write(true).create_new(true).open(&body_tmp) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(name = resource.name, "regeneration in flight, not racing it");
                return self.fallback(resource, generate);
            }
            Err(e) => return Err(e.into()),
        };

        let written = (|| -> Result<(), ServerError> {
            let body = generate()?;
            let etag = etag_for(&body);

            claim.write_all(&body)?;
            claim.sync_all()?;
            drop(claim);
            fs::write(&gz_tmp, gzip(&body)?)?;
            fs::write(&etag_tmp, sidecar(&etag, resource.basis))?;

            fs::rename(&gz_tmp, &gz_path)?;
            fs::rename(&etag_tmp, &etag_path)?;
            fs::rename(&body_tmp, &body_path)?;
            Ok(())
        })();

        if let Err(e) = written {
            for tmp in [&body_tmp, &gz_tmp, &etag_tmp] {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }

        info!(name = resource.name, "regenerated cached content");
        self.fresh_entry(&Resource {
            basis: None,
            ..*resource
        })?
        .ok_or(ServerError::InternalError)
    }

    /// Stale copy if one exists, otherwise a one-shot generated body.
    fn fallback<F>(&self, resource: &Resource<'_>, generate: F) -> Result<Entry, ServerError>
    where
        F: FnOnce() -> Result<Vec<u8>, ServerError>,
    {
        if let Some(stale) = self.fresh_entry(&Resource {
            basis: None,
            ..*resource
        })? {
            return Ok(stale);
        }

        let body = generate()?;
        Ok(Entry::InMemory {
            etag: etag_for(&body),
            body,
            modified: SystemTime::now(),
        })
    }
}

fn respond(req: &Request, resource: &Resource<'_>, entry: Entry) -> ResultResp {
    let (etag, modified) = match &entry {
        Entry::OnDisk { etag, modified, .. } | Entry::InMemory { etag, modified, .. } => {
            (etag.clone(), *modified)
        }
    };
    let last_modified = http_date(DateTime::<Utc>::from(modified));

    let builder = ResponseBuilder::new()
        .header("ETag", etag.as_str())
        .header("Last-Modified", last_modified)
        .header(
            "Cache-Control",
            format!("public, max-age={}", resource.max_age.as_secs()),
        )
        .header("Vary", "Accept-Encoding");

    if not_modified(req, &etag, modified) {
        return builder
            .status(304)
            .body(Body::empty())
            .map_err(|_| ServerError::InternalError);
    }

    let builder = builder
        .status(200)
        .header("Content-Type", resource.content_type);

    let (builder, body) = match entry {
        Entry::OnDisk { gz: Some(gz), .. } if accepts_gzip(req) => {
            (builder.header("Content-Encoding", "gzip"), fs::read(gz)?)
        }
        Entry::OnDisk { body, .. } => (builder, fs::read(body)?),
        Entry::InMemory { body, .. } => (builder, body),
    };

    builder
        .body(Body::from(body))
        .map_err(|_| ServerError::InternalError)
}

/// `If-None-Match` wins when present; otherwise `If-Modified-Since` with a
/// one second tolerance for the header's coarser resolution.
fn not_modified(req: &Request, etag: &str, modified: SystemTime) -> bool {
    if let Some(inm) = header_str(req, "If-None-Match") {
        return inm.split(',').map(str::trim).any(|t| t == etag || t == "*");
    }

    let Some(since) = header_str(req, "If-Modified-Since")
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
    else {
        return false;
    };
    let modified = DateTime::<Utc>::from(modified);
    modified.timestamp() <= since.timestamp() + 1
}

fn accepts_gzip(req: &Request) -> bool {
    let Some(accept) = header_str(req, "Accept-Encoding") else {
        return false;
    };
    accept.split(',').any(|part| {
        let mut pieces = part.split(';').map(str::trim);
        let coding = pieces.next().unwrap_or("");
        let refused = pieces.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        (coding.eq_ignore_ascii_case("gzip") || coding == "*") && !refused
    })
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// `.etag` file: the ETag, then the basis the body was generated for
/// (milliseconds, empty when there was none).
fn sidecar(etag: &str, basis: Option<Timestamp>) -> String {
    let basis = basis.map(|b| b.timestamp_millis().to_string()).unwrap_or_default();
    format!("{etag}\n{basis}")
}

fn read_sidecar(path: &Path) -> Option<(String, Option<Timestamp>)> {
    let raw = fs::read_to_string(path).ok()?;
    let mut lines = raw.lines();
    let etag = lines.next().filter(|e| !e.is_empty())?.to_string();
    let basis = lines
        .next()
        .and_then(|ms| ms.trim().parse::<i64>().ok())
        .map(from_millis);
    Some((etag, basis))
}

/// Strong ETag over the uncompressed body.
pub fn etag_for(body: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(body)))
}

pub fn gzip(body: &[u8]) -> Result<Vec<u8>, ServerError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// The gzip copy is only used when it is at least as new as the body.
fn fresh_gzip(gz: &Path, body_modified: SystemTime) -> Option<PathBuf> {
    let gz_modified = modified_time(gz)?;
    (gz_modified >= body_modified).then(|| gz.to_path_buf())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn clear_abandoned(tmp: &Path) {
    let Some(modified) = modified_time(tmp) else {
        return;
    };
    let age = SystemTime::now().duration_since(modified).unwrap_or_default();
    if age > ABANDONED_TMP_AFTER {
        warn!(path = %tmp.display(), "removing abandoned cache temp file");
        let _ = fs::remove_file(tmp);
    }
}
