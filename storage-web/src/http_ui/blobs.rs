use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use tokio_util::io::StreamReader;
use tracing::debug;

use storage_core::path::{leaf_name, parse};
use storage_core::{BlobStore, StorageEntry};

use super::archive::{archive_entry_name, archive_file_name, ArchiveBuilder, ArchiveError};
use super::form::{content_type_for, query_flag, query_param, read_form, UploadForm, UploadedField};
use super::{responses, templates, BoxError, HttpBody};

#[derive(Serialize)]
pub struct BlobListing {
    pub prefix: String,
    pub flat: bool,
    pub entries: Vec<StorageEntry>,
    pub count: usize,
}

fn listing_location(name: &str) -> String {
    let directory = parse(name).directory_name;
    if directory.is_empty() {
        "/blobs".to_string()
    } else {
        format!("/blobs?prefix={}", urlencoding::encode(&format!("{directory}/")))
    }
}

pub async fn list<B>(store: &BlobStore, req: &Request<B>, wants_html: bool) -> Response<HttpBody> {
    let query = req.uri().query();
    let prefix = query_param(query, "prefix").unwrap_or_default();
    let flat = query_flag(query, "flat");
    let limit = query_param(query, "limit").and_then(|l| l.parse().ok());

    match store.list_files(Some(&prefix), flat, limit).await {
        Ok(entries) => {
            let listing = BlobListing {
                prefix,
                flat,
                count: entries.len(),
                entries,
            };
            if wants_html {
                responses::html_response(StatusCode::OK, templates::blobs_page(&listing))
            } else {
                responses::json_response(StatusCode::OK, &listing)
            }
        }
        Err(e) => responses::storage_error(&e, wants_html),
    }
}

pub async fn download<B>(store: &BlobStore, req: &Request<B>, wants_html: bool) -> Response<HttpBody> {
    let Some(name) = query_param(req.uri().query(), "name").filter(|n| !n.is_empty()) else {
        return responses::bad_request("Missing blob name", wants_html);
    };

    match store.download(&name, true).await {
        Ok(Some(content)) => {
            responses::attachment(content, leaf_name(&name), &content_type_for(&name))
        }
        Ok(None) => responses::error_response(StatusCode::NOT_FOUND, "Blob not found", wants_html),
        Err(e) => responses::storage_error(&e, wants_html),
    }
}

pub async fn delete<B>(store: &BlobStore, req: Request<B>, wants_html: bool) -> Response<HttpBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let from_query = query_param(req.uri().query(), "name");
    let form = match read_form(req).await {
        Ok(form) => form,
        Err(e) => return responses::bad_request(&format!("Invalid form: {e}"), wants_html),
    };
    let Some(name) = form.get("name").cloned().or(from_query) else {
        return responses::bad_request("Missing blob name", wants_html);
    };

    match store.delete(&name).await {
        Ok(()) if wants_html => responses::redirect(&listing_location(&name)),
        Ok(()) => responses::json_response(StatusCode::OK, &serde_json::json!({ "deleted": name })),
        Err(e) => responses::storage_error(&e, wants_html),
    }
}

/// Stores every posted file under the form's `directory`.
pub async fn upload<B>(store: &BlobStore, req: Request<B>, wants_html: bool) -> Response<HttpBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send + 'static,
{
    let Some(mut form) = UploadForm::from_request(req) else {
        return responses::bad_request("Expected a multipart/form-data body", wants_html);
    };

    let mut uploaded = Vec::new();
    loop {
        let next = match form.next_file().await {
            Ok(next) => next,
            Err(e) => return responses::bad_request(&format!("Invalid upload: {e}"), wants_html),
        };
        let Some(UploadedField { target, field }) = next else {
            break;
        };

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        let mut reader = std::pin::pin!(reader);
        match store.upload(&target, &mut reader, None).await {
            Ok(handle) => uploaded.push(handle),
            Err(e) => return responses::storage_error(&e, wants_html),
        }
    }

    let Some(first) = uploaded.first() else {
        return responses::bad_request("No file was uploaded", wants_html);
    };
    debug!(count = uploaded.len(), "upload form processed");

    if wants_html {
        responses::redirect(&listing_location(&first.name))
    } else {
        responses::json_response(StatusCode::CREATED, &uploaded)
    }
}

fn archive_error(err: ArchiveError, wants_html: bool) -> Response<HttpBody> {
    match err {
        ArchiveError::TooLarge { .. } => {
            responses::error_response(StatusCode::PAYLOAD_TOO_LARGE, &err.to_string(), wants_html)
        }
        ArchiveError::Zip(_) => responses::error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to build archive: {err}"),
            wants_html,
        ),
    }
}

/// Bundles every blob under `prefix` into a zip download of at most
/// `max_bytes` uncompressed content.
pub async fn zip<B>(
    store: &BlobStore,
    req: &Request<B>,
    max_bytes: u64,
    wants_html: bool,
) -> Response<HttpBody> {
    let prefix = query_param(req.uri().query(), "prefix").unwrap_or_default();

    let entries = match store.list_files(Some(&prefix), true, None).await {
        Ok(entries) => entries,
        Err(e) => return responses::storage_error(&e, wants_html),
    };
    let files: Vec<_> = entries.iter().filter(|e| !e.is_directory).collect();
    let listed: u64 = files.iter().filter_map(|e| e.size).sum();
    if listed > max_bytes {
        return archive_error(ArchiveError::TooLarge { limit: max_bytes }, wants_html);
    }

    let mut archive = ArchiveBuilder::new(max_bytes);
    for entry in files {
        let mut content = match store.download(&entry.name, false).await {
            Ok(Some(content)) => content,
            // removed since it was listed
            Ok(None) => continue,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return responses::storage_error(&e, wants_html),
        };
        if let Err(e) = archive.start_entry(archive_entry_name(&entry.name, &prefix)) {
            return archive_error(e, wants_html);
        }
        while let Some(chunk) = content.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return responses::storage_error(&e, wants_html),
            };
            if let Err(e) = archive.write(&chunk) {
                return archive_error(e, wants_html);
            }
        }
    }

    if archive.is_empty() {
        return responses::error_response(
            StatusCode::NOT_FOUND,
            "No blobs found under this prefix",
            wants_html,
        );
    }

    match archive.finish() {
        Ok(archive) => {
            responses::bytes_attachment(archive, &archive_file_name(&prefix), "application/zip")
        }
        Err(e) => archive_error(e, wants_html),
    }
}
