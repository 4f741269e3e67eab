use bytes::Bytes;
use futures::TryStreamExt;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use tokio_util::io::StreamReader;

use storage_core::path::{leaf_name, normalize_directory, parse};
use storage_core::{FileShareStore, StorageEntry};

use super::form::{content_type_for, query_param, read_form, UploadForm, UploadedField};
use super::{responses, templates, BoxError, HttpBody};

#[derive(Serialize)]
pub struct FileListing {
    pub directory: String,
    pub entries: Vec<StorageEntry>,
    pub count: usize,
}

fn listing_location(path: &str) -> String {
    let directory = parse(path).directory_name;
    if directory.is_empty() {
        "/files".to_string()
    } else {
        format!("/files?dir={}", urlencoding::encode(&directory))
    }
}

pub async fn list<B>(store: &FileShareStore, req: &Request<B>, wants_html: bool) -> Response<HttpBody> {
    let directory = query_param(req.uri().query(), "dir").unwrap_or_default();
    let directory = normalize_directory(&directory).to_string();

    match store.list_files(&directory, true).await {
        Ok(entries) => {
            let listing = FileListing {
                directory,
                count: entries.len(),
                entries,
            };
            if wants_html {
                responses::html_response(StatusCode::OK, templates::files_page(&listing))
            } else {
                responses::json_response(StatusCode::OK, &listing)
            }
        }
        Err(e) => responses::storage_error(&e, wants_html),
    }
}

pub async fn download<B>(store: &FileShareStore, req: &Request<B>, wants_html: bool) -> Response<HttpBody> {
    let Some(path) = query_param(req.uri().query(), "name").filter(|n| !n.is_empty()) else {
        return responses::bad_request("Missing file name", wants_html);
    };

    match store.download(&path).await {
        Ok(content) => responses::attachment(content, leaf_name(&path), &content_type_for(&path)),
        Err(e) => responses::storage_error(&e, wants_html),
    }
}

pub async fn delete<B>(store: &FileShareStore, req: Request<B>, wants_html: bool) -> Response<HttpBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let from_query = query_param(req.uri().query(), "name");
    let form = match read_form(req).await {
        Ok(form) => form,
        Err(e) => return responses::bad_request(&format!("Invalid form: {e}"), wants_html),
    };
    let Some(path) = form.get("name").cloned().or(from_query) else {
        return responses::bad_request("Missing file name", wants_html);
    };

    match store.delete(&path).await {
        Ok(()) if wants_html => responses::redirect(&listing_location(&path)),
        Ok(()) => responses::json_response(StatusCode::OK, &serde_json::json!({ "deleted": path })),
        Err(e) => responses::storage_error(&e, wants_html),
    }
}

pub async fn upload<B>(store: &FileShareStore, req: Request<B>, wants_html: bool) -> Response<HttpBody>
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
        match store.upload(&mut reader, &target).await {
            Ok(file) => uploaded.push(file),
            Err(e) => return responses::storage_error(&e, wants_html),
        }
    }

    let Some(first) = uploaded.first() else {
        return responses::bad_request("No file was uploaded", wants_html);
    };

    if wants_html {
        responses::redirect(&listing_location(&first.path))
    } else {
        responses::json_response(StatusCode::CREATED, &uploaded)
    }
}
