use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use storage_core::{ByteStream, StorageError};

use super::{templates, BoxError, HttpBody};

pub fn map_response(response: Response<Full<Bytes>>) -> Response<HttpBody> {
    let (parts, body) = response.into_parts();
    let body = body.map_err(|never| -> BoxError { match never {} }).boxed_unsync();
    Response::from_parts(parts, body)
}

pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<HttpBody> {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    let resp = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap();
    map_response(resp)
}

pub fn html_response(status: StatusCode, html: String) -> Response<HttpBody> {
    let resp = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .unwrap();
    map_response(resp)
}

pub fn error_response(status: StatusCode, message: &str, wants_html: bool) -> Response<HttpBody> {
    if wants_html {
        html_response(status, templates::error_page(message))
    } else {
        let error = serde_json::json!({
            "error": message,
            "status": status.as_u16()
        });
        json_response(status, &error)
    }
}

pub fn not_found(wants_html: bool) -> Response<HttpBody> {
    error_response(StatusCode::NOT_FOUND, "Not Found", wants_html)
}

pub fn bad_request(message: &str, wants_html: bool) -> Response<HttpBody> {
    error_response(StatusCode::BAD_REQUEST, message, wants_html)
}

pub fn status_for(err: &StorageError) -> StatusCode {
    match err {
        StorageError::InvalidName(_) => StatusCode::BAD_REQUEST,
        StorageError::DirectoryNotFound(_)
        | StorageError::FileNotFound(_)
        | StorageError::BlobNotFound(_) => StatusCode::NOT_FOUND,
        StorageError::StoreUnavailable { .. } | StorageError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn storage_error(err: &StorageError, wants_html: bool) -> Response<HttpBody> {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::warn!(error = %err, "storage request failed");
    }
    error_response(status, &err.to_string(), wants_html)
}

pub fn redirect(location: &str) -> Response<HttpBody> {
    let resp = Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .body(Full::new(Bytes::new()))
        .unwrap();
    map_response(resp)
}

/// Streams `content` as a file attachment.
pub fn attachment(content: ByteStream, file_name: &str, content_type: &str) -> Response<HttpBody> {
    let body = StreamBody::new(
        content
            .map_ok(Frame::data)
            .map_err(|err| -> BoxError { Box::new(err) }),
    )
    .boxed_unsync();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(file_name))
        .body(body)
        .unwrap()
}

/// In-memory attachment, used for generated archives.
pub fn bytes_attachment(content: Vec<u8>, file_name: &str, content_type: &str) -> Response<HttpBody> {
    let resp = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(file_name))
        .body(Full::new(Bytes::from(content)))
        .unwrap();
    map_response(resp)
}

fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&StorageError::InvalidName(String::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&StorageError::BlobNotFound("a".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StorageError::DirectoryNotFound("a".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StorageError::unavailable(std::io::Error::other("down"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_content_disposition_escapes_name() {
        assert_eq!(
            content_disposition("photo.jpg"),
            "attachment; filename=\"photo.jpg\"; filename*=UTF-8''photo.jpg"
        );
        assert_eq!(
            content_disposition("bär \"x\".txt"),
            "attachment; filename=\"b_r _x_.txt\"; filename*=UTF-8''b%C3%A4r%20%22x%22.txt"
        );
    }
}
