//! Query strings, urlencoded forms and multipart uploads.

use std::collections::HashMap;

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream};
use hyper::body::Body;
use hyper::{header, HeaderMap, Request};
use multer::{Field, Multipart};

use storage_core::path::{join, leaf_name, normalize_directory};

use super::BoxError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn decode(value: &str) -> String {
    let value = value.replace('+', " ");
    urlencoding::decode(&value)
        .map(|v| v.into_owned())
        .unwrap_or_default()
}

/// Looks up a single parameter in a query string.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| decode(value))
    })
}

pub fn query_flag(query: Option<&str>, name: &str) -> bool {
    matches!(
        query_param(query, name).as_deref(),
        Some("1" | "true" | "on" | "yes")
    )
}

pub fn parse_urlencoded(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

/// Reads a urlencoded form body.
pub async fn read_form<B>(req: Request<B>) -> Result<HashMap<String, String>, BoxError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| -> BoxError { e.into() })?
        .to_bytes();
    let body = String::from_utf8(body.to_vec())?;
    Ok(parse_urlencoded(&body))
}

/// MIME type for a file name, `application/octet-stream` when unknown.
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

fn boundary(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    multer::parse_boundary(content_type).ok()
}

/// Upload form with an optional `directory` field followed by `file` fields.
pub struct UploadForm {
    multipart: Multipart<'static>,
    directory: String,
}

/// A posted file together with the storage name it is written to.
pub struct UploadedField {
    pub target: String,
    pub field: Field<'static>,
}

impl UploadForm {
    pub fn from_request<B>(req: Request<B>) -> Option<Self>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send + 'static,
    {
        let boundary = boundary(req.headers())?;
        let stream = BodyStream::new(req.into_body()).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(err) => Some(Err(err)),
            }
        });
        Some(Self {
            multipart: Multipart::new(stream, boundary),
            directory: String::new(),
        })
    }

    /// Advances to the next non-empty file field. Fields before it update
    /// the target directory.
    pub async fn next_file(&mut self) -> Result<Option<UploadedField>, multer::Error> {
        while let Some(field) = self.multipart.next_field().await? {
            match field.name() {
                Some("directory") => {
                    self.directory = normalize_directory(&field.text().await?).to_string();
                }
                Some("file") => {
                    let Some(file_name) = field.file_name().map(leaf_name) else {
                        continue;
                    };
                    if file_name.is_empty() {
                        continue;
                    }
                    let target = join(&self.directory, file_name);
                    return Ok(Some(UploadedField { target, field }));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use http_body_util::Full;

    use super::*;

    pub(crate) const BOUNDARY: &str = "X-STORAGE-BOUNDARY";

    /// Builds a multipart request body from `(name, file_name, content)`.
    pub(crate) fn multipart_request(
        uri: &str,
        parts: &[(&str, Option<&str>, &str)],
    ) -> Request<Full<Bytes>> {
        let mut body = String::new();
        for (name, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    #[test]
    fn test_query_param() {
        let query = Some("prefix=Images%2F2020&flat=true&name=a+b.txt&empty");
        assert_eq!(query_param(query, "prefix").as_deref(), Some("Images/2020"));
        assert_eq!(query_param(query, "name").as_deref(), Some("a b.txt"));
        assert_eq!(query_param(query, "empty").as_deref(), Some(""));
        assert_eq!(query_param(query, "missing"), None);
        assert_eq!(query_param(None, "prefix"), None);
        assert!(query_flag(query, "flat"));
        assert!(!query_flag(query, "prefix"));
    }

    #[test]
    fn test_parse_urlencoded() {
        let form = parse_urlencoded("name=docs%2Fa.txt&x=1&&flag");
        assert_eq!(form["name"], "docs/a.txt");
        assert_eq!(form["x"], "1");
        assert_eq!(form["flag"], "");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("dir/a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_form_joins_directory() {
        let req = multipart_request(
            "/blobs/upload",
            &[
                ("directory", None, "/Images/"),
                ("file", Some("C:\\Users\\me\\cat.png"), "meow"),
                ("file", Some(""), ""),
                ("file", Some("dog.png"), "woof"),
            ],
        );
        let mut form = UploadForm::from_request(req).unwrap();

        let first = form.next_file().await.unwrap().unwrap();
        assert_eq!(first.target, "Images/cat.png");
        assert_eq!(first.field.bytes().await.unwrap(), "meow");

        let second = form.next_file().await.unwrap().unwrap();
        assert_eq!(second.target, "Images/dog.png");
        assert_eq!(second.field.bytes().await.unwrap(), "woof");

        assert!(form.next_file().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_form_requires_multipart() {
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert!(UploadForm::from_request(req).is_none());
    }
}
