mod archive;
mod blobs;
mod files;
mod form;
mod responses;
mod templates;

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};

use storage_core::{BlobStore, FileShareStore};

use crate::metrics::PrometheusMetrics;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type HttpBody = UnsyncBoxBody<Bytes, BoxError>;

/// HTTP browser over the configured blob container and file share
#[derive(Clone)]
pub struct HttpUiService {
    blobs: Option<BlobStore>,
    files: Option<FileShareStore>,
    max_archive_bytes: u64,
}

impl HttpUiService {
    pub fn new(blobs: Option<BlobStore>, files: Option<FileShareStore>) -> Self {
        Self {
            blobs,
            files,
            max_archive_bytes: archive::DEFAULT_MAX_ARCHIVE_BYTES,
        }
    }

    /// Caps the uncompressed size of zip downloads; larger ones answer 413.
    pub fn with_max_archive_bytes(mut self, max_bytes: u64) -> Self {
        self.max_archive_bytes = max_bytes;
        self
    }

    /// Main request handler
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<Response<HttpBody>, Infallible>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send + 'static,
    {
        let method = req.method().clone();
        let response = self.route_request(req).await;
        PrometheusMetrics::record_request(method.as_str(), response.status().as_u16());
        Ok(response)
    }

    async fn route_request<B>(&self, req: Request<B>) -> Response<HttpBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send + 'static,
    {
        let wants_html = wants_html(&req);
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match (&method, path.as_str()) {
            (&Method::GET, "/") => self.handle_root(wants_html),
            (&Method::GET, "/health") => self.handle_health(),
            (_, "/blobs") => self.route_blobs(req, &method, "", wants_html).await,
            (_, path) if path.starts_with("/blobs/") => {
                self.route_blobs(req, &method, &path["/blobs/".len()..], wants_html)
                    .await
            }
            (_, "/files") => self.route_files(req, &method, "", wants_html).await,
            (_, path) if path.starts_with("/files/") => {
                self.route_files(req, &method, &path["/files/".len()..], wants_html)
                    .await
            }
            _ => responses::not_found(wants_html),
        }
    }

    async fn route_blobs<B>(
        &self,
        req: Request<B>,
        method: &Method,
        action: &str,
        wants_html: bool,
    ) -> Response<HttpBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send + 'static,
    {
        let Some(store) = &self.blobs else {
            return not_configured("blob storage", wants_html);
        };

        match (method, action) {
            (&Method::GET, "") => blobs::list(store, &req, wants_html).await,
            (&Method::GET, "download") => blobs::download(store, &req, wants_html).await,
            (&Method::GET, "zip") => blobs::zip(store, &req, self.max_archive_bytes, wants_html).await,
            (&Method::POST, "upload") => blobs::upload(store, req, wants_html).await,
            (&Method::POST, "delete") => blobs::delete(store, req, wants_html).await,
            _ => responses::not_found(wants_html),
        }
    }

    async fn route_files<B>(
        &self,
        req: Request<B>,
        method: &Method,
        action: &str,
        wants_html: bool,
    ) -> Response<HttpBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send + 'static,
    {
        let Some(store) = &self.files else {
            return not_configured("file share", wants_html);
        };

        match (method, action) {
            (&Method::GET, "") => files::list(store, &req, wants_html).await,
            (&Method::GET, "download") => files::download(store, &req, wants_html).await,
            (&Method::POST, "upload") => files::upload(store, req, wants_html).await,
            (&Method::POST, "delete") => files::delete(store, req, wants_html).await,
            _ => responses::not_found(wants_html),
        }
    }

    fn handle_root(&self, wants_html: bool) -> Response<HttpBody> {
        if wants_html {
            let home = if self.blobs.is_none() && self.files.is_some() {
                "/files"
            } else {
                "/blobs"
            };
            responses::redirect(home)
        } else {
            let info = serde_json::json!({
                "name": "storage-web HTTP API",
                "version": env!("CARGO_PKG_VERSION"),
                "blob_storage": self.blobs.is_some(),
                "file_share": self.files.is_some(),
                "endpoints": {
                    "GET /blobs?prefix=&flat=&limit=": "List blobs",
                    "GET /blobs/download?name=": "Download a blob",
                    "GET /blobs/zip?prefix=": "Download every blob under a prefix as zip",
                    "POST /blobs/upload": "Upload blobs (multipart: directory, file)",
                    "POST /blobs/delete": "Delete a blob (form: name)",
                    "GET /files?dir=": "List a share directory",
                    "GET /files/download?name=": "Download a share file",
                    "POST /files/upload": "Upload share files (multipart: directory, file)",
                    "POST /files/delete": "Delete a share file (form: name)",
                    "GET /health": "Health check"
                }
            });
            responses::json_response(StatusCode::OK, &info)
        }
    }

    fn handle_health(&self) -> Response<HttpBody> {
        let health = serde_json::json!({
            "status": "healthy",
            "blob_storage": self.blobs.is_some(),
            "file_share": self.files.is_some()
        });
        responses::json_response(StatusCode::OK, &health)
    }
}

fn not_configured(what: &str, wants_html: bool) -> Response<HttpBody> {
    responses::error_response(
        StatusCode::NOT_FOUND,
        &format!("No {what} is configured"),
        wants_html,
    )
}

fn wants_html<B>(req: &Request<B>) -> bool {
    if let Some(query) = req.uri().query() {
        if query.contains("format=json") {
            return false;
        }
        if query.contains("format=html") {
            return true;
        }
    }

    if let Some(accept) = req.headers().get("accept") {
        if let Ok(accept_str) = accept.to_str() {
            if accept_str.contains("text/html") {
                return true;
            }
            if accept_str.contains("application/json") {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::{BodyExt, Full};
    use hyper::header;

    use storage_core::{LocalShare, ObjectStoreContainer};

    use super::form::tests::multipart_request;
    use super::*;

    fn blob_service() -> HttpUiService {
        let store = BlobStore::new(Arc::new(ObjectStoreContainer::in_memory("images")));
        HttpUiService::new(Some(store), None)
    }

    async fn file_service() -> (tempfile::TempDir, HttpUiService) {
        let root = tempfile::tempdir().unwrap();
        let share = LocalShare::open(root.path(), "documents").await.unwrap();
        let store = FileShareStore::new(Arc::new(share));
        (root, HttpUiService::new(None, Some(store)))
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri(uri)
            .header(header::ACCEPT, "application/json")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn post_form(uri: &str, body: &str, accept: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::ACCEPT, accept)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn send(service: &HttpUiService, req: Request<Full<Bytes>>) -> Response<HttpBody> {
        service.handle_request(req).await.unwrap()
    }

    async fn body_bytes(response: Response<HttpBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn body_json(response: Response<HttpBody>) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn upload_blobs(service: &HttpUiService, directory: &str, files: &[(&str, &str)]) {
        let mut parts = vec![("directory", None, directory)];
        parts.extend(files.iter().map(|(name, content)| ("file", Some(*name), *content)));
        let mut req = multipart_request("/blobs/upload", &parts);
        req.headers_mut()
            .insert(header::ACCEPT, "application/json".parse().unwrap());
        let response = send(service, req).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let service = blob_service();

        let response = send(&service, Request::get("/").body(Full::new(Bytes::new())).unwrap()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/blobs");

        let response = send(&service, get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let health = body_json(response).await;
        assert_eq!(health["blob_storage"], true);
        assert_eq!(health["file_share"], false);
    }

    #[test]
    fn test_wants_html() {
        let req = |uri: &str, accept: Option<&str>| {
            let mut builder = Request::builder().uri(uri);
            if let Some(accept) = accept {
                builder = builder.header(header::ACCEPT, accept);
            }
            builder.body(()).unwrap()
        };
        assert!(wants_html(&req("/blobs", None)));
        assert!(wants_html(&req("/blobs", Some("text/html,application/xhtml+xml"))));
        assert!(!wants_html(&req("/blobs", Some("application/json"))));
        assert!(!wants_html(&req("/blobs?format=json", Some("text/html"))));
        assert!(wants_html(&req("/blobs?format=html", Some("application/json"))));
    }

    #[tokio::test]
    async fn test_blob_upload_list_download() {
        let service = blob_service();
        upload_blobs(&service, "/Images/", &[("cat.png", "meow"), ("dog.png", "woof")]).await;

        let response = send(&service, get("/blobs?prefix=Images%2F")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listing = body_json(response).await;
        assert_eq!(listing["count"], 2);
        assert_eq!(listing["entries"][0]["name"], "Images/cat.png");
        assert_eq!(listing["entries"][0]["size"], 4);

        let response = send(&service, get("/blobs")).await;
        let listing = body_json(response).await;
        assert_eq!(listing["entries"][0]["name"], "Images");
        assert_eq!(listing["entries"][0]["is_directory"], true);

        let response = send(&service, get("/blobs/download?name=Images%2Fcat.png")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("filename=\"cat.png\""));
        assert_eq!(body_bytes(response).await, "meow");
    }

    #[tokio::test]
    async fn test_blob_download_errors() {
        let service = blob_service();

        let response = send(&service, get("/blobs/download")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&service, get("/blobs/download?name=missing.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error = body_json(response).await;
        assert_eq!(error["status"], 404);
    }

    #[tokio::test]
    async fn test_blob_upload_requires_file() {
        let service = blob_service();
        let mut req = multipart_request("/blobs/upload", &[("directory", None, "Images")]);
        req.headers_mut()
            .insert(header::ACCEPT, "application/json".parse().unwrap());
        let response = send(&service, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&service, post_form("/blobs/upload", "name=x", "application/json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blob_delete() {
        let service = blob_service();
        upload_blobs(&service, "Images", &[("cat.png", "meow")]).await;

        let response = send(
            &service,
            post_form("/blobs/delete", "name=Images%2Fcat.png", "text/html"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/blobs?prefix=Images%2F");

        let response = send(
            &service,
            post_form("/blobs/delete", "name=Images%2Fcat.png", "application/json"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["deleted"], "Images/cat.png");

        let response = send(&service, get("/blobs/download?name=Images%2Fcat.png")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blob_zip() {
        let service = blob_service();
        upload_blobs(&service, "Images", &[("cat.png", "meow"), ("dog.png", "woof")]).await;
        upload_blobs(&service, "Other", &[("x.txt", "x")]).await;

        let response = send(&service, get("/blobs/zip?prefix=Images%2F")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("Images.zip"));

        let archive = body_bytes(response).await;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(archive.to_vec())).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["cat.png", "dog.png"]);
        assert!(archive.by_name("cat.png").is_ok());

        let response = send(&service, get("/blobs/zip?prefix=Nothing%2F")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blob_zip_size_limit() {
        let service = blob_service().with_max_archive_bytes(8);
        upload_blobs(&service, "Images", &[("cat.png", "meow"), ("dog.png", "woof")]).await;

        let response = send(&service, get("/blobs/zip?prefix=Images%2F")).await;
        assert_eq!(response.status(), StatusCode::OK);

        upload_blobs(&service, "Images", &[("cow.png", "moo")]).await;
        let response = send(&service, get("/blobs/zip?prefix=Images%2F")).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = send(&service, get("/blobs/zip?prefix=Images%2Fc")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_blob_listing_html() {
        let service = blob_service();
        upload_blobs(&service, "Images", &[("cat.png", "meow")]).await;

        let req = Request::get("/blobs?prefix=Images%2F")
            .header(header::ACCEPT, "text/html")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = send(&service, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(page.contains("/blobs/download?name=Images%2Fcat.png"));
    }

    #[tokio::test]
    async fn test_file_share_round_trip() {
        let (root, service) = file_service().await;

        let mut req = multipart_request(
            "/files/upload",
            &[("directory", None, "reports"), ("file", Some("q1.txt"), "numbers")],
        );
        req.headers_mut()
            .insert(header::ACCEPT, "application/json".parse().unwrap());
        let response = send(&service, req).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let uploaded = body_json(response).await;
        assert_eq!(uploaded[0]["path"], "reports/q1.txt");
        assert!(root.path().join("documents/reports/q1.txt").is_file());

        let response = send(&service, get("/files?dir=reports")).await;
        let listing = body_json(response).await;
        assert_eq!(listing["directory"], "reports");
        assert_eq!(listing["count"], 1);

        let response = send(&service, get("/files/download?name=reports%2Fq1.txt")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, "numbers");

        let response = send(
            &service,
            post_form("/files/delete", "name=reports%2Fq1.txt", "text/html"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/files?dir=reports");
        assert!(!root.path().join("documents/reports/q1.txt").exists());
    }

    #[tokio::test]
    async fn test_file_share_missing_paths() {
        let (root, service) = file_service().await;

        let response = send(&service, get("/files/download?name=nowhere%2Fa.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&service, get("/files/download?name=a.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&service, get("/files?dir=nowhere")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        std::fs::create_dir(root.path().join("documents/reports")).unwrap();
        let response = send(&service, get("/files/download?name=reports")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unconfigured_store() {
        let service = blob_service();
        let response = send(&service, get("/files")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&service, get("/unknown")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
