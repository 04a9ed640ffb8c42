//! Request routing
//!
//! | Route                      | Methods           | Success |
//! |----------------------------|-------------------|---------|
//! | `/csp-report`              | POST              | 204     |
//! | `/delete-site?rootDomain=` | GET, POST, DELETE | 200     |
//! | `/`                        | GET, HEAD         | 303 to `/static/` |
//! | `/static/<file>`           | GET, HEAD         | 200     |
//!
//! Error responses carry a short generic message and never echo stored
//! report data.

use crate::static_files;
use csp_core::{CspError, ReportService, RootDomain};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub type ResponseBody = Full<Bytes>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReportService>,
    /// Largest report body accepted, in bytes
    pub max_body_bytes: usize,
}

/// Dispatch a request to its handler
pub async fn handle<B>(state: AppState, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    debug!(method = %req.method(), path = %req.uri().path(), "Request");

    let path = req.uri().path().to_string();
    match path.as_str() {
        "/csp-report" => csp_report(state, req).await,
        "/delete-site" => delete_site(state, req).await,
        "/" => match *req.method() {
            Method::GET | Method::HEAD => redirect("/static/"),
            _ => method_not_allowed("GET, HEAD"),
        },
        "/static" => redirect("/static/"),
        _ => match path.strip_prefix("/static/") {
            Some(rest) => serve_static(state, req.method(), rest).await,
            None => text(StatusCode::NOT_FOUND, "Not Found"),
        },
    }
}

async fn csp_report<B>(state: AppState, req: Request<B>) -> Response<ResponseBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    if req.method() != Method::POST {
        return method_not_allowed("POST");
    }

    let body = match read_body(req, state.max_body_bytes).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            warn!(limit = state.max_body_bytes, "Rejected oversized CSP report");
            return text(StatusCode::PAYLOAD_TOO_LARGE, "Report body too large");
        }
        Err(BodyError::Read(e)) => {
            warn!(error = %e, "Failed to read CSP report body");
            return text(StatusCode::BAD_REQUEST, "Error reading request body");
        }
    };

    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || service.ingest(&body)).await {
        Ok(Ok(_domain)) => empty(StatusCode::NO_CONTENT),
        Ok(Err(e)) => report_error(e),
        Err(e) => {
            error!(error = %e, "CSP report task failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn report_error(e: CspError) -> Response<ResponseBody> {
    match e {
        CspError::MalformedReport(_) => {
            warn!(error = %e, "Rejected malformed CSP report");
            text(StatusCode::BAD_REQUEST, "Error parsing JSON")
        }
        e if e.is_client_error() => {
            warn!(error = %e, "Rejected CSP report");
            text(StatusCode::BAD_REQUEST, "Error extracting root domain")
        }
        e => {
            error!(error = %e, "Failed to store CSP report");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn delete_site<B>(state: AppState, req: Request<B>) -> Response<ResponseBody> {
    if !matches!(*req.method(), Method::GET | Method::POST | Method::DELETE) {
        return method_not_allowed("GET, POST, DELETE");
    }

    let param = req.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "rootDomain")
            .map(|(_, value)| value.into_owned())
    });

    let key = match param {
        Some(key) if !key.is_empty() => key,
        _ => return text(StatusCode::BAD_REQUEST, "Root domain parameter is missing"),
    };

    let domain = match RootDomain::from_key(&key) {
        Ok(domain) => domain,
        Err(e) => {
            warn!(error = %e, "Rejected delete request");
            return text(StatusCode::BAD_REQUEST, "Invalid root domain");
        }
    };

    let service = state.service.clone();
    match tokio::task::spawn_blocking(move || service.delete(&domain)).await {
        Ok(Ok(())) => text(StatusCode::OK, "Deleted"),
        Ok(Err(CspError::NotFound { .. })) => text(StatusCode::NOT_FOUND, "Unknown root domain"),
        Ok(Err(e)) => {
            error!(error = %e, "Failed to delete site");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Error deleting site files")
        }
        Err(e) => {
            error!(error = %e, "Delete task failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn serve_static(state: AppState, method: &Method, rest: &str) -> Response<ResponseBody> {
    if !matches!(*method, Method::GET | Method::HEAD) {
        return method_not_allowed("GET, HEAD");
    }

    let Some(path) = static_files::resolve(state.service.data_dir(), rest) else {
        return text(StatusCode::NOT_FOUND, "Not Found");
    };

    match static_files::read(&path).await {
        Ok(Some(contents)) => {
            let length = contents.len();
            let body = if *method == Method::HEAD {
                Bytes::new()
            } else {
                Bytes::from(contents)
            };
            let mut response = Response::new(Full::new(body));
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(static_files::content_type(&path)),
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Ok(None) => text(StatusCode::NOT_FOUND, "Not Found"),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read static file");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

enum BodyError {
    TooLarge,
    Read(BoxError),
}

async fn read_body<B>(req: Request<B>, limit: usize) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > limit) {
        return Err(BodyError::TooLarge);
    }

    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e)),
    }
}

fn text(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn empty(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn redirect(location: &'static str) -> Response<ResponseBody> {
    let mut response = empty(StatusCode::SEE_OTHER);
    response
        .headers_mut()
        .insert(header::LOCATION, HeaderValue::from_static(location));
    response
}

fn method_not_allowed(allow: &'static str) -> Response<ResponseBody> {
    let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use csp_core::config::{SiteConfig, StorageConfig};
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> AppState {
        let storage = StorageConfig {
            data_dir: dir.path().to_path_buf(),
        };
        let service = ReportService::open(&storage, SiteConfig::default()).unwrap();
        AppState {
            service: Arc::new(service),
            max_body_bytes: 4096,
        }
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    fn report(document_uri: &str, blocked_uri: &str) -> String {
        serde_json::json!({
            "csp-report": {
                "document-uri": document_uri,
                "referrer": "",
                "blocked-uri": blocked_uri,
                "violated-directive": "script-src-elem",
                "effective-directive": "script-src-elem",
                "status-code": 200,
                "source-file": "",
                "line-number": 1,
                "column-number": 1
            }
        })
        .to_string()
    }

    async fn body_text(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn example() -> RootDomain {
        RootDomain::from_key("example.com").unwrap()
    }

    #[tokio::test]
    async fn test_post_report() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let response = handle(
            state.clone(),
            request(
                Method::POST,
                "/csp-report",
                &report("https://sub.example.com/page", "https://cdn.bad.com/x.js"),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let ledger = state.service.ledger(&example()).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].blocked_host().unwrap(), "cdn.bad.com");
    }

    #[tokio::test]
    async fn test_post_invalid_document_uri() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let response = handle(
            state.clone(),
            request(Method::POST, "/csp-report", &report("not a url", "inline")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.service.store().scan_ledgers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_with_sender_receive_time() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let before = chrono::Utc::now();

        for received_at in ["1999-01-01T00:00:00Z", "yesterday"] {
            let body = serde_json::json!({
                "csp-report": {
                    "document-uri": "https://example.com/",
                    "blocked-uri": "inline",
                    "received-at": received_at,
                }
            })
            .to_string();
            let response = handle(state.clone(), request(Method::POST, "/csp-report", &body)).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT, "received-at {}", received_at);
        }

        let ledger = state.service.ledger(&example()).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.iter().all(|r| r.received_at.unwrap() >= before));
    }

    #[tokio::test]
    async fn test_post_malformed_json() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let response = handle(state, request(Method::POST, "/csp-report", "{oops")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Error parsing JSON");
    }

    #[tokio::test]
    async fn test_post_too_large() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let padding = "x".repeat(5000);
        let body = report(&format!("https://example.com/{}", padding), "inline");

        let response = handle(state.clone(), request(Method::POST, "/csp-report", &body)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.service.store().scan_ledgers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_report_endpoint_not_allowed() {
        let dir = TempDir::new().unwrap();
        let response = handle(state(&dir), request(Method::GET, "/csp-report", "")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        std::fs::write(state.service.store().ledger_path(&example()), "not json").unwrap();

        let response = handle(
            state,
            request(Method::POST, "/csp-report", &report("https://example.com/", "inline")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Internal Server Error");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_posts_for_new_domain() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let first = tokio::spawn(handle(
            state.clone(),
            request(
                Method::POST,
                "/csp-report",
                &report("https://a.example.com/", "https://one.test/1.js"),
            ),
        ));
        let second = tokio::spawn(handle(
            state.clone(),
            request(
                Method::POST,
                "/csp-report",
                &report("https://b.example.com/", "https://two.test/2.js"),
            ),
        ));

        assert_eq!(first.await.unwrap().status(), StatusCode::NO_CONTENT);
        assert_eq!(second.await.unwrap().status(), StatusCode::NO_CONTENT);
        assert_eq!(state.service.ledger(&example()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_report_then_delete_site() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        for blocked in ["https://one.test/1.js", "https://two.test/2.js"] {
            let response = handle(
                state.clone(),
                request(Method::POST, "/csp-report", &report("https://www.example.com/", blocked)),
            )
            .await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let ledger = state.service.ledger(&example()).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].blocked_uri, "https://one.test/1.js");
        assert_eq!(ledger[1].blocked_uri, "https://two.test/2.js");

        let index = handle(state.clone(), request(Method::GET, "/static/", "")).await;
        assert_eq!(index.status(), StatusCode::OK);
        assert!(body_text(index).await.contains("example.com_csp.html"));

        let response = handle(
            state.clone(),
            request(Method::GET, "/delete-site?rootDomain=example.com", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let store = state.service.store();
        assert!(!store.ledger_path(&example()).exists());
        assert!(!store.view_path(&example()).exists());

        let index = handle(state.clone(), request(Method::GET, "/static/index.html", "")).await;
        assert!(!body_text(index).await.contains("example.com_csp.html"));
    }

    #[tokio::test]
    async fn test_delete_site_missing_parameter() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        for uri in ["/delete-site", "/delete-site?rootDomain=", "/delete-site?other=x"] {
            let response = handle(state.clone(), request(Method::GET, uri, "")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {}", uri);
        }
    }

    #[tokio::test]
    async fn test_delete_site_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let response = handle(
            state(&dir),
            request(Method::GET, "/delete-site?rootDomain=..%2Fetc%2Fpasswd", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_site() {
        let dir = TempDir::new().unwrap();
        let response = handle(
            state(&dir),
            request(Method::DELETE, "/delete-site?rootDomain=nowhere.com", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_redirects_to_static() {
        let dir = TempDir::new().unwrap();
        let response = handle(state(&dir), request(Method::GET, "/", "")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/static/");
    }

    #[tokio::test]
    async fn test_static_rejects_hidden_and_missing() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        std::fs::write(dir.path().join(".tmp123"), "partial").unwrap();

        let hidden = handle(state.clone(), request(Method::GET, "/static/.tmp123", "")).await;
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

        let missing = handle(state.clone(), request(Method::GET, "/static/nope.html", "")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let unknown = handle(state, request(Method::GET, "/elsewhere", "")).await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_head() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        state.service.ensure_assets().unwrap();

        let response = handle(state, request(Method::HEAD, "/static/styles.css", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");
        assert!(body_text(response).await.is_empty());
    }
}
