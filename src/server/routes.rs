//! HTTP routes
//!
//! Stream endpoints answer with an endless multipart body; everything else is
//! JSON with a `success` flag.

use std::convert::Infallible;
use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpResponse, ResponseError};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::registry::CameraRegistry;
use crate::session::{CameraSession, SourceId};
use crate::stream::{self, StreamPacing};
use crate::testpattern::test_pattern_stream;

const NO_SOURCE: &str =
    "No RTSP URL provided. Pass rtsp_url query parameter or set RTSP_URL environment variable.";

/// State shared by every handler
pub(crate) struct AppState {
    pub registry: Arc<CameraRegistry>,
    pub default_source: Option<String>,
    pub pacing: StreamPacing,
    pub test_pattern_quality: u8,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SourceQuery {
    rtsp_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebcamQuery {
    camera_index: Option<String>,
}

/// Register all routes on an actix app
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/api/health", web::get().to(health))
        .route("/video_feed", web::get().to(video_feed))
        .route("/video_feed/webcam", web::get().to(webcam_feed))
        .route("/video_feed/test", web::get().to(test_feed))
        .route("/video_feed/status", web::get().to(status))
        .route("/video_feed/stop", web::post().to(stop_stream))
        .route("/video_feed/stop_all", web::post().to(stop_all))
        .route("/video_feed/sources", web::get().to(sources))
        .default_service(web::to(not_found));
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::SourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::ReconnectExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Encode(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Error::NotFound(_) => "Stream not found".to_string(),
            Error::Encode(_) | Error::Io(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        json_error(self.status_code(), message)
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "success": false,
        "error": message.into(),
    }))
}

/// Multipart response with caching disabled
fn mjpeg_response<S>(body: S) -> HttpResponse
where
    S: Stream<Item = std::result::Result<Bytes, Infallible>> + 'static,
{
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, stream::CONTENT_TYPE))
        .insert_header((header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"))
        .insert_header((header::PRAGMA, "no-cache"))
        .insert_header((header::EXPIRES, "0"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .streaming(body)
}

fn viewer_response(state: &AppState, session: Arc<CameraSession>) -> HttpResponse {
    let guard = session.attach_viewer();
    tracing::info!(
        source = %session.id(),
        viewers = session.viewer_count(),
        "Viewer connected"
    );
    mjpeg_response(stream::multipart_stream(session, state.pacing, Some(guard)))
}

/// Start (or join) the session for `source`; `None` if it cannot be opened.
async fn open_session(state: &AppState, source: &str) -> Option<Arc<CameraSession>> {
    match state.registry.get_or_start(source).await {
        Ok(session) => Some(session),
        Err(err) => {
            tracing::warn!(source = %source, error = %err, "Stream unavailable");
            None
        }
    }
}

async fn video_feed(
    state: web::Data<AppState>,
    query: web::Query<SourceQuery>,
) -> Result<HttpResponse> {
    // An explicit but empty rtsp_url does not fall back to the default
    let source = query
        .into_inner()
        .rtsp_url
        .or_else(|| state.default_source.clone())
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| Error::InvalidRequest(NO_SOURCE.into()))?;

    match open_session(&state, &source).await {
        Some(session) => Ok(viewer_response(&state, session)),
        None => Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Failed to connect to RTSP stream: {source}"),
        )),
    }
}

async fn webcam_feed(
    state: web::Data<AppState>,
    query: web::Query<WebcamQuery>,
) -> Result<HttpResponse> {
    let raw = query.into_inner().camera_index.unwrap_or_else(|| "0".into());
    let index: u32 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("Invalid camera index: {raw}")))?;

    match open_session(&state, &index.to_string()).await {
        Some(session) => Ok(viewer_response(&state, session)),
        None => Ok(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Failed to open webcam {index}. Make sure a webcam is connected."),
        )),
    }
}

async fn test_feed(state: web::Data<AppState>) -> HttpResponse {
    tracing::info!("Test pattern viewer connected");
    mjpeg_response(test_pattern_stream(
        state.test_pattern_quality,
        state.pacing,
    ))
}

async fn status(state: web::Data<AppState>) -> HttpResponse {
    let streams = state.registry.list_active().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "active_streams": streams.len(),
        "streams": streams,
    }))
}

async fn stop_stream(
    state: web::Data<AppState>,
    body: Option<web::Json<SourceQuery>>,
    query: web::Query<SourceQuery>,
) -> Result<HttpResponse> {
    let source = body
        .and_then(|body| body.into_inner().rtsp_url)
        .or_else(|| query.into_inner().rtsp_url)
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| Error::InvalidRequest("No RTSP URL provided".into()))?;

    state.registry.stop(&SourceId::from(source.as_str())).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Stream stopped: {source}"),
    })))
}

async fn stop_all(state: web::Data<AppState>) -> HttpResponse {
    let count = state.registry.stop_all().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Stopped {count} stream(s)"),
        "count": count,
    }))
}

async fn sources() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "sources": [
            {
                "name": "Test Pattern",
                "url": "/video_feed/test",
                "description": "Generated test pattern - no camera or stream needed",
            },
            {
                "name": "Webcam",
                "url": "/video_feed/webcam",
                "description": "Local webcam (camera index 0)",
            },
            {
                "name": "RTSP Stream",
                "url": "/video_feed?rtsp_url=YOUR_RTSP_URL",
                "description": "Custom RTSP stream URL",
            },
        ],
        "hint": "Use /video_feed/test for development without a real camera",
    }))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "message": "camgate is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "name": "camgate",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Live-video gateway serving camera sources as MJPEG",
        "endpoints": {
            "health": "GET /api/health",
            "video_feed": "GET /video_feed?rtsp_url=<url>",
            "webcam": "GET /video_feed/webcam?camera_index=<n>",
            "test": "GET /video_feed/test",
            "status": "GET /video_feed/status",
            "stop": "POST /video_feed/stop",
            "stop_all": "POST /video_feed/stop_all",
            "sources": "GET /video_feed/sources",
        },
    }))
}

async fn not_found() -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "Resource not found")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actix_web::{test, App};
    use serde_json::Value;

    use super::*;
    use crate::capture::testing::ScriptedOpener;
    use crate::registry::RegistryConfig;
    use crate::session::{CaptureState, SessionConfig};

    fn state(opener: &ScriptedOpener) -> web::Data<AppState> {
        state_with_default(opener, None)
    }

    fn state_with_default(opener: &ScriptedOpener, default_source: Option<&str>) -> web::Data<AppState> {
        let config = RegistryConfig::default()
            .session(SessionConfig::default().reconnect_backoff(Duration::from_millis(10)));
        web::Data::new(AppState {
            registry: Arc::new(CameraRegistry::with_config(opener.shared(), config)),
            default_source: default_source.map(str::to_string),
            pacing: StreamPacing::default(),
            test_pattern_quality: 80,
        })
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure)).await
        };
    }

    #[actix_web::test]
    async fn test_unreachable_source_is_503_and_listed_as_failed() {
        let opener = ScriptedOpener::unreachable();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/video_feed?rtsp_url=rtsp%3A%2F%2Fbad-host%2Fstream")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(
            body["error"],
            "Failed to connect to RTSP stream: rtsp://bad-host/stream"
        );

        let req = test::TestRequest::get().uri("/video_feed/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["active_streams"], 1);
        assert_eq!(body["streams"][0]["url"], "rtsp://bad-host/stream");
        assert_eq!(body["streams"][0]["is_running"], false);
        assert_eq!(body["streams"][0]["state"], "failed");
    }

    #[actix_web::test]
    async fn test_missing_source_is_400() {
        let opener = ScriptedOpener::healthy();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/video_feed").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], NO_SOURCE);
        assert_eq!(opener.opens(), 0);
    }

    #[actix_web::test]
    async fn test_default_source_is_used() {
        let opener = ScriptedOpener::unreachable();
        let state = state_with_default(&opener, Some("rtsp://cam/default"));
        let app = app!(state);

        let req = test::TestRequest::get().uri("/video_feed").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body["error"],
            "Failed to connect to RTSP stream: rtsp://cam/default"
        );
    }

    #[actix_web::test]
    async fn test_empty_source_does_not_use_default() {
        let opener = ScriptedOpener::healthy();
        let state = state_with_default(&opener, Some("rtsp://cam/default"));
        let app = app!(state);

        let req = test::TestRequest::get().uri("/video_feed?rtsp_url=").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], NO_SOURCE);
        assert_eq!(opener.opens(), 0);
    }

    #[actix_web::test]
    async fn test_stream_response_tracks_viewer() {
        let opener = ScriptedOpener::healthy();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/video_feed?rtsp_url=rtsp%3A%2F%2Fcam%2Fone")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );

        let session = state
            .registry
            .get(&SourceId::from("rtsp://cam/one"))
            .await
            .unwrap();
        assert_eq!(session.viewer_count(), 1);
        assert_eq!(session.state(), CaptureState::Running);

        drop(resp);
        assert_eq!(session.viewer_count(), 0);
        state.registry.stop_all().await;
    }

    #[actix_web::test]
    async fn test_webcam_routes() {
        let opener = ScriptedOpener::unreachable();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/video_feed/webcam").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"],
            "Failed to open webcam 0. Make sure a webcam is connected."
        );

        let req = test::TestRequest::get()
            .uri("/video_feed/webcam?camera_index=front")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_test_feed_is_always_available() {
        let opener = ScriptedOpener::unreachable();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/video_feed/test").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert!(state.registry.is_empty().await);
    }

    #[actix_web::test]
    async fn test_stop_stream() {
        let opener = ScriptedOpener::healthy();
        let state = state(&opener);
        let app = app!(state);
        state.registry.get_or_create("rtsp://cam/one").await;
        state.registry.get_or_create("rtsp://cam/two").await;

        let req = test::TestRequest::post()
            .uri("/video_feed/stop")
            .set_json(json!({ "rtsp_url": "rtsp://cam/one" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Stream stopped: rtsp://cam/one");

        // Query string fallback
        let req = test::TestRequest::post()
            .uri("/video_feed/stop?rtsp_url=rtsp%3A%2F%2Fcam%2Ftwo")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.registry.is_empty().await);

        let req = test::TestRequest::post()
            .uri("/video_feed/stop")
            .set_json(json!({ "rtsp_url": "rtsp://cam/one" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Stream not found");

        let req = test::TestRequest::post().uri("/video_feed/stop").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_stop_all_reports_count() {
        let opener = ScriptedOpener::healthy();
        let state = state(&opener);
        let app = app!(state);
        for source in ["rtsp://cam/a", "rtsp://cam/b", "rtsp://cam/c"] {
            let session = state.registry.get_or_create(source).await;
            session.start().await.unwrap();
        }

        let req = test::TestRequest::post().uri("/video_feed/stop_all").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 3);
        assert_eq!(body["message"], "Stopped 3 stream(s)");
        assert!(state.registry.is_empty().await);
        assert_eq!(opener.live_handles(), 0);
    }

    #[actix_web::test]
    async fn test_info_routes() {
        let opener = ScriptedOpener::healthy();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");

        let req = test::TestRequest::get().uri("/video_feed/sources").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["sources"].as_array().unwrap().len(), 3);

        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["name"], "camgate");
    }

    #[actix_web::test]
    async fn test_unknown_route_is_json_404() {
        let opener = ScriptedOpener::healthy();
        let state = state(&opener);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/no/such/thing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Resource not found");
    }
}
