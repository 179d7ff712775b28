//! HTTP service.
//!
//! Endpoints:
//! - POST /extract-stock - multipart upload, field `file`, `application/pdf`
//! - GET /health

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use proforma_core::{ExtractResult, ProformaConfig, ProformaError, StockExtractor};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Shared handler state. Holds configuration only; every request opens its
/// own document.
#[derive(Clone)]
struct AppState {
    extractor: StockExtractor,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Request failures and their HTTP status.
#[derive(Debug)]
enum ApiError {
    /// The upload is not declared as a PDF.
    UnsupportedMediaType(Option<String>),
    /// The multipart body could not be read or lacks the file.
    BadRequest { status: StatusCode, detail: String },
    /// The document could not be processed.
    Extraction(ProformaError),
    /// Anything else.
    Internal(String),
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::UnsupportedMediaType(content_type) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!(
                    "Only {} uploads are accepted, got {}",
                    PDF_CONTENT_TYPE,
                    content_type.as_deref().unwrap_or("no content type")
                ),
            ),
            ApiError::BadRequest { status, detail } => (status, detail),
            ApiError::Extraction(e) => {
                let status = match &e {
                    ProformaError::Pdf(_) | ProformaError::Extraction(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    ProformaError::Io(_) | ProformaError::Config(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", detail);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, detail);
        }

        (status, Json(ErrorBody { detail })).into_response()
    }
}

/// Build the service router from configuration.
pub fn router(config: &ProformaConfig) -> anyhow::Result<Router> {
    let origins = config
        .server
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| anyhow::anyhow!("Invalid allowed origin: {}", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let state = AppState {
        extractor: StockExtractor::new().with_table_settings(config.table.clone()),
    };

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/extract-stock", post(extract_stock))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

async fn health_check() -> &'static str {
    "OK"
}

/// Extract metadata and stock items from an uploaded proforma.
async fn extract_stock(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractResult>, ApiError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        if content_type.as_deref() != Some(PDF_CONTENT_TYPE) {
            return Err(ApiError::UnsupportedMediaType(content_type));
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field.bytes().await?;
        tracing::debug!("Received {} ({} bytes)", file_name, data.len());

        let extractor = state.extractor.clone();
        let result = tokio::task::spawn_blocking(move || extractor.extract_bytes(&data))
            .await
            .map_err(|e| ApiError::Internal(format!("Extraction task failed: {}", e)))?
            .map_err(ApiError::Extraction)?;

        return Ok(Json(result));
    }

    Err(ApiError::BadRequest {
        status: StatusCode::BAD_REQUEST,
        detail: "No file provided. Use field name 'file'".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use lopdf::{Document, Object, Stream, dictionary};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    const BOUNDARY: &str = "proforma-test-boundary";

    /// Single page PDF with a Helvetica `/F1` font.
    fn pdf(content: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.as_bytes().to_vec(),
        )));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    /// A labelled proforma whose ruled table has a header row and one data row.
    fn proforma(data_row: [&str; 9]) -> Vec<u8> {
        let header = ["Nr", "Produs", "UM", "Cant", "Pret", "Val", "", "", "TVA"];
        let mut ops = String::from("BT /F1 10 Tf 20 820 Td (Proforma nr. 55) Tj ET\n");
        for y in [800, 780, 760] {
            ops.push_str(&format!("20 {} m 560 {} l S\n", y, y));
        }
        for c in 0..=9 {
            let x = 20 + c * 60;
            ops.push_str(&format!("{} 760 m {} 800 l S\n", x, x));
        }
        for (y, row) in [(786, header), (766, data_row)] {
            for (c, text) in row.iter().enumerate().filter(|(_, t)| !t.is_empty()) {
                let x = 22 + c * 60;
                ops.push_str(&format!("BT /F1 8 Tf {} {} Td ({}) Tj ET\n", x, y, text));
            }
        }
        pdf(&ops)
    }

    fn multipart(field: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"doc.pdf\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/extract-stock")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn app() -> Router {
        router(&ProformaConfig::default()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_extract_stock() {
        let data = proforma(["1", "Cablu", "BUC", "12,5", "100", "", "", "", "19"]);
        let response = app()
            .oneshot(multipart("file", "application/pdf", &data))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(
            json,
            serde_json::json!({
                "metadata": {
                    "proforma_number": "55",
                    "serie": "",
                    "date": "",
                    "currency": "",
                    "supplier": "",
                },
                "items": [{
                    "line_number": 1,
                    "description": "Cablu",
                    "unit": "buc",
                    "quantity": 12.5,
                    "unit_price": 140.0,
                    "value": 170.0,
                    "vat": 19.0,
                }],
            })
        );
    }

    #[tokio::test]
    async fn test_non_pdf_upload_is_unsupported_media_type() {
        let data = proforma(["1", "Cablu", "buc", "1", "100", "", "", "", "19"]);
        let response = app()
            .oneshot(multipart("file", "image/png", &data))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let json = json_body(response).await;
        assert!(json["detail"].as_str().unwrap().contains("image/png"));
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let response = app()
            .oneshot(multipart("document", "application/pdf", b"%PDF-1.5"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let request = Request::post("/extract-stock")
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from("%PDF-1.5"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreadable_pdf() {
        let response = app()
            .oneshot(multipart("file", "application/pdf", b"not a pdf at all"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert!(json["detail"].as_str().unwrap().starts_with("PDF error"));
    }

    #[tokio::test]
    async fn test_non_numeric_quantity_fails_request() {
        let data = proforma(["1", "Cablu", "buc", "N/A", "100", "", "", "", "19"]);
        let response = app()
            .oneshot(multipart("file", "application/pdf", &data))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert!(json["detail"].as_str().unwrap().contains("quantity"));
        assert!(json.get("items").is_none());
    }

    #[tokio::test]
    async fn test_upload_over_limit() {
        let mut config = ProformaConfig::default();
        config.server.max_upload_bytes = 256;
        let app = router(&config).unwrap();

        let response = app
            .oneshot(multipart("file", "application/pdf", &[b'x'; 4096]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_preflight_from_allowed_origin() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/extract-stock")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "content-type");
    }

    #[tokio::test]
    async fn test_cors_rejects_other_origins() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/extract-stock")
            .header(header::ORIGIN, "http://evil.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[test]
    fn test_invalid_origin_in_config() {
        let mut config = ProformaConfig::default();
        config.server.allowed_origins = vec!["http://bad\norigin".to_string()];

        assert!(router(&config).is_err());
    }
}
