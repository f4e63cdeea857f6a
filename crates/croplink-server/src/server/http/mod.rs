//! HTTP routes.
//!
//! | Method | Path |
//! |---|---|
//! | `POST` | `/v1/reports/{kind}/{entity_a}/{entity_b}` |
//! | `GET` | `/v1/reports/{kind}/{entity_a}/{entity_b}/download` |
//! | `GET` | `/v1/history/{kind}/{entity_a}/{entity_b}` |
//! | `GET` | `/health` |
//!
//! All report routes take optional `start_date` / `end_date` query
//! parameters. Errors are JSON `{code, message}` bodies.

use crate::server::service::{Acknowledgement, ReportCoordinator, ReportParams};
use axum::{
    Json, Router,
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{
        HeaderName, Method, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use croplink_core::{
    Error, Result,
    dataset::Cell,
    types::{ReportKind, XLSX_CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const CONTENT_DESCRIPTION: HeaderName = HeaderName::from_static("content-description");
const CONTENT_TRANSFER_ENCODING: HeaderName =
    HeaderName::from_static("content-transfer-encoding");

#[derive(Debug, Deserialize)]
pub struct ReportPath {
    kind: String,
    entity_a: String,
    entity_b: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateRange {
    start_date: Option<String>,
    end_date: Option<String>,
}

/// Extractor results are taken as `Result` so malformed paths and query
/// strings answer with the JSON error body instead of axum's plain text.
type PathParams = core::result::Result<Path<ReportPath>, PathRejection>;
type QueryParams = core::result::Result<Query<DateRange>, QueryRejection>;

fn report_params(path: PathParams, query: QueryParams) -> Result<ReportParams> {
    let Path(path) = path.map_err(|e| Error::invalid(e.body_text()))?;
    let Query(range) = query.map_err(|e| Error::invalid(e.body_text()))?;
    Ok(ReportParams {
        kind: path.kind.parse::<ReportKind>()?,
        entity_a: path.entity_a,
        entity_b: path.entity_b,
        start_date: range.start_date,
        end_date: range.end_date,
    })
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    kind: ReportKind,
    entity_a: String,
    entity_b: String,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

pub fn build_router(coordinator: ReportCoordinator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .expose_headers([CONTENT_DISPOSITION]);

    Router::new()
        .route("/health", get(health))
        .route("/v1/reports/{kind}/{entity_a}/{entity_b}", post(trigger_report))
        .route(
            "/v1/reports/{kind}/{entity_a}/{entity_b}/download",
            get(download_report),
        )
        .route("/v1/history/{kind}/{entity_a}/{entity_b}", get(history))
        .with_state(coordinator)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> &'static str {
    "ok"
}

async fn trigger_report(
    State(coordinator): State<ReportCoordinator>,
    path: PathParams,
    query: QueryParams,
) -> Result<(StatusCode, Json<Acknowledgement>)> {
    let params = report_params(path, query)?;
    let ack = coordinator.start_generation(&params).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn download_report(
    State(coordinator): State<ReportCoordinator>,
    path: PathParams,
    query: QueryParams,
) -> Result<impl IntoResponse> {
    let params = report_params(path, query)?;
    let report = coordinator.fetch_generated_file(&params).await?;

    let headers = [
        (CONTENT_DESCRIPTION, "File Transfer".to_string()),
        (CONTENT_TRANSFER_ENCODING, "binary".to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename={}", report.name),
        ),
        (CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (CONTENT_LENGTH, report.len.to_string()),
    ];
    let body = Body::from_stream(ReaderStream::new(report.reader));
    Ok((headers, body))
}

async fn history(
    State(coordinator): State<ReportCoordinator>,
    path: PathParams,
    query: QueryParams,
) -> Result<Json<HistoryResponse>> {
    let params = report_params(path, query)?;
    let dataset = coordinator.history(&params).await?;
    Ok(Json(HistoryResponse {
        kind: params.kind,
        headers: dataset.headers().to_vec(),
        rows: dataset.rows().to_vec(),
        entity_a: params.entity_a,
        entity_b: params.entity_b,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{
        config::ServerConfig,
        history::MemoryHistory,
        store::{ReportStore, memory::MemoryReportStore},
    };
    use axum::http::Request;
    use croplink_core::dataset::HistoryPoint;
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;

    const BASE: &str = "http://reports.croplink.test";

    fn router(render_workers: usize) -> (Router, Arc<MemoryReportStore>) {
        let mut history = MemoryHistory::default();
        history.insert(
            ReportKind::PriceHistory,
            "C1",
            "R1",
            [("2023-01-15", 11_500.0), ("2022-12-31", 9_000.0), ("2023-01-02", 11_000.0)].map(
                |(date, value)| HistoryPoint {
                    date: date.parse().unwrap(),
                    value,
                    unit: Some("IDR/kg".into()),
                },
            ),
        );
        let config = ServerConfig {
            public_base_url: BASE.into(),
            render_workers,
            ..ServerConfig::default()
        };
        let store = Arc::new(MemoryReportStore::default());
        let coordinator = ReportCoordinator::new(
            &config,
            Arc::new(history),
            Arc::clone(&store) as Arc<dyn ReportStore>,
        );
        (build_router(coordinator), store)
    }

    async fn send(router: &Router, method: Method, uri: &str) -> axum::response::Response {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (router, _) = router(0);
        let response = send(&router, Method::GET, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"ok");
    }

    #[tokio::test]
    async fn trigger_then_poll_until_the_file_is_served() {
        for workers in [0, 2] {
            let (router, _) = router(workers);
            let response = send(
                &router,
                Method::POST,
                "/v1/reports/price-history/C1/R1?start_date=2023-01-01&end_date=2023-01-31",
            )
            .await;
            assert_eq!(response.status(), StatusCode::ACCEPTED);
            let ack = body_json(response).await;
            assert_eq!(ack["message"], "Report generation in progress...");
            let download_url = ack["download_url"].as_str().unwrap().to_string();
            let download_path = download_url.strip_prefix(BASE).unwrap();
            assert_eq!(
                download_path,
                "/v1/reports/price-history/C1/R1/download?start_date=2023-01-01&end_date=2023-01-31"
            );

            let mut served = None;
            for _ in 0..200 {
                let response = send(&router, Method::GET, download_path).await;
                match response.status() {
                    StatusCode::OK => {
                        served = Some(response);
                        break;
                    }
                    StatusCode::NOT_FOUND => {
                        let body = body_json(response).await;
                        assert_eq!(body["code"], "NOT_FOUND");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    other => panic!("unexpected status {other}"),
                }
            }
            let response = served.expect("report never became downloadable");

            let headers = response.headers().clone();
            assert_eq!(headers["content-description"], "File Transfer");
            assert_eq!(headers["content-transfer-encoding"], "binary");
            assert_eq!(headers[CONTENT_TYPE], XLSX_CONTENT_TYPE);
            let disposition = headers[CONTENT_DISPOSITION].to_str().unwrap().to_string();
            assert!(disposition.starts_with("attachment; filename=price_history_C1_R1_2023-01-01_2023-01-31_"));
            assert!(disposition.ends_with(".xlsx"));

            let bytes = body_bytes(response).await;
            assert_eq!(
                headers[CONTENT_LENGTH].to_str().unwrap(),
                bytes.len().to_string()
            );
            assert_eq!(&bytes[..2], b"PK");

            // 2022-12-31 falls outside the range; the rest come back in date order.
            let rows = crate::server::render::read_first_sheet(&bytes);
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0][3], "Price");
            let prices: Vec<_> = rows[1..].iter().map(|r| r[3].as_str()).collect();
            assert_eq!(prices, ["11000", "11500"]);
        }
    }

    #[tokio::test]
    async fn download_before_any_trigger_is_not_found() {
        let (router, _) = router(0);
        let response = send(&router, Method::GET, "/v1/reports/price-history/C1/R1/download").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_dates_are_rejected_on_both_sides() {
        let (router, store) = router(0);
        let response = send(
            &router,
            Method::POST,
            "/v1/reports/price-history/C1/R1?start_date=2023/13/40",
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION");

        let response = send(
            &router,
            Method::GET,
            "/v1/reports/price-history/C1/R1/download?start_date=2023%2F13%2F40",
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.names().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_query_strings_get_the_json_error_body() {
        let (router, _) = router(0);
        for (method, uri) in [
            (
                Method::GET,
                "/v1/reports/price-history/C1/R1/download?start_date=2023-01-01&start_date=2023-01-02",
            ),
            (
                Method::POST,
                "/v1/reports/price-history/C1/R1?end_date=2023-01-31&end_date=2023-02-28",
            ),
            (
                Method::GET,
                "/v1/history/price-history/C1/R1?start_date=2023-01-01&start_date=2023-01-02",
            ),
        ] {
            let response = send(&router, method, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(response.headers()[CONTENT_TYPE], "application/json", "{uri}");
            let body = body_json(response).await;
            assert_eq!(body["code"], "VALIDATION", "{uri}");
            assert!(body["message"].as_str().unwrap().contains("duplicate field"), "{uri}");
        }
    }

    #[tokio::test]
    async fn undecodable_path_segments_get_the_json_error_body() {
        let (router, _) = router(0);
        let response = send(&router, Method::GET, "/v1/reports/price-history/%FF/R1/download").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_json(response).await["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() {
        let (router, _) = router(0);
        let response = send(
            &router,
            Method::POST,
            "/v1/reports/price-history/C1/R1?start_date=2023-02-01&end_date=2023-01-01",
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_kind_is_a_json_validation_error() {
        let (router, _) = router(0);
        let response = send(&router, Method::POST, "/v1/reports/weather-history/C1/R1").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn unknown_series_is_not_found() {
        let (router, _) = router(0);
        let response = send(&router, Method::POST, "/v1/reports/supply-history/C1/R1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_returns_rows_in_range_and_in_order() {
        let (router, _) = router(0);
        let response = send(
            &router,
            Method::GET,
            "/v1/history/price-history/C1/R1?start_date=2023-01-01",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "price-history");
        assert_eq!(body["entity_a"], "C1");
        assert_eq!(body["entity_b"], "R1");
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "2023-01-02");
        assert_eq!(rows[1][0], "2023-01-15");
        assert_eq!(rows[1][3], 11_500.0);
    }

    #[tokio::test]
    async fn empty_query_values_mean_open_bounds() {
        let (router, _) = router(0);
        let response = send(
            &router,
            Method::POST,
            "/v1/reports/price-history/C1/R1?start_date=&end_date=",
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let ack = body_json(response).await;
        assert_eq!(
            ack["download_url"],
            format!("{BASE}/v1/reports/price-history/C1/R1/download")
        );
    }
}
