/// HTTP endpoint for querying silo analytics
///
/// Provides a simple REST API for dashboards and external tools. Every
/// response is JSON; successful reports carry `"success": true`, failures
/// carry `"success": false` and an `error` message.
///
/// Endpoints:
/// - GET /health - Service health check
/// - GET /api/analytics/{estatisticas,anomalias,tendencias,correlacao,conforto}/{id}
/// - GET /api/analytics/resumo-dispositivo/{id}
/// - GET /api/analytics/dispositivos
/// - GET /api/analytics/comparacao-clima/{id}?latitude=..&longitude=..
/// - GET /api/analytics/previsao-clima?latitude=..&longitude=..
/// - GET /api/indicators/{amplitude-termica,taxa-umidade,indice-fungos,tempo-critico}/{id}
/// - GET /api/forecast/{temperatura,umidade,padroes,energia,completo}/{id}
/// - GET /api/metrics/global
/// - GET /api/metrics/dispositivo/{id}

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::analysis::analytics::DEFAULT_ANOMALY_THRESHOLD;
use crate::error::AnalyticsError;
use crate::model::Quantity;
use crate::service::{AnalyticsService, ServiceError};

const ENDPOINTS: &[&str] = &[
    "/health",
    "/api/analytics/estatisticas/{id}",
    "/api/analytics/anomalias/{id}",
    "/api/analytics/tendencias/{id}",
    "/api/analytics/correlacao/{id}",
    "/api/analytics/conforto/{id}",
    "/api/analytics/resumo-dispositivo/{id}",
    "/api/analytics/dispositivos",
    "/api/analytics/comparacao-clima/{id}",
    "/api/analytics/previsao-clima",
    "/api/indicators/amplitude-termica/{id}",
    "/api/indicators/taxa-umidade/{id}",
    "/api/indicators/indice-fungos/{id}",
    "/api/indicators/tempo-critico/{id}",
    "/api/forecast/temperatura/{id}",
    "/api/forecast/umidade/{id}",
    "/api/forecast/padroes/{id}",
    "/api/forecast/energia/{id}",
    "/api/forecast/completo/{id}",
    "/api/metrics/global",
    "/api/metrics/dispositivo/{id}",
];

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Percent-decoded query string parameters.
#[derive(Debug, Default)]
pub struct QueryParams {
    params: HashMap<String, String>,
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode(k), decode(v)),
                None => (decode(pair), String::new()),
            })
            .collect();
        Self { params }
    }

    /// Parsed value of `name`, or `default` when absent.
    pub fn get_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, AnalyticsError> {
        match self.params.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AnalyticsError::invalid(name, format!("cannot parse `{}`", raw))),
            None => Ok(default),
        }
    }

    pub fn required<T: FromStr>(&self, name: &'static str) -> Result<T, AnalyticsError> {
        let raw = self
            .params
            .get(name)
            .ok_or_else(|| AnalyticsError::invalid(name, "is required"))?;
        raw.trim()
            .parse()
            .map_err(|_| AnalyticsError::invalid(name, format!("cannot parse `{}`", raw)))
    }

    fn date(&self, name: &'static str) -> Result<Option<NaiveDate>, AnalyticsError> {
        self.params
            .get(name)
            .map(|raw| {
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map_err(|_| AnalyticsError::invalid(name, format!("expected YYYY-MM-DD, got `{}`", raw)))
            })
            .transpose()
    }
}

/// Start of `start_date` and end of `end_date`, both UTC.
fn date_bounds(
    query: &QueryParams,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), AnalyticsError> {
    let start = query
        .date("start_date")?
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    let end = query
        .date("end_date")?
        .and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999))
        .map(|dt| dt.and_utc());
    Ok((start, end))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Report as a JSON object with `"success": true` merged in.
fn success<T: Serialize>(report: &T) -> Result<Value, ServiceError> {
    match serde_json::to_value(report)? {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Ok(Value::Object(map))
        }
        other => Ok(json!({ "success": true, "data": other })),
    }
}

fn health(service: &AnalyticsService) -> Value {
    json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "forecast_available": service.forecasting_available(),
    })
}

/// Runs the report behind a route; `None` when no route matches.
fn dispatch(
    service: &AnalyticsService,
    segments: &[&str],
    query: &QueryParams,
) -> Result<Option<Value>, ServiceError> {
    let body = match segments {
        ["api", "analytics", "estatisticas", id] => {
            let (start, end) = date_bounds(query)?;
            success(&service.statistics(id, start, end)?)?
        }
        ["api", "analytics", "anomalias", id] => {
            let hours = query.get_or("hours", 24)?;
            let threshold = query.get_or("threshold", DEFAULT_ANOMALY_THRESHOLD)?;
            success(&service.anomalies(id, hours, threshold)?)?
        }
        ["api", "analytics", "tendencias", id] => success(&service.trends(id, query.get_or("days", 7)?)?)?,
        ["api", "analytics", "correlacao", id] => {
            success(&service.correlation(id, query.get_or("days", 7)?)?)?
        }
        ["api", "analytics", "conforto", id] => success(&service.comfort(id, query.get_or("hours", 24)?)?)?,
        ["api", "analytics", "resumo-dispositivo", id] => {
            success(&service.device_summary(id, query.get_or("days", 7)?)?)?
        }
        ["api", "analytics", "dispositivos"] => success(&service.list_devices()?)?,
        ["api", "analytics", "comparacao-clima", id] => {
            let latitude = query.required("latitude")?;
            let longitude = query.required("longitude")?;
            success(&service.compare_with_weather(id, latitude, longitude)?)?
        }
        ["api", "analytics", "previsao-clima"] => {
            let latitude = query.required("latitude")?;
            let longitude = query.required("longitude")?;
            let days = query.get_or("days", 7)?;
            let forecast = service.weather_forecast(latitude, longitude, days)?;
            json!({ "success": true, "previsao": forecast })
        }

        ["api", "indicators", "amplitude-termica", id] => {
            success(&service.thermal_amplitude(id, query.get_or("days", 7)?)?)?
        }
        ["api", "indicators", "taxa-umidade", id] => {
            success(&service.humidity_rate(id, query.get_or("days", 7)?)?)?
        }
        ["api", "indicators", "indice-fungos", id] => {
            success(&service.fungus_risk(id, query.get_or("days", 7)?)?)?
        }
        ["api", "indicators", "tempo-critico", id] => {
            success(&service.critical_time(id, query.get_or("days", 7)?)?)?
        }

        ["api", "forecast", "temperatura", id] => forecast_route(service, id, Quantity::Temperature, query)?,
        ["api", "forecast", "umidade", id] => forecast_route(service, id, Quantity::Humidity, query)?,
        ["api", "forecast", "padroes", id] => success(&service.patterns(id, query.get_or("days", 30)?)?)?,
        ["api", "forecast", "energia", id] => {
            let energy = &service.config().energy;
            let days = query.get_or("days", 30)?;
            let target = query.get_or("target_temp", energy.target_temp_c)?;
            let cost = query.get_or("cost_per_kwh", energy.cost_per_kwh)?;
            success(&service.energy(id, days, target, cost)?)?
        }
        ["api", "forecast", "completo", id] => {
            let history = query.get_or("days_history", 30)?;
            let horizon = query.get_or("days_forecast", 7)?;
            success(&service.full_forecast(id, history, horizon)?)?
        }

        ["api", "metrics", "global"] => success(&service.global_metrics()?)?,
        ["api", "metrics", "dispositivo", id] => {
            success(&service.device_metrics(id, query.get_or("limit", 100)?)?)?
        }

        _ => return Ok(None),
    };
    Ok(Some(body))
}

fn forecast_route(
    service: &AnalyticsService,
    device_id: &str,
    quantity: Quantity,
    query: &QueryParams,
) -> Result<Value, ServiceError> {
    let history = query.get_or("days_history", 30)?;
    let horizon = query.get_or("days_forecast", 7)?;
    success(&service.forecast(device_id, quantity, history, horizon)?)
}

/// Resolves a request URL (path plus query string) to a status code and JSON
/// body.
pub fn route(service: &AnalyticsService, url: &str) -> (u16, Value) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let query = QueryParams::parse(query);
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode)
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    if segments == ["health"] {
        return (200, health(service));
    }

    match dispatch(service, &segments, &query) {
        Ok(Some(body)) => (200, body),
        Ok(None) => (
            404,
            json!({
                "error": "Not found",
                "available_endpoints": ENDPOINTS,
            }),
        ),
        Err(e) => {
            let status = e.status_code();
            if status >= 500 {
                log::error!("{} failed: {}", path, e);
            } else {
                log::debug!("{} rejected: {}", path, e);
            }
            (status, json!({ "success": false, "error": e.to_string() }))
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port
pub fn start_endpoint_server(port: u16, service: AnalyticsService) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    log::info!("HTTP endpoint listening on http://0.0.0.0:{}", port);

    for request in server.incoming_requests() {
        let (status, body) = if *request.method() == tiny_http::Method::Get {
            route(&service, request.url())
        } else {
            (405, json!({ "error": "Method not allowed" }))
        };
        log::debug!("{} {} -> {}", request.method(), request.url(), status);

        if let Err(e) = request.respond(create_response(status, &body)) {
            log::warn!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json)
        .unwrap_or_else(|e| format!("{{\"success\": false, \"error\": \"{}\"}}", e));

    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::fixtures::*;
    use crate::model::Reading;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn service() -> AnalyticsService {
        let series = hourly_series(48, |i| (20.0 + 0.1 * i as f64, 60.0 + (i % 4) as f64));
        let store = MemoryStore::at(base_time() + Duration::hours(48));
        store.extend(series.readings().iter().cloned()).unwrap();
        AnalyticsService::new(Arc::new(store), ServiceConfig::default()).with_forecaster(None)
    }

    #[test]
    fn test_query_params_decode() {
        let q = QueryParams::parse("threshold=2.5&name=silo%20norte&flag&tz=America%2FRecife");
        assert_eq!(q.get_or("threshold", 3.0).unwrap(), 2.5);
        assert_eq!(q.get_or("hours", 24u32).unwrap(), 24);
        assert_eq!(q.required::<String>("name").unwrap(), "silo norte");
        assert_eq!(q.required::<String>("tz").unwrap(), "America/Recife");
        assert!(q.required::<f64>("latitude").is_err());
        assert!(q.get_or("flag", 1u32).is_err());
    }

    #[test]
    fn test_health() {
        let (status, body) = route(&service(), "/health");
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["forecast_available"], false);
    }

    #[test]
    fn test_unknown_route_is_404() {
        let (status, body) = route(&service(), "/site/123");
        assert_eq!(status, 404);
        assert!(body["available_endpoints"].as_array().unwrap().len() > 10);
    }

    #[test]
    fn test_trends_route_uses_defaults() {
        let (status, body) = route(&service(), &format!("/api/analytics/tendencias/{}", DEVICE));
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["temperatura"]["tendencia"], "aumentando");
    }

    #[test]
    fn test_out_of_range_query_is_400() {
        let (status, body) = route(&service(), &format!("/api/analytics/anomalias/{}?hours=500", DEVICE));
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);

        let (status, _) = route(&service(), &format!("/api/analytics/conforto/{}?hours=abc", DEVICE));
        assert_eq!(status, 400);
    }

    #[test]
    fn test_statistics_date_range() {
        let url = format!(
            "/api/analytics/estatisticas/{}?start_date=2025-03-10&end_date=2025-03-10",
            DEVICE
        );
        let (status, body) = route(&service(), &url);
        assert_eq!(status, 200);
        assert_eq!(body["total_leituras"], 24);

        let (status, _) = route(&service(), &format!("/api/analytics/estatisticas/{}?start_date=10/03/2025", DEVICE));
        assert_eq!(status, 400);
    }

    #[test]
    fn test_end_date_covers_last_second_of_day() {
        let store = MemoryStore::at(base_time() + Duration::days(2));
        store
            .extend(
                (0..4)
                    .map(|i| base_time() + Duration::hours(i))
                    .chain([base_time() + Duration::hours(24) - Duration::milliseconds(500)])
                    .map(|t| Reading::new(DEVICE, t, 21.0, 55.0)),
            )
            .unwrap();
        let service = AnalyticsService::new(Arc::new(store), ServiceConfig::default());

        let url = format!(
            "/api/analytics/estatisticas/{}?start_date=2025-03-10&end_date=2025-03-10",
            DEVICE
        );
        let (status, body) = route(&service, &url);
        assert_eq!(status, 200);
        assert_eq!(body["total_leituras"], 5);
    }

    #[test]
    fn test_forecast_without_capability_is_503() {
        let (status, _) = route(&service(), &format!("/api/forecast/temperatura/{}", DEVICE));
        assert_eq!(status, 503);
    }

    #[test]
    fn test_device_list_and_metrics() {
        let (status, body) = route(&service(), "/api/analytics/dispositivos");
        assert_eq!(status, 200);
        assert_eq!(body["total"], 1);
        assert_eq!(body["dispositivos"][0], DEVICE);

        let (status, _) = route(&service(), "/api/metrics/dispositivo/desconhecido");
        assert_eq!(status, 404);
        let (status, body) = route(&service(), "/api/metrics/global");
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
    }

    #[test]
    fn test_weather_routes_require_coordinates() {
        let (status, body) = route(&service(), "/api/analytics/previsao-clima?latitude=-8.05");
        assert_eq!(status, 400);
        assert!(body["error"].as_str().unwrap().contains("longitude"));
    }
}
