use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sos_cidadao::chat::{AssistantReply, AssistantRequest};
use sos_cidadao::geolocation::FixedPosition;
use sos_cidadao::postal_code::{self, InputKind};
use sos_cidadao::types::EmergencyNumber;
use sos_cidadao::{
    AddressResult, AliasTable, AssistantError, CityContacts, CompletionGateway, Config,
    ContactDirectory, Coordinates, GeolocationError, GeolocationResult, GeolocationService,
    LookupError, NominatimClient, SmartLookup, ViaCepClient, emergency_numbers,
};

/// Application state shared across all requests
#[derive(Clone)]
struct AppState {
    directory: Arc<ContactDirectory>,
    aliases: Arc<AliasTable>,
    resolver: Arc<ViaCepClient>,
    geocoder: Arc<NominatimClient>,
    gateway: Arc<CompletionGateway>,
    metrics: Arc<Metrics>,
}

impl AppState {
    fn from_config(config: &Config) -> Result<Self> {
        let directory = config
            .load_directory()
            .context("Failed to load contact directory")?;
        tracing::info!(
            cities = directory.city_count(),
            ranges = directory.ranges().len(),
            "contact directory loaded"
        );

        Ok(Self {
            directory: Arc::new(directory),
            aliases: Arc::new(AliasTable::default()),
            resolver: Arc::new(ViaCepClient::new(
                &config.viacep_base_url,
                config.http_timeout,
            )?),
            geocoder: Arc::new(NominatimClient::new(
                &config.nominatim_base_url,
                &config.nominatim_user_agent,
                config.http_timeout,
            )?),
            gateway: Arc::new(CompletionGateway::new(
                &config.llm_base_url,
                &config.llm_model,
                config.llm_api_key.clone(),
                config.http_timeout,
            )?),
            metrics: Arc::new(Metrics::new()),
        })
    }
}

/// Server metrics
struct Metrics {
    total_requests: AtomicU64,
    requests_in_flight: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            requests_in_flight: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count a request as started; the guard marks it finished on drop
    fn track(&self) -> RequestGuard<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
        RequestGuard(&self.requests_in_flight)
    }
}

/// RAII guard for tracking in-flight requests
struct RequestGuard<'a>(&'a AtomicU64);

impl<'a> Drop for RequestGuard<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sos_cidadao=info,server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    if config.llm_api_key.is_none() {
        tracing::warn!("LLM_API_KEY not set, /chat-ai will answer with an error");
    }

    let state = AppState::from_config(&config)?;
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Build the Axum application with routes and middleware
fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/lookup", post(lookup))
        .route("/api/contacts/:cep", get(contacts))
        .route("/api/emergency", get(emergency))
        .route("/api/reverse", post(reverse))
        .route("/api/metrics", get(get_metrics))
        .route("/chat-ai", post(chat_ai))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Resolve free text to an address plus its contact bundle
async fn lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, ApiError> {
    let _guard = state.metrics.track();
    tracing::info!(query = %request.query, "lookup");

    let smart = SmartLookup::new(state.resolver.as_ref(), state.aliases.as_ref());
    match smart.resolve(&request.query).await {
        Ok(address) => {
            let contacts = state.directory.lookup(&address.postal_code);
            Ok(Json(LookupResponse {
                success: true,
                data: address,
                contacts,
            }))
        }
        Err(e) => {
            // Directory ranges need no network, so a well-formed postal code keeps its contacts
            if postal_code::detect_input_type(&request.query) == InputKind::PostalCode
                && let Some(contacts) = state.directory.lookup(&request.query)
            {
                tracing::warn!(error = %e, "address resolution failed, serving directory contacts");
                return Err(ApiError::WithContacts(e, Box::new(contacts)));
            }
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
struct LookupRequest {
    query: String,
}

#[derive(Serialize)]
struct LookupResponse {
    success: bool,
    data: AddressResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    contacts: Option<CityContacts>,
}

/// Directory lookup by postal code
async fn contacts(
    State(state): State<AppState>,
    Path(cep): Path<String>,
) -> Result<Json<ContactsResponse>, ApiError> {
    let _guard = state.metrics.track();

    let contacts = state
        .directory
        .lookup(&cep)
        .ok_or_else(|| ApiError::from(LookupError::InvalidInput(cep.clone())))?;

    Ok(Json(ContactsResponse {
        success: true,
        postal_code: postal_code::digits_only(&cep),
        data: contacts,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactsResponse {
    success: bool,
    postal_code: String,
    data: CityContacts,
}

async fn emergency(State(state): State<AppState>) -> Json<EmergencyResponse> {
    let _guard = state.metrics.track();
    Json(EmergencyResponse {
        success: true,
        data: emergency_numbers(),
    })
}

#[derive(Serialize)]
struct EmergencyResponse {
    success: bool,
    data: &'static [EmergencyNumber],
}

/// Reverse-geocode a position reported by the client
async fn reverse(
    State(state): State<AppState>,
    Json(request): Json<ReverseRequest>,
) -> Result<Json<ReverseResponse>, ApiError> {
    let _guard = state.metrics.track();

    let coordinates = Coordinates::new(request.latitude, request.longitude).ok_or_else(|| {
        ApiError::BadRequest("latitude or longitude out of range".to_string())
    })?;
    let provider = FixedPosition(coordinates);
    let result = GeolocationService::new(&provider, state.geocoder.as_ref(), &state.aliases)
        .describe(coordinates)
        .await?;

    let contacts = result
        .postal_code
        .as_deref()
        .and_then(|cep| state.directory.lookup(cep));

    Ok(Json(ReverseResponse {
        success: true,
        data: result,
        contacts,
    }))
}

#[derive(Deserialize)]
struct ReverseRequest {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize)]
struct ReverseResponse {
    success: bool,
    data: GeolocationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    contacts: Option<CityContacts>,
}

/// Assistant gateway: answers `{ response }` or `{ error }`
async fn chat_ai(
    State(state): State<AppState>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Response {
    let _guard = state.metrics.track();

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "rejected chat-ai body");
            return chat_error(rejection.status(), rejection.body_text());
        }
    };
    if request.message.trim().is_empty() {
        return chat_error(StatusCode::BAD_REQUEST, MISSING_MESSAGE.to_string());
    }

    match state.gateway.complete(&request).await {
        Ok(text) => Json(AssistantReply {
            response: Some(text),
            error: None,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "chat-ai error");
            let status = match e {
                AssistantError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                AssistantError::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            chat_error(status, e.user_message().to_string())
        }
    }
}

const MISSING_MESSAGE: &str = "Mensagem é obrigatória";

fn chat_error(status: StatusCode, message: String) -> Response {
    let body = AssistantReply {
        response: None,
        error: Some(message),
    };
    (status, Json(body)).into_response()
}

/// Get server metrics
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        total_requests: state.metrics.total_requests.load(Ordering::Relaxed),
        requests_in_flight: state.metrics.requests_in_flight.load(Ordering::Relaxed),
        uptime_seconds: state.metrics.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    total_requests: u64,
    requests_in_flight: u64,
    uptime_seconds: u64,
}

/// API error types
enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    /// Resolution failed but the postal code still maps to a contact bundle
    WithContacts(LookupError, Box<CityContacts>),
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        let message = e.user_message().to_string();
        match e {
            LookupError::InvalidInput(_) => ApiError::BadRequest(message),
            LookupError::NotFound => ApiError::NotFound(message),
            LookupError::Resolution(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<GeolocationError> for ApiError {
    fn from(e: GeolocationError) -> Self {
        ApiError::BadGateway(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, contacts) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            ApiError::WithContacts(e, contacts) => {
                let status = match e {
                    LookupError::Resolution(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::NOT_FOUND,
                };
                (status, e.user_message().to_string(), Some(contacts))
            }
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message,
            "contacts": contacts,
        }));

        (status, body).into_response()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(api_key: Option<&str>) -> AppState {
        let config = Config {
            llm_api_key: api_key.map(str::to_string),
            ..Config::default()
        };
        AppState::from_config(&config).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(build_app(test_state(None)), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_contacts_for_known_range() {
        let (status, body) = send(
            build_app(test_state(None)),
            get_request("/api/contacts/01310-100"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["postalCode"], "01310100");
        assert_eq!(body["data"]["city"], "São Paulo");
        assert_eq!(body["data"]["prefeitura"]["phones"][0]["number"], "156");
    }

    #[tokio::test]
    async fn test_contacts_fallback_and_invalid() {
        let app = build_app(test_state(None));

        let (status, body) = send(app.clone(), get_request("/api/contacts/99999999")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["city"], "Sua Cidade");

        let (status, body) = send(app, get_request("/api/contacts/1234")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_emergency_numbers() {
        let (status, body) =
            send(build_app(test_state(None)), get_request("/api/emergency")).await;
        assert_eq!(status, StatusCode::OK);
        let numbers: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["number"].as_str().unwrap())
            .collect();
        assert_eq!(numbers, ["192", "190", "193", "194", "199"]);
    }

    #[tokio::test]
    async fn test_empty_lookup_is_bad_request() {
        let (status, body) = send(
            build_app(test_state(None)),
            post_json("/api/lookup", serde_json::json!({ "query": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_reverse_rejects_out_of_range() {
        let (status, _) = send(
            build_app(test_state(None)),
            post_json(
                "/api/reverse",
                serde_json::json!({ "latitude": 120.0, "longitude": 0.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_requires_message() {
        let (status, body) = send(
            build_app(test_state(Some("key"))),
            post_json("/chat-ai", serde_json::json!({ "message": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Mensagem é obrigatória");
    }

    #[tokio::test]
    async fn test_chat_missing_message_field() {
        let (status, body) = send(
            build_app(test_state(Some("key"))),
            post_json("/chat-ai", serde_json::json!({ "cep": "01310100" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Mensagem é obrigatória");
    }

    #[tokio::test]
    async fn test_chat_accepts_loose_history() {
        let app = build_app(test_state(None));
        let bodies = [
            serde_json::json!({ "message": "oi", "conversationHistory": null }),
            serde_json::json!({
                "message": "oi",
                "conversationHistory": [{ "role": "system", "content": "x" }]
            }),
        ];
        // Without an API key the gateway answers before any network call
        for body in bodies {
            let (status, body) = send(app.clone(), post_json("/chat-ai", body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], "API key não configurada");
        }
    }

    #[tokio::test]
    async fn test_chat_malformed_body_is_json_error() {
        let request = Request::post("/chat-ai")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(build_app(test_state(None)), request).await;
        assert!(status.is_client_error());
        assert!(body["error"].is_string());
        assert!(body.get("response").is_none());
    }

    #[tokio::test]
    async fn test_chat_without_api_key() {
        let (status, body) = send(
            build_app(test_state(None)),
            post_json(
                "/chat-ai",
                serde_json::json!({ "message": "sem luz", "cep": "01310100" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("response").is_none());
        assert_eq!(body["error"], AssistantError::MissingApiKey.user_message());
    }

    #[tokio::test]
    async fn test_metrics_count_requests() {
        let state = test_state(None);
        let app = build_app(state.clone());

        send(app.clone(), get_request("/api/emergency")).await;
        send(app.clone(), get_request("/api/contacts/20040020")).await;

        let (status, body) = send(app, get_request("/api/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_requests"], 2);
        assert_eq!(body["requests_in_flight"], 0);
    }
}
