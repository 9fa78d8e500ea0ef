//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        concept_map_llm::OpenAiConceptMapAdapter, db::DbAdapter,
        exam_guide_llm::OpenAiExamGuideAdapter, flashcards_llm::OpenAiFlashcardsAdapter,
        parse_api::ParseApiAdapter, paypal::PayPalAdapter, pdf_local::LocalPdfExtractor,
        quiz_llm::OpenAiQuizAdapter, summary_llm::OpenAiSummaryAdapter, ModelCatalog,
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        exam::{generate_exam_handler, generate_exam_ultra_handler},
        middleware::require_auth,
        process::{
            process_pdf_eco_handler, process_pdf_handler, process_pdf_ocr_handler,
            process_pdf_premium_handler, process_pdf_raw_handler,
        },
        rest::{
            consume_credits_handler, credits_handler, get_session_handler, list_sessions_handler,
            paypal_capture_handler, ApiDoc,
        },
        state::AppState,
        stripe::stripe_webhook_handler,
        tasks::{
            start_ultra_flashcards_handler, start_ultra_summary_handler, task_status_handler,
        },
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use studius_core::ports::{DocumentParsingService, PaymentService};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);
    let models = ModelCatalog {
        standard: config.standard_model.clone(),
        eco: config.eco_model.clone(),
        premium: config.premium_model.clone(),
    };

    let summary_adapter = Arc::new(OpenAiSummaryAdapter::new(
        openai_client.clone(),
        models.clone(),
    ));
    let flashcards_adapter = Arc::new(OpenAiFlashcardsAdapter::new(
        openai_client.clone(),
        models.clone(),
    ));
    let quiz_adapter = Arc::new(OpenAiQuizAdapter::new(openai_client.clone(), models.clone()));
    let concept_map_adapter = Arc::new(OpenAiConceptMapAdapter::new(
        openai_client.clone(),
        models.clone(),
    ));
    let exam_guide_adapter = Arc::new(OpenAiExamGuideAdapter::new(openai_client, models));

    // The hosted parsing service and PayPal are optional integrations: without
    // their credentials the server still starts and the routes that need them
    // answer with a configuration error.
    let parse_adapter: Option<Arc<dyn DocumentParsingService>> = match &config.parse_api_key {
        Some(key) => Some(Arc::new(
            ParseApiAdapter::new(key.clone(), config.parse_api_base_url.clone())
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        )),
        None => {
            warn!("LLAMA_CLOUD_API_KEY not set; OCR and premium processing are disabled");
            None
        }
    };
    let payment_adapter: Option<Arc<dyn PaymentService>> =
        match (&config.paypal_client_id, &config.paypal_client_secret) {
            (Some(id), Some(secret)) => Some(Arc::new(
                PayPalAdapter::new(
                    id.clone(),
                    secret.clone(),
                    config.paypal_api_base_url.clone(),
                )
                .map_err(|e| ApiError::Internal(e.to_string()))?,
            )),
            _ => {
                warn!("PayPal credentials not set; order capture is disabled");
                None
            }
        };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        parse_adapter,
        local_parse_adapter: Arc::new(LocalPdfExtractor::new()),
        summary_adapter,
        flashcards_adapter,
        quiz_adapter,
        concept_map_adapter,
        exam_guide_adapter,
        payment_adapter,
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes: account endpoints and the Stripe webhook (which carries
    // its own signature-based authentication).
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/api/stripe/webhook", post(stripe_webhook_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/process-pdf", post(process_pdf_handler))
        .route("/api/process-pdf-eco", post(process_pdf_eco_handler))
        .route("/api/process-pdf-ocr", post(process_pdf_ocr_handler))
        .route("/api/process-pdf-premium", post(process_pdf_premium_handler))
        .route("/api/process-pdf-raw", post(process_pdf_raw_handler))
        .route("/api/generate-exam", post(generate_exam_handler))
        .route("/api/generate-exam-ultra", post(generate_exam_ultra_handler))
        .route(
            "/api/generate-ultra-flashcards",
            post(start_ultra_flashcards_handler),
        )
        .route(
            "/api/generate-ultra-summary",
            post(start_ultra_summary_handler),
        )
        .route("/api/tasks/{task_id}", get(task_status_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/sessions/{session_id}", get(get_session_handler))
        .route("/api/credits", get(credits_handler))
        .route("/api/credits/consume", post(consume_credits_handler))
        .route("/api/paypal/capture", post(paypal_capture_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
