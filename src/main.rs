use std::sync::Arc;

use smart_mail::api::{AppState, app_routes};
use smart_mail::config::{ConfigMode, ServerSettings};
use smart_mail::llm::{LlmConfig, create_provider};
use smart_mail::mail::GraphMailClient;
use smart_mail::pipeline::{Classifier, LlmClassifier};
use smart_mail::store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    // A missing .env is fine; the environment may already be set.
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    run().await?;
    Ok(())
}

async fn run() -> smart_mail::error::Result<()> {
    let settings = ServerSettings::from_env()?;
    eprintln!("📬 Smart Mail v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mail API: {}", settings.graph_api_base);
    eprintln!("   Config mode: {:?}", settings.config_mode);

    // ── Classifier ───────────────────────────────────────────────────────
    let classifier: Option<Arc<dyn Classifier>> = match &settings.classifier {
        Some(classifier_settings) => {
            let llm = create_provider(&LlmConfig::from(classifier_settings))?;
            eprintln!("   Classifier: {}", llm.model_name());
            Some(Arc::new(LlmClassifier::new(llm)))
        }
        None => {
            eprintln!("   Classifier: disabled (set OPENAI_API_KEY to enable)");
            None
        }
    };

    // ── Persistence ──────────────────────────────────────────────────────
    let profile_store = store::open_store(&settings).await?;
    match &profile_store {
        Some(s) => eprintln!("   Persistence: {}", s.backend_name()),
        None => eprintln!("   Persistence: disabled"),
    }
    if settings.config_mode == ConfigMode::PerUser {
        tracing::warn!(
            "Per-user config trusts bearer token claims without signature verification"
        );
        if profile_store.is_none() {
            tracing::warn!("Per-user config mode without persistence; /config will return 503");
        }
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState::new(
        settings.default_mail_config(),
        Arc::new(GraphMailClient::new(settings.graph_api_base.clone())),
    )
    .with_classifier(classifier)
    .with_store(profile_store)
    .with_config_mode(settings.config_mode);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", settings.port)).await?;
    tracing::info!(port = settings.port, "Smart Mail backend running");
    axum::serve(listener, app_routes(state)).await?;

    Ok(())
}
