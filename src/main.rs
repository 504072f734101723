//! Glossary Governance API
//!
//! Review workflow for an organizational glossary: contributors propose new
//! terms or edits, reviewers approve, reject or send them back, and every
//! approved change lands in the term's version ledger with an audit trail.
//!
//! Storage is PostgreSQL when DATABASE_URL is set, otherwise an in-memory
//! store (development only; nothing survives a restart).

mod auth;
mod config;
mod error;
mod governance;
mod models;
mod proposal;
mod routes;
mod state;
mod store;
mod term;

use crate::auth::{Identity, JwtKeys, Role};
use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use crate::store::{GlossaryStore, MemoryStore, PgStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("issue-token") {
        return issue_token(args.next(), args.next());
    }

    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Glossary Governance API...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let store: Arc<dyn GlossaryStore> = match &settings.database {
        Some(database) => {
            let store = PgStore::connect(database).await?;
            store.init_schema().await?;
            Arc::new(store)
        }
        None => {
            warn!("⚠️  DATABASE_URL not set, using the in-memory store (data is lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    if settings.auth.uses_dev_secret() {
        warn!("⚠️  JWT_SECRET not set, using default (INSECURE - set in production!)");
    }
    let jwt = JwtKeys::new(&settings.auth.jwt_secret, settings.auth.token_ttl_minutes);
    let state = Arc::new(AppState::new(store, jwt));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Proposals ───");
    info!("   POST   /api/proposals                      - Submit a proposal");
    info!("   GET    /api/proposals?status=              - Review queue");
    info!("   GET    /api/proposals/{{id}}                 - Proposal with audit trail");
    info!("   DELETE /api/proposals/{{id}}                 - Delete (Admin only)");
    info!("   POST   /api/proposals/{{id}}/start-review    - Pick up for review");
    info!("   POST   /api/proposals/{{id}}/request-changes - Send back to submitter");
    info!("   POST   /api/proposals/{{id}}/resubmit        - Resubmit after changes");
    info!("   POST   /api/proposals/{{id}}/approve         - Approve (optionally with edits)");
    info!("   POST   /api/proposals/{{id}}/reject          - Reject");
    info!("   POST   /api/proposals/{{id}}/withdraw        - Withdraw (submitter only)");
    info!("");
    info!("   ─── Terms ───");
    info!("   GET    /api/terms                          - List/search terms");
    info!("   POST   /api/terms                          - Create directly (Admin only)");
    info!("   GET    /api/terms/{{id}}                     - Get a term");
    info!("   PUT    /api/terms/{{id}}                     - Edit content (Admin only)");
    info!("   PATCH  /api/terms/{{id}}/metadata            - Status/visibility/owner (Admin only)");
    info!("   GET    /api/terms/{{id}}/versions            - Version history");
    info!("   GET    /api/terms/{{id}}/versions/{{n}}        - One past version");
    info!("   GET    /api/terms/{{id}}/compare?from=&to=   - Compare two versions");
    info!("   GET    /api/categories                     - Categories with term counts");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Print a bearer token signed with the configured secret.
///
/// Usage: `glossary-governance issue-token <user-id> [role]`
fn issue_token(user_id: Option<String>, role: Option<String>) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let user_id = user_id.ok_or_else(|| anyhow::anyhow!("usage: glossary-governance issue-token <user-id> [role]"))?;
    let role: Role = role
        .as_deref()
        .unwrap_or("viewer")
        .parse()
        .map_err(anyhow::Error::msg)?;

    let keys = JwtKeys::new(&settings.auth.jwt_secret, settings.auth.token_ttl_minutes);
    println!("{}", keys.issue(&Identity::new(user_id, role))?);
    Ok(())
}

/// Initialize tracing with structured logging.
///
/// `LOG_FORMAT=json` switches to one JSON object per line for log shippers.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,glossary_governance=debug,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(fmt::layer().json().with_current_span(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
