mod app;
mod config;
mod cursor;
mod error;
mod state;
mod users;

use crate::config::AppConfig;
use crate::state::AppState;

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "user_accounts=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = config.listen_addr();
    tracing::info!(
        timeout_secs = config.request_timeout_secs,
        max_connections = config.db_max_connections,
        "starting user accounts service"
    );

    let (state, db) = AppState::init(&config).await?;

    // The unique index on username is created here; startup fails without it.
    sqlx::migrate!("./migrations").run(&db).await?;

    app::serve(app::build_app(state), &addr).await
}
