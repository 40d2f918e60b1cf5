use blogicum::{
    AppState,
    auth::bootstrap_superuser,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, Repository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::{error::Error, process::ExitCode, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pretty logs locally, JSON lines in production. `RUST_LOG` overrides the filter.
fn init_tracing(env: Env) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blogicum=debug,tower_http=info".into());

    match env {
        Env::Local => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
        Env::Production => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Creates the superuser named by `SUPERUSER_USERNAME`/`SUPERUSER_PASSWORD`, when both
/// are set.
async fn bootstrap_from_env(repo: &dyn Repository) -> Result<(), Box<dyn Error>> {
    let (Ok(username), Ok(password)) = (
        std::env::var("SUPERUSER_USERNAME"),
        std::env::var("SUPERUSER_PASSWORD"),
    ) else {
        return Ok(());
    };
    let email = std::env::var("SUPERUSER_EMAIL").unwrap_or_default();

    bootstrap_superuser(repo, &username, &password, &email).await?;
    Ok(())
}

async fn run(config: AppConfig) -> Result<(), Box<dyn Error>> {
    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await?;

    let postgres = PostgresRepository::new(pool);
    postgres.migrate().await?;
    tracing::info!("database migrations applied");

    bootstrap_from_env(&postgres).await?;
    let repo = Arc::new(postgres) as RepositoryState;

    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    )
    .await;

    // MinIO in docker-compose starts without a bucket.
    if config.env == Env::Local {
        if let Err(e) = s3_client.ensure_bucket_exists().await {
            tracing::warn!("{}", e);
        }
    }
    let storage = Arc::new(s3_client) as StorageState;

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        storage,
        config,
    });

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(Env::Local);
            tracing::error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.env);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}
