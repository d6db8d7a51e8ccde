use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use interview_engine::analyzer::Analyzer;
use interview_engine::catalog::FileCatalog;
use interview_engine::config::EngineConfig;
use interview_engine::executor::Executor;
use interview_engine::feedback::NoFeedback;
use interview_engine::languages::LanguageRegistry;
use interview_engine::runner::ProcessRunner;
use interview_engine::server::{self, AppState};
use interview_engine::session::{SessionRegistry, SessionServices};
use interview_engine::store::{LogSessionStore, RedisSessionStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("interview_engine=info".parse()?),
        )
        .init();

    let config = EngineConfig::from_env()?;
    info!("Starting interview engine...");

    let languages = LanguageRegistry::load(config.languages_path.as_deref())?;
    info!("Loaded languages: {:?}", languages.supported());

    let catalog = FileCatalog::load(config.problems_path.as_deref())?;
    info!("Loaded {} problems", catalog.problem_count());

    let store: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisSessionStore::connect(url).await?),
        None => {
            info!("REDIS_URL not set; completion records are only logged");
            Arc::new(LogSessionStore)
        }
    };

    let executor = Executor::new(
        Arc::new(ProcessRunner::default()),
        Arc::new(languages),
        config.execution.clone(),
    );

    let services = Arc::new(SessionServices {
        catalog: Arc::new(catalog),
        executor: Arc::new(executor),
        analyzer: Analyzer::new(),
        feedback: Arc::new(NoFeedback),
        store,
        registry: Arc::new(SessionRegistry::new()),
        hints: config.hints.clone(),
        feedback_timeout: config.feedback_timeout,
    });

    server::serve(
        config.bind_addr,
        AppState {
            services,
            idle_tick: config.idle_tick,
        },
    )
    .await
}
