use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

use guardbot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting guardbot v{}", guardbot::VERSION);

    let config_path =
        std::env::var("GUARDBOT_CONFIG").unwrap_or_else(|_| "guardbot.toml".to_string());
    let config = Arc::new(BotConfig::load(&config_path).await?);

    let store: Arc<dyn UserRecordStore> =
        Arc::new(FileUserStore::open(&config.store_path).await?);

    let connection = TelegramConnection::new(TelegramConfig::from_env()?);
    let applier: Arc<dyn RestrictionApplier> = Arc::new(connection.api());

    // Remote leaderboard when repo coordinates and a token are configured,
    // otherwise a process-local board
    let document_store: Arc<dyn DocumentStore> =
        match (&config.leaderboard, &config.github_token) {
            (Some(board), Some(token)) => {
                info!(
                    "Leaderboard document: {}/{}:{}",
                    board.repo_owner, board.repo_name, board.file_path
                );
                Arc::new(GitHubDocumentStore::new(
                    token.clone(),
                    board.repo_owner.clone(),
                    board.repo_name.clone(),
                    board.file_path.clone(),
                    board.branch.clone(),
                ))
            }
            _ => {
                warn!("No leaderboard repo configured, points are local to this process");
                Arc::new(MemoryDocumentStore::new())
            }
        };
    let website_url = config
        .leaderboard
        .as_ref()
        .and_then(|board| board.website_url.clone());
    let board = Arc::new(Leaderboard::new(document_store, website_url));

    let mut bot = GuardBot::new(
        config,
        store,
        applier,
        board,
        Box::new(connection),
        SystemClock,
    );
    bot.start().await
}
