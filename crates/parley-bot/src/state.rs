//! Application state wiring the services together.
//!
//! Core services are generic over repository/transport traits; AppState
//! pins them to the concrete infra implementations. The orchestrator
//! owns its own resolver and gate; the router holds separate instances
//! of both for the command paths (repositories are cheap handles onto
//! the shared pool).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use parley_core::attachment::AttachmentIngestor;
use parley_core::gate::AccessGate;
use parley_core::orchestrator::ConversationOrchestrator;
use parley_core::session::SessionResolver;
use parley_infra::config::load_bot_config;
use parley_infra::extract::DocumentTextExtractor;
use parley_infra::openai::image::OpenAiImageGenerator;
use parley_infra::openai::build_provider;
use parley_infra::sqlite::{
    DatabasePool, SqliteChatRepository, SqliteSubscriptionRepository, SqliteUserRepository,
};
use parley_infra::telegram::TelegramApi;
use parley_types::config::BotConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteOrchestrator = ConversationOrchestrator<
    SqliteUserRepository,
    SqliteChatRepository,
    SqliteSubscriptionRepository,
    TelegramApi,
    DocumentTextExtractor,
>;

pub type ConcreteResolver = SessionResolver<SqliteUserRepository, SqliteChatRepository>;
pub type ConcreteGate = AccessGate<SqliteSubscriptionRepository>;

/// What the bot is waiting for from a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// `/new` asked for a chat name.
    AwaitChatName,
    /// `/generate` asked for an image description.
    AwaitImagePrompt,
}

/// Shared application state used by the router.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: Arc<BotConfig>,
    pub api: TelegramApi,
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub resolver: Arc<ConcreteResolver>,
    pub gate: Arc<ConcreteGate>,
    pub users: Arc<SqliteUserRepository>,
    pub chats: Arc<SqliteChatRepository>,
    pub image_gen: Arc<OpenAiImageGenerator>,
    /// Payment provider token; payments are disabled when absent.
    pub payment_provider_token: Option<String>,
    /// Pending prompt per platform chat. Registering replaces.
    pub continuations: Arc<DashMap<i64, Continuation>>,
    /// Cancellation handle of the in-flight turn per platform chat.
    /// Arc-wrapped so completion can remove its own entry without racing
    /// a replacement turn (pointer identity check).
    pub running: Arc<DashMap<i64, Arc<CancellationToken>>>,
    /// Plain HTTP client for fetching generated image URLs.
    pub http: reqwest::Client,
}

impl AppState {
    /// Initialize the application state: connect to DB, wire services.
    ///
    /// Secrets come from the environment: `TELEGRAM_BOT_TOKEN` (required),
    /// the provider API key (`OPENAI_API_KEY` or `FIREWORKS_API_KEY`), and
    /// `TELEGRAM_PAYMENT_PROVIDER_TOKEN` (optional, enables `/purchase`).
    pub async fn init(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_bot_config(&data_dir).await;

        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .context("TELEGRAM_BOT_TOKEN is not set")?;
        let api_key_var = match config.model.provider.as_str() {
            "fireworks" => "FIREWORKS_API_KEY",
            _ => "OPENAI_API_KEY",
        };
        let api_key = std::env::var(api_key_var)
            .with_context(|| format!("{api_key_var} is not set"))?;
        let payment_provider_token = std::env::var("TELEGRAM_PAYMENT_PROVIDER_TOKEN").ok();

        let db_url = format!("sqlite://{}?mode=rwc", data_dir.join("parley.db").display());
        let pool = DatabasePool::new(&db_url).await?;

        let api = TelegramApi::new(SecretString::from(bot_token));
        let provider = build_provider(&config.model, &api_key)?;
        let image_gen = OpenAiImageGenerator::new(
            SecretString::from(api_key),
            config.image_gen.clone(),
        );

        let orchestrator = ConversationOrchestrator::new(
            SessionResolver::new(
                SqliteUserRepository::new(pool.clone()),
                SqliteChatRepository::new(pool.clone()),
                config.strings.default_chat_name.clone(),
            ),
            AccessGate::new(SqliteSubscriptionRepository::new(pool.clone())),
            SqliteChatRepository::new(pool.clone()),
            AttachmentIngestor::new(
                api.clone(),
                DocumentTextExtractor,
                config.files.max_file_size_mb,
            ),
            provider,
            api.clone(),
            config.model.clone(),
            config.strings.clone(),
        );

        let resolver = SessionResolver::new(
            SqliteUserRepository::new(pool.clone()),
            SqliteChatRepository::new(pool.clone()),
            config.strings.default_chat_name.clone(),
        );
        let gate = AccessGate::new(SqliteSubscriptionRepository::new(pool.clone()));

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to create reqwest client");

        Ok(Self {
            data_dir,
            config: Arc::new(config),
            api,
            orchestrator: Arc::new(orchestrator),
            resolver: Arc::new(resolver),
            gate: Arc::new(gate),
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            chats: Arc::new(SqliteChatRepository::new(pool.clone())),
            image_gen: Arc::new(image_gen),
            payment_provider_token,
            continuations: Arc::new(DashMap::new()),
            running: Arc::new(DashMap::new()),
            http,
        })
    }

    /// Is this user id allowed to run admin commands?
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.config.admin_user_ids.contains(&user_id)
    }
}
