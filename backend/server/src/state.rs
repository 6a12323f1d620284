use std::sync::Arc;

use tracing::warn;

use super::{
    config::{Config, SESSION_SECRET, StoreBackend, read_secret},
    database::init_redis,
    memory::MemoryStore,
    signing::CookieSigner,
    store::Store,
};

pub struct AppState {
    pub config: Config,
    pub signer: CookieSigner,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let signer = CookieSigner::new(read_secret(SESSION_SECRET).as_bytes())
            .expect("Secrets misconfigured!");

        let store: Arc<dyn Store> = match config.store {
            StoreBackend::Redis => {
                Arc::new(init_redis(&config.redis_url).await.expect("Redis unreachable!"))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory store, data is lost on shutdown");
                Arc::new(MemoryStore::new())
            }
        };

        Arc::new(Self {
            config,
            signer,
            store,
        })
    }
}
