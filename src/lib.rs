pub mod resolver;

use std::sync::Arc;

use resolver::{CredentialStore, EngineCommand, ResolverConfig, TieredOrchestrator, YtDlpInvoker};

/// Orchestrator wired to the discovered yt-dlp engine and the static credential sources
pub fn build_orchestrator(config: ResolverConfig) -> TieredOrchestrator {
    let engine = EngineCommand::discover(&config);
    let credentials = CredentialStore::load(&config, None);
    TieredOrchestrator::new(Arc::new(YtDlpInvoker::new(engine)), credentials, config)
}
