use argon2::Params;
use std::net::SocketAddr;
use tokio::{fs, sync::broadcast::error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use waste_tracker::{
    AppState, Config,
    backend::BackendClient,
    bus::ChangeBus,
    router,
    session::{Argon2Verifier, SessionManager},
    storage::{KvStore, UserStore},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env()?;
    if let Some(parent) = config.data_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let store = UserStore::new(KvStore::open(&config.data_path).await);
    let verifier = match config.argon2_memory_kib {
        Some(kib) => {
            let params = Params::new(kib, Params::DEFAULT_T_COST, 1, None)
                .map_err(|err| format!("invalid ARGON2_MEMORY_KIB: {err}"))?;
            Argon2Verifier::with_params(params)
        }
        None => Argon2Verifier::default(),
    };
    let backend = BackendClient::from_config(&config)?;
    if config.classifier_url.is_none() {
        warn!("CLASSIFIER_URL not set, classifications will be simulated");
    }

    let state = AppState::new(store, SessionManager::new(verifier), backend);
    spawn_change_logger(&state.bus);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(data_path = %config.data_path.display(), "listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn spawn_change_logger(bus: &ChangeBus) {
    let mut changes = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) => debug!(revision = event.revision, "user data changed"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "change listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
