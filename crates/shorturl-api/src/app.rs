//! Process wiring.
//!
//! [`start`] builds the event store and outbox, the repository and its
//! in-process broker, the outbox relay, the external broker clients and the
//! validation services, and spawns every long-running loop. [`router`] builds
//! the HTTP surface over the resulting [`AppState`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use shorturl_broker::backoff::ReconnectPolicy;
use shorturl_broker::connection::ManagedConnection;
use shorturl_broker::memory::InMemoryTransport;
use shorturl_broker::receiver::BrokerReceiver;
use shorturl_broker::sender::BrokerSender;
use shorturl_core::broker::{Broker, Subscriber};
use shorturl_core::clock::{Clock, SystemClock};
use shorturl_core::error::DomainError;
use shorturl_core::event::DomainEvent;
use shorturl_core::outbox::Outbox;
use shorturl_core::repository::Repository;
use shorturl_core::rng::{DeterministicRng, StdRandom};
use shorturl_core::serializer::Serializer;
use shorturl_core::shutdown::Shutdown;
use shorturl_core::store::EventStore;
use shorturl_event_store::memory::{InMemoryEventStore, InMemoryOutbox};
use shorturl_event_store::pg_event_store::PgEventStore;
use shorturl_event_store::pg_outbox::PgOutbox;
use shorturl_event_store::schema::MIGRATOR;
use shorturl_relay::redirector::{Redirector, RedirectorConfig};
use shorturl_shortener::domain::events::{UrlEvent, serializer};
use shorturl_validator::blocklist::BlocklistValidator;
use shorturl_validator::pipeline::Pipeline;
use shorturl_validator::reachability::ReachabilityValidator;
use shorturl_validator::saver::VerificationSaver;
use shorturl_validator::schema::SchemaValidator;
use shorturl_validator::service::ValidatorService;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::routes;
use crate::state::AppState;

/// Builds the HTTP router.
pub fn router(state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/short-urls", routes::short_urls::router())
        .nest(
            "/api/v1/load-balanced-urls",
            routes::load_balanced_urls::router(),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Logs every saved event.
struct EventLog;

#[async_trait]
impl Subscriber<UrlEvent> for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn handle(&self, event: UrlEvent) -> Result<(), DomainError> {
        info!(
            entity_id = %event.entity_id(),
            version = event.version(),
            event_type = event.event_type(),
            "event saved"
        );
        Ok(())
    }
}

/// The running background services and the state handlers share.
#[derive(Debug)]
pub struct Services {
    /// State for the HTTP handlers.
    pub state: AppState,
    tasks: JoinSet<()>,
}

impl Services {
    /// Waits up to `grace` for the background loops to finish after shutdown
    /// was triggered, then aborts whatever is left.
    pub async fn stop(mut self, grace: Duration) {
        let drained = tokio::time::timeout(grace, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = self.tasks.len(), "background tasks did not stop in time, aborting");
            self.tasks.abort_all();
        }
    }
}

async fn storage(
    config: &AppConfig,
    serializer: &Arc<Serializer<UrlEvent>>,
) -> Result<(Arc<dyn EventStore<UrlEvent>>, Arc<dyn Outbox>), AppError> {
    if let Some(database_url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        info!("using PostgreSQL event store");
        let store: Arc<dyn EventStore<UrlEvent>> =
            Arc::new(PgEventStore::new(pool.clone(), Arc::clone(serializer)));
        let outbox: Arc<dyn Outbox> = Arc::new(PgOutbox::new(pool, config.outbox_batch_size));
        Ok((store, outbox))
    } else {
        info!("DATABASE_URL not set, using in-memory event store");
        let staging = Arc::new(InMemoryOutbox::new());
        let store: Arc<dyn EventStore<UrlEvent>> = Arc::new(InMemoryEventStore::with_outbox(
            Arc::clone(&staging),
            Arc::clone(serializer),
        ));
        let outbox: Arc<dyn Outbox> = staging;
        Ok((store, outbox))
    }
}

/// Wires every component and starts the background loops. They run until
/// `shutdown` fires.
///
/// # Errors
///
/// Returns `AppError` if the database, the broker or a validator cannot be
/// set up.
pub async fn start(config: &AppConfig, shutdown: &Shutdown) -> Result<Services, AppError> {
    let serializer = Arc::new(serializer());
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock);
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> =
        Arc::new(Mutex::new(StdRandom::from_entropy()));

    let (store, outbox) = storage(config, &serializer).await?;
    let broker: Arc<Broker<UrlEvent>> = Arc::new(Broker::new());
    broker.subscribe(Arc::new(EventLog), &[]);
    let repository = Repository::new(store, broker);

    let connection = ManagedConnection::connect(
        Arc::new(InMemoryTransport::new()),
        ReconnectPolicy::default(),
        shutdown.clone(),
    )
    .await?;
    let topics = &config.topics;

    let pipeline = Pipeline::new()
        .with(Arc::new(SchemaValidator))
        .with(Arc::new(BlocklistValidator::new(&config.blocked_hosts)))
        .with(Arc::new(ReachabilityValidator::new(config.reachability_timeout)?));

    let redirector = Redirector::new(
        outbox,
        Arc::new(BrokerSender::new(Arc::clone(&connection), topics.events.as_str())),
        RedirectorConfig {
            interval: config.relay_interval,
        },
    );
    let validator = ValidatorService::new(
        Arc::new(BrokerReceiver::new(Arc::clone(&connection), topics.events.as_str())),
        Arc::new(BrokerSender::new(
            Arc::clone(&connection),
            topics.verifications.as_str(),
        )),
        Arc::new(pipeline),
        Arc::clone(&serializer),
        clock.clone(),
    );
    let saver = VerificationSaver::new(
        Arc::new(BrokerReceiver::new(connection, topics.verifications.as_str())),
        repository.clone(),
        serializer,
    );

    let mut tasks = JoinSet::new();
    let relay_shutdown = shutdown.clone();
    tasks.spawn(async move {
        redirector.start(relay_shutdown).await;
    });
    let validator_shutdown = shutdown.clone();
    tasks.spawn(async move {
        if let Err(e) = validator.run(validator_shutdown).await {
            error!(error = %e, "validator service failed to start");
        }
    });
    let saver_shutdown = shutdown.clone();
    tasks.spawn(async move {
        if let Err(e) = saver.run(saver_shutdown).await {
            error!(error = %e, "verification saver failed to start");
        }
    });

    info!("background services started");
    Ok(Services {
        state: AppState::new(repository, clock, rng),
        tasks,
    })
}
