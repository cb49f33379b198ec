//! Application startup, event forwarding, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use quill_core::config::Config;
use quill_core::message::{InMemoryMessageService, Message, MessageService};
use quill_core::permission::{
    CreatePermissionRequest, InteractivePermissionService, PermissionDecision, PermissionRequest,
    PermissionService,
};
use quill_core::pubsub::{Event, EventType};
use quill_core::session::{InMemorySessionService, Session, SessionService};
use quill_extensions::{
    ExtensionContext, ExtensionLoader, ExtensionRegistry, Services,
};
use quill_skills::SkillsExtension;

/// How long a forwarder waits on a slow consumer before dropping a message.
const SLOW_CONSUMER_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the application event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Service events surfaced to the host frontend.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Session(Event<Session>),
    Message(Event<Message>),
    Permission(Event<PermissionRequest>),
}

/// The assembled application.
pub struct App {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionService>,
    pub messages: Arc<dyn MessageService>,
    pub permissions: Arc<dyn PermissionService>,
    pub registry: Arc<ExtensionRegistry>,

    // Keeps extension library handles alive for the process lifetime.
    #[allow(dead_code)]
    loader: ExtensionLoader,

    extension_ctx: ExtensionContext,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    events_rx: Option<mpsc::Receiver<AppEvent>>,
}

impl App {
    /// Build the application: construct services, load extensions, run the
    /// config hooks, and start the event forwarders.
    pub async fn new(mut config: Config) -> anyhow::Result<Self> {
        let permissions_cfg = config.permissions.clone().unwrap_or_default();

        let sessions = InMemorySessionService::new();
        let messages = InMemoryMessageService::new();
        let permissions = InteractivePermissionService::new(
            permissions_cfg.skip_requests,
            permissions_cfg.allowed_tools,
        );

        let registry = Arc::new(ExtensionRegistry::new());
        let loader = ExtensionLoader::new(registry.clone());
        let cancel = CancellationToken::new();

        let extension_ctx = ExtensionContext {
            config: Arc::new(config.clone()),
            services: Services {
                sessions: sessions.clone(),
                messages: messages.clone(),
                permissions: permissions.clone(),
            },
            working_dir: config.working_dir(),
        };

        // Configured extensions first, then the built-ins.
        let loaded = loader.load_from_config(&config, &extension_ctx).await;

        if let Err(e) = registry
            .load(Arc::new(SkillsExtension::new()), &extension_ctx)
            .await
        {
            warn!(error = %e, "Failed to load skills extension");
        }

        // Config hooks run before any service consumes the configuration.
        registry.trigger_config_load(&cancel, &mut config).await?;
        let config = Arc::new(config);

        info!(count = registry.list().await.len(), configured = loaded, "Extensions initialized");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut tasks = Vec::new();

        // Forward service events into the extension hook pipelines. Each
        // stream gets its own consumer so a slow hook on one stream never
        // blocks the other.
        tasks.push(spawn_session_forwarder(
            registry.clone(),
            sessions.subscribe(),
            cancel.clone(),
        ));
        tasks.push(spawn_message_forwarder(
            registry.clone(),
            messages.subscribe(),
            cancel.clone(),
        ));

        // Forward service events to the frontend channel.
        tasks.push(setup_subscriber(
            "sessions",
            sessions.subscribe(),
            events_tx.clone(),
            AppEvent::Session,
            cancel.clone(),
        ));
        tasks.push(setup_subscriber(
            "messages",
            messages.subscribe(),
            events_tx.clone(),
            AppEvent::Message,
            cancel.clone(),
        ));
        tasks.push(setup_subscriber(
            "permissions",
            permissions.subscribe(),
            events_tx,
            AppEvent::Permission,
            cancel.clone(),
        ));

        Ok(Self {
            config,
            sessions,
            messages,
            permissions,
            registry,
            loader,
            extension_ctx,
            cancel,
            tasks,
            events_rx: Some(events_rx),
        })
    }

    /// The context handed to extensions; also used for explicit loads.
    pub fn extension_context(&self) -> &ExtensionContext {
        &self.extension_ctx
    }

    /// The application-wide cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the frontend event stream. Yields `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<AppEvent>> {
        self.events_rx.take()
    }

    /// The permission checkpoint: extension decisions first, interactive
    /// prompt as the fallback. A hook failure denies the request.
    pub async fn check_permission(&self, request: CreatePermissionRequest) -> bool {
        match self
            .registry
            .trigger_permission_request(&self.cancel, &request)
            .await
        {
            Ok(Some(PermissionDecision::Allow)) => true,
            Ok(Some(PermissionDecision::Deny)) => false,
            Ok(None) => self.permissions.request(request).await,
            Err(e) => {
                error!(tool = %request.tool_name, error = %e, "Permission hook failed, denying request");
                false
            }
        }
    }

    /// Graceful shutdown: stop the forwarders, drain them, then shut down
    /// every extension.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        if let Err(e) = self.registry.shutdown_all().await {
            error!(error = %e, "Extension shutdown reported failures");
        }
    }
}

fn spawn_session_forwarder(
    registry: Arc<ExtensionRegistry>,
    mut stream: BroadcastStream<Event<Session>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        let result = match event.event_type {
                            EventType::Created => {
                                registry.trigger_session_created(&cancel, &event.payload).await
                            }
                            EventType::Updated => {
                                registry.trigger_session_updated(&cancel, &event.payload).await
                            }
                            EventType::Deleted => {
                                registry
                                    .trigger_session_deleted(&cancel, &event.payload.id)
                                    .await
                            }
                        };
                        if let Err(e) = result {
                            error!(error = %e, "Session hook failed");
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                        warn!(missed, "Session event forwarder lagged");
                    }
                    None => break,
                },
            }
        }
    })
}

fn spawn_message_forwarder(
    registry: Arc<ExtensionRegistry>,
    mut stream: BroadcastStream<Event<Message>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        let result = match event.event_type {
                            EventType::Created => {
                                registry.trigger_message_created(&cancel, &event.payload).await
                            }
                            EventType::Updated => {
                                registry.trigger_message_updated(&cancel, &event.payload).await
                            }
                            EventType::Deleted => Ok(()),
                        };
                        if let Err(e) = result {
                            error!(error = %e, "Message hook failed");
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                        warn!(missed, "Message event forwarder lagged");
                    }
                    None => break,
                },
            }
        }
    })
}

/// Forward a service event stream to the frontend channel, dropping
/// messages a slow consumer cannot take within [`SLOW_CONSUMER_TIMEOUT`].
fn setup_subscriber<T: Clone + Send + 'static>(
    name: &'static str,
    mut stream: BroadcastStream<Event<T>>,
    tx: mpsc::Sender<AppEvent>,
    wrap: fn(Event<T>) -> AppEvent,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        match tokio::time::timeout(SLOW_CONSUMER_TIMEOUT, tx.send(wrap(event))).await {
                            Ok(Ok(())) => {}
                            Ok(Err(_)) => break, // receiver dropped
                            Err(_) => warn!(name, "message dropped due to slow consumer"),
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                        warn!(name, missed, "subscription lagged");
                    }
                    None => break,
                },
            }
        }
    })
}
