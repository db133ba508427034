//! Server facade: sessions and request handling.

use crate::config::ServerConfig;
use crate::context::{DolphinContext, SharedServices};
use crate::controller::{ContainerManager, ControllerRegistry, ControllerType, DefaultContainerManager};
use crate::error::{ServerError, ServerResult};
use crate::event_bus::EventBus;
use crate::gc::VetoHandler;
use crate::task_queue::SessionHandle;
use dolphin_model::{BeanSchema, SchemaRegistry};
use dolphin_protocol::{status, Codec, Command, HttpResponse, JsonCodec};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Observes a session being created or removed.
pub type SessionListener = Arc<dyn Fn(&SessionHandle) + Send + Sync>;

struct Session {
    handle: SessionHandle,
    context: Mutex<DolphinContext>,
    last_access: Mutex<Instant>,
}

impl Session {
    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }
}

/// The remoting server.
///
/// Transport-agnostic: an HTTP layer hands each POST body and client-id
/// header to [`handle_request`](Self::handle_request) and writes back the
/// returned [`HttpResponse`].
///
/// Sessions end with `DestroyContext` or after idling for longer than
/// [`ServerConfig::session_timeout`]. Expired sessions are swept whenever a
/// session is created, or by calling [`expire_sessions`](Self::expire_sessions).
///
/// # Example
///
/// ```
/// use dolphin_protocol::status;
/// use dolphin_server::DolphinServer;
///
/// let server = DolphinServer::builder().build();
/// let response = server.handle_request(None, r#"[{"id":"CreateContext"}]"#);
/// assert_eq!(response.status, status::OK);
/// assert_eq!(server.session_count(), 1);
/// ```
pub struct DolphinServer {
    shared: SharedServices,
    codec: JsonCodec,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    on_created: Vec<SessionListener>,
    on_destroyed: Vec<SessionListener>,
}

impl DolphinServer {
    /// Starts building a server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Returns the event bus shared by all sessions.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.shared.event_bus
    }

    /// Returns the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns a handle to a live session.
    pub fn session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(id).map(|s| s.handle.clone())
    }

    /// Returns the ids of the live sessions.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Handles one remoting request.
    pub fn handle_request(&self, client_id: Option<&str>, body: &str) -> HttpResponse {
        let commands = match self.codec.decode(body) {
            Ok(commands) => commands,
            Err(err) => {
                warn!(error = %err, "malformed request");
                return HttpResponse::error(status::BAD_REQUEST, err.to_string());
            }
        };

        let (session, created) = match client_id {
            Some(id) => match self.sessions.read().get(id).cloned() {
                Some(session) => (session, false),
                None => {
                    warn!(client_id = id, "unknown session");
                    let err = ServerError::UnknownSession { id: id.to_string() };
                    return HttpResponse::error(status::REQUEST_TIMEOUT, err.to_string());
                }
            },
            None => match self.create_session() {
                Ok(session) => (session, true),
                Err(err) => {
                    warn!(error = %err, "session rejected");
                    return HttpResponse::error(status::SERVICE_UNAVAILABLE, err.to_string());
                }
            },
        };
        session.touch();
        let id = session.handle.id().to_string();

        if !commands.is_empty() && commands.iter().all(Command::is_signal) {
            // Served beside a blocked long poll, so the session lock is off limits.
            session.handle.interrupt();
            return self.respond(&id, &[]);
        }

        let (result, finished) = {
            let mut context = session.context.lock();
            let result = context.handle(&commands);
            // The client never learns the id of a session whose first request failed.
            let finished = context.is_destroyed() || (created && result.is_err());
            (result, finished)
        };
        if finished {
            self.drop_session(&id);
        }
        match result {
            Ok(response) => {
                debug!(session = %id, received = commands.len(), sent = response.len(), "request handled");
                self.respond(&id, &response)
            }
            Err(err) => {
                error!(session = %id, error = %err, "request failed");
                HttpResponse::error(status::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }

    /// Removes sessions idle for longer than the session timeout and returns
    /// how many were removed.
    ///
    /// A session whose request is in progress is never expired.
    pub fn expire_sessions(&self) -> usize {
        let timeout = self.shared.config.session_timeout;
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| {
                    session.idle_for() >= timeout && !session.context.is_locked()
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &expired {
            info!(session = session.handle.id(), "session expired");
            self.discard(session);
        }
        expired.len()
    }

    fn respond(&self, id: &str, commands: &[Command]) -> HttpResponse {
        match self.codec.encode(commands) {
            Ok(body) => HttpResponse::ok(id, body),
            Err(err) => {
                error!(session = id, error = %err, "response encoding failed");
                HttpResponse::error(status::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }

    fn create_session(&self) -> ServerResult<Arc<Session>> {
        self.expire_sessions();
        let session = {
            let mut sessions = self.sessions.write();
            let max = self.shared.config.max_sessions;
            if sessions.len() >= max {
                return Err(ServerError::SessionLimit { max });
            }
            let id = Uuid::new_v4().to_string();
            let context = DolphinContext::new(&id, &self.shared);
            let session = Arc::new(Session {
                handle: context.session().clone(),
                context: Mutex::new(context),
                last_access: Mutex::new(Instant::now()),
            });
            sessions.insert(id.clone(), Arc::clone(&session));
            info!(session = %id, live = sessions.len(), "session created");
            session
        };
        for listener in &self.on_created {
            listener(&session.handle);
        }
        Ok(session)
    }

    fn drop_session(&self, id: &str) {
        let removed = self.sessions.write().remove(id);
        if let Some(session) = removed {
            self.discard(&session);
            info!(session = id, "session removed");
        }
    }

    fn discard(&self, session: &Session) {
        session.context.lock().shutdown();
        session.handle.interrupt();
        self.shared.event_bus.unsubscribe_session(session.handle.id());
        for listener in &self.on_destroyed {
            listener(&session.handle);
        }
    }
}

impl std::fmt::Debug for DolphinServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DolphinServer")
            .field("config", &self.shared.config)
            .field("controllers", &self.shared.controllers.names())
            .field("sessions", &self.session_count())
            .finish()
    }
}

/// Assembles a [`DolphinServer`].
pub struct ServerBuilder {
    config: ServerConfig,
    controllers: ControllerRegistry,
    schemas: SchemaRegistry,
    container: Arc<dyn ContainerManager>,
    event_bus: Arc<EventBus>,
    gc_veto: Option<VetoHandler>,
    on_created: Vec<SessionListener>,
    on_destroyed: Vec<SessionListener>,
}

impl ServerBuilder {
    /// Creates a builder with default configuration and no controllers.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            controllers: ControllerRegistry::new(),
            schemas: SchemaRegistry::new(),
            container: Arc::new(DefaultContainerManager),
            event_bus: Arc::new(EventBus::new()),
            gc_veto: None,
            on_created: Vec::new(),
            on_destroyed: Vec::new(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a controller type.
    pub fn controller(mut self, controller: ControllerType) -> ServerResult<Self> {
        self.controllers.register(controller)?;
        Ok(self)
    }

    /// Registers a bean schema.
    pub fn schema(mut self, schema: BeanSchema) -> ServerResult<Self> {
        self.schemas.register(schema)?;
        Ok(self)
    }

    /// Replaces the container that creates controller instances.
    pub fn container_manager(mut self, container: Arc<dyn ContainerManager>) -> Self {
        self.container = container;
        self
    }

    /// Shares an existing event bus.
    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Sets the callback that may veto garbage collection of a bean.
    pub fn gc_veto<F>(mut self, veto: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.gc_veto = Some(Arc::new(veto));
        self
    }

    /// Adds a listener called after a session is created.
    pub fn on_session_created<F>(mut self, listener: F) -> Self
    where
        F: Fn(&SessionHandle) + Send + Sync + 'static,
    {
        self.on_created.push(Arc::new(listener));
        self
    }

    /// Adds a listener called after a session is destroyed or expires.
    pub fn on_session_destroyed<F>(mut self, listener: F) -> Self
    where
        F: Fn(&SessionHandle) + Send + Sync + 'static,
    {
        self.on_destroyed.push(Arc::new(listener));
        self
    }

    /// Builds the server.
    pub fn build(self) -> DolphinServer {
        info!(
            controllers = self.controllers.len(),
            endpoint = %self.config.endpoint_path,
            "server built"
        );
        DolphinServer {
            shared: SharedServices {
                config: Arc::new(self.config),
                controllers: Arc::new(self.controllers),
                container: self.container,
                schemas: Arc::new(self.schemas),
                event_bus: self.event_bus,
                gc_veto: self.gc_veto,
            },
            codec: JsonCodec::new(),
            sessions: RwLock::new(HashMap::new()),
            on_created: self.on_created,
            on_destroyed: self.on_destroyed,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
