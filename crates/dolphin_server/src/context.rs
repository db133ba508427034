//! Per-session command dispatch.

use crate::bean_manager::BeanManager;
use crate::config::ServerConfig;
use crate::controller::{ContainerManager, ControllerRegistry};
use crate::controller_handler::{ControllerHandler, SessionServices};
use crate::error::{ServerError, ServerResult};
use crate::event_bus::EventBus;
use crate::gc::{GarbageCollector, VetoHandler};
use crate::task_queue::{SessionHandle, TaskQueue};
use dolphin_model::{PresentationModelBuilder, SchemaRegistry};
use dolphin_protocol::platform::{self, action_call, internal_attributes};
use dolphin_protocol::{ActionParam, Command, CommandKind, Value};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Services shared by every session of a server.
#[derive(Clone)]
pub(crate) struct SharedServices {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) controllers: Arc<ControllerRegistry>,
    pub(crate) container: Arc<dyn ContainerManager>,
    pub(crate) schemas: Arc<SchemaRegistry>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) gc_veto: Option<VetoHandler>,
}

struct PlatformBeans {
    internal_attributes: String,
    action_call: String,
}

/// The server side of one client session.
pub struct DolphinContext {
    id: String,
    config: Arc<ServerConfig>,
    beans: BeanManager,
    controllers: ControllerHandler,
    tasks: Arc<TaskQueue>,
    session: SessionHandle,
    event_bus: Arc<EventBus>,
    platform: Option<PlatformBeans>,
    destroyed: bool,
}

impl DolphinContext {
    pub(crate) fn new(id: &str, shared: &SharedServices) -> Self {
        let mut gc = GarbageCollector::new(shared.config.gc_max_removals_per_pass);
        gc.set_veto(shared.gc_veto.clone());
        let tasks = Arc::new(TaskQueue::new(id, shared.config.max_poll_time));
        Self {
            id: id.to_string(),
            config: Arc::clone(&shared.config),
            beans: BeanManager::new(Arc::clone(&shared.schemas), gc),
            controllers: ControllerHandler::new(
                Arc::clone(&shared.controllers),
                Arc::clone(&shared.container),
            ),
            session: SessionHandle::new(id, Arc::clone(&tasks)),
            tasks,
            event_bus: Arc::clone(&shared.event_bus),
            platform: None,
            destroyed: false,
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns a handle for queuing tasks into this session.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Returns the session's beans.
    pub fn beans(&self) -> &BeanManager {
        &self.beans
    }

    /// Returns the live controllers.
    pub fn controllers(&self) -> &ControllerHandler {
        &self.controllers
    }

    /// Returns true once `CreateContext` has been handled.
    pub fn is_initialized(&self) -> bool {
        self.platform.is_some()
    }

    /// Returns true once `DestroyContext` has been handled.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Handles one request and returns the commands for the client.
    ///
    /// Action failures are reported through the action-call bean and do
    /// not fail the request.
    pub fn handle(&mut self, commands: &[Command]) -> ServerResult<Vec<Command>> {
        for command in commands {
            trace!(session = %self.id, command = command.kind().id(), "handling");
            self.handle_command(command)?;
        }
        Ok(self.beans.take_response())
    }

    fn handle_command(&mut self, command: &Command) -> ServerResult<()> {
        match command {
            Command::CreateContext => self.create_context(),
            Command::DestroyContext => self.destroy_context(),
            Command::CreateController {
                controller_name,
                parent_controller_id,
            } => self.create_controller(controller_name, parent_controller_id.as_deref()),
            Command::DestroyController { controller_id } => {
                self.require_initialized(command)?;
                let services = SessionServices {
                    beans: &mut self.beans,
                    session: &self.session,
                    event_bus: &self.event_bus,
                };
                self.controllers.destroy_controller(controller_id, services)
            }
            Command::CallAction {
                controller_id,
                action_name,
                params,
            } => self.call_action(controller_id, action_name, params),
            Command::StartLongPoll => {
                if self.config.use_gc {
                    self.beans.gc()?;
                }
                self.tasks.execute_tasks(&mut self.beans)?;
                Ok(())
            }
            Command::InterruptLongPoll => {
                self.tasks.interrupt();
                Ok(())
            }
            Command::Empty => Ok(()),
            Command::CreatePresentationModel { .. }
            | Command::DeletePresentationModel { .. }
            | Command::PresentationModelDeleted { .. }
            | Command::ValueChanged { .. }
            | Command::ChangeAttributeMetadata { .. } => self.beans.apply_client_command(command),
            Command::AttributeMetadataChanged { .. } => {
                warn!(session = %self.id, "ignoring server-bound AttributeMetadataChanged");
                Ok(())
            }
        }
    }

    fn create_context(&mut self) -> ServerResult<()> {
        if self.platform.is_some() {
            warn!(session = %self.id, "context already created");
            return Ok(());
        }
        let store = self.beans.store_mut();
        let internal = PresentationModelBuilder::new(platform::INTERNAL_ATTRIBUTES_BEAN_TYPE)
            .with_value(internal_attributes::CONTROLLER_NAME, Value::Null)
            .with_value(internal_attributes::CONTROLLER_ID, Value::Null)
            .with_value(internal_attributes::MODEL, Value::Null)
            .build(store.ids());
        let action = PresentationModelBuilder::new(platform::CONTROLLER_ACTION_CALL_BEAN_TYPE)
            .with_value(action_call::CONTROLLER_ID, Value::Null)
            .with_value(action_call::ACTION_NAME, Value::Null)
            .with_value(action_call::ERROR, false)
            .build(store.ids());
        let platform = PlatformBeans {
            internal_attributes: internal.id().to_string(),
            action_call: action.id().to_string(),
        };
        store.add(internal)?;
        store.add(action)?;
        self.platform = Some(platform);
        info!(session = %self.id, "context created");
        Ok(())
    }

    /// Destroys the controllers of a session that ends without
    /// `DestroyContext`. Teardown errors are logged.
    pub(crate) fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(err) = self.destroy_context() {
            warn!(session = %self.id, error = %err, "controller teardown failed");
        }
    }

    fn destroy_context(&mut self) -> ServerResult<()> {
        let services = SessionServices {
            beans: &mut self.beans,
            session: &self.session,
            event_bus: &self.event_bus,
        };
        let result = self.controllers.destroy_all(services);
        self.destroyed = true;
        info!(session = %self.id, "context destroyed");
        result
    }

    fn create_controller(&mut self, name: &str, parent: Option<&str>) -> ServerResult<()> {
        let internal = self.platform_beans(CommandKind::CreateController.id())?
            .internal_attributes.clone();
        let services = SessionServices {
            beans: &mut self.beans,
            session: &self.session,
            event_bus: &self.event_bus,
        };
        let id = self.controllers.create_controller(name, parent, services)?;
        let model = self
            .controllers
            .controller_model(&id)
            .map_or(Value::Null, Value::from);

        let store = self.beans.store_mut();
        store.set_property(&internal, internal_attributes::CONTROLLER_NAME, name.into())?;
        store.set_property(&internal, internal_attributes::CONTROLLER_ID, id.into())?;
        store.set_property(&internal, internal_attributes::MODEL, model)?;
        Ok(())
    }

    fn call_action(
        &mut self,
        controller_id: &str,
        action: &str,
        params: &[ActionParam],
    ) -> ServerResult<()> {
        let bean = self.platform_beans(CommandKind::CallAction.id())?
            .action_call.clone();
        {
            let store = self.beans.store_mut();
            store.set_property(&bean, action_call::CONTROLLER_ID, controller_id.into())?;
            store.set_property(&bean, action_call::ACTION_NAME, action.into())?;
            store.set_property(&bean, action_call::ERROR, false.into())?;
        }

        let services = SessionServices {
            beans: &mut self.beans,
            session: &self.session,
            event_bus: &self.event_bus,
        };
        match self
            .controllers
            .invoke_action(controller_id, action, params, services)
        {
            Ok(()) => {
                debug!(session = %self.id, controller_id, action, "action invoked");
            }
            Err(err) => {
                error!(session = %self.id, controller_id, action, error = %err, "action failed");
                self.beans
                    .store_mut()
                    .set_property(&bean, action_call::ERROR, true.into())?;
            }
        }
        Ok(())
    }

    fn platform_beans(&self, what: &str) -> ServerResult<&PlatformBeans> {
        self.platform.as_ref().ok_or_else(|| ServerError::NotInitialized {
            command: what.to_string(),
        })
    }

    fn require_initialized(&self, command: &Command) -> ServerResult<()> {
        self.platform_beans(command.kind().id()).map(|_| ())
    }
}

impl std::fmt::Debug for DolphinContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DolphinContext")
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .field("destroyed", &self.destroyed)
            .field("controllers", &self.controllers.len())
            .field("tasks", &self.tasks)
            .finish()
    }
}
