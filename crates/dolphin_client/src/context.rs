//! Client facade: session lifecycle, controller proxies and local mutations.

use crate::batcher::BatchOutcome;
use crate::config::ClientConfig;
use crate::connector::{ClientConnector, UiExecutor};
use crate::error::{ClientError, ClientResult};
use crate::transport::CommandTransport;
use dolphin_model::{ModelStore, PresentationModel};
use dolphin_protocol::platform::{self, action_call, internal_attributes};
use dolphin_protocol::{ActionParam, Command, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point of a client application.
///
/// Owns the client model store and the connector. Cloning yields another
/// handle to the same session.
#[derive(Clone)]
pub struct ClientContext {
    config: Arc<ClientConfig>,
    connector: ClientConnector,
    connected: Arc<AtomicBool>,
}

impl ClientContext {
    /// Creates a context talking to the server through `transport`.
    pub fn new(config: ClientConfig, transport: Arc<dyn CommandTransport>) -> ClientResult<Self> {
        let store = Arc::new(Mutex::new(ModelStore::client()));
        let connector = ClientConnector::new(&config, transport, store)?;
        Ok(Self::from_parts(config, connector))
    }

    /// Creates a context dispatching responses through `executor`.
    pub fn with_executor(
        config: ClientConfig,
        transport: Arc<dyn CommandTransport>,
        executor: Arc<dyn UiExecutor>,
    ) -> ClientResult<Self> {
        let store = Arc::new(Mutex::new(ModelStore::client()));
        let connector = ClientConnector::with_executor(&config, transport, store, executor)?;
        Ok(Self::from_parts(config, connector))
    }

    fn from_parts(config: ClientConfig, connector: ClientConnector) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the connector.
    pub fn connector(&self) -> &ClientConnector {
        &self.connector
    }

    /// Returns the client model store.
    pub fn store(&self) -> &Arc<Mutex<ModelStore>> {
        self.connector.store()
    }

    /// Returns true between `connect` and `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens a session and starts listening for server push.
    pub fn connect(&self) -> ClientResult<()> {
        self.connector.connect();
        self.send_and_wait(Command::CreateContext)?;
        self.connected.store(true, Ordering::SeqCst);
        info!(
            client_id = self.connector.client_id().as_deref().unwrap_or("-"),
            "connected"
        );

        self.connector.set_push_enabled(self.config.push_enabled);
        self.connector.listen();
        Ok(())
    }

    /// Stops listening and destroys the session on the server.
    pub fn disconnect(&self) -> ClientResult<()> {
        self.require_connected()?;
        self.connector.set_push_enabled(false);
        let result = self.send_and_wait(Command::DestroyContext);
        self.connector.disconnect();
        self.connected.store(false, Ordering::SeqCst);
        info!("disconnected");
        result
    }

    /// Creates a controller on the server and returns a proxy for it.
    pub fn create_controller(&self, name: &str) -> ClientResult<ControllerProxy> {
        self.create_controller_with_parent(name, None)
    }

    fn create_controller_with_parent(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> ClientResult<ControllerProxy> {
        self.require_connected()?;
        let controller = name.to_string();
        let (id, model_id) = self.send_and_read(
            Command::CreateController {
                controller_name: name.to_string(),
                parent_controller_id: parent.map(str::to_string),
            },
            move |store| {
                let bean = internal_bean(store, platform::INTERNAL_ATTRIBUTES_BEAN_TYPE)?;
                let id = text_value(bean, internal_attributes::CONTROLLER_ID).ok_or_else(|| {
                    ClientError::Protocol(format!(
                        "server did not publish an id for controller {controller}"
                    ))
                })?;
                Ok((id, text_value(bean, internal_attributes::MODEL)))
            },
        )?;
        debug!(controller = name, controller_id = %id, "controller created");

        Ok(ControllerProxy {
            context: self.clone(),
            name: name.to_string(),
            id,
            model_id,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Sets an attribute value locally and sends the change to the server.
    ///
    /// Attributes sharing the qualifier are updated too; one `ValueChanged`
    /// is sent per attribute whose value actually changed.
    pub fn set_value(&self, attribute_id: &str, value: impl Into<Value>) -> ClientResult<()> {
        let changes = self.store().lock().set_value(attribute_id, value.into())?;
        for change in changes {
            self.connector.send_blind(Command::ValueChanged {
                attribute_id: change.attribute_id,
                old_value: change.old_value,
                new_value: change.new_value,
            });
        }
        Ok(())
    }

    /// Sets a property of a model by name.
    pub fn set_property(
        &self,
        model_id: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> ClientResult<()> {
        let attribute_id = self.store().lock().attribute_id_of(model_id, property)?;
        self.set_value(&attribute_id, value)
    }

    /// Adds a model locally and announces it to the server.
    pub fn add_model(&self, model: PresentationModel) -> ClientResult<()> {
        let command = model.to_create_command();
        self.store().lock().add(model)?;
        self.connector.send_blind(command);
        Ok(())
    }

    /// Removes a model locally and tells the server to delete it.
    pub fn remove_model(&self, model_id: &str) -> ClientResult<PresentationModel> {
        let model = self.store().lock().remove(model_id)?;
        self.connector
            .send_blind(Command::delete_presentation_model(model_id));
        Ok(model)
    }

    /// Waits until every command sent so far has been answered.
    pub fn sync(&self) -> ClientResult<()> {
        self.send_and_wait(Command::Empty)
    }

    fn require_connected(&self) -> ClientResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn send_and_wait(&self, command: Command) -> ClientResult<()> {
        self.send_and_read(command, |_| Ok(()))
    }

    /// Sends `command` and waits for `read` to run against the store.
    ///
    /// `read` runs in the batch handler, before any later response touches
    /// the shared platform beans.
    fn send_and_read<T, F>(&self, command: Command, read: F) -> ClientResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ModelStore) -> ClientResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let store = Arc::clone(self.store());
        self.connector.send(
            command,
            Some(Box::new(move |outcome| {
                let result = match outcome {
                    BatchOutcome::Completed(_) => read(&store.lock()),
                    BatchOutcome::Failed(err) => Err(err),
                };
                let _ = tx.send(result);
            })),
        );
        match rx.recv_timeout(self.config.connection_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ClientError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::NotConnected),
        }
    }
}

fn internal_bean<'a>(store: &'a ModelStore, bean_type: &str) -> ClientResult<&'a PresentationModel> {
    store
        .find_all_by_type(bean_type)
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Protocol(format!("missing platform bean {bean_type}")))
}

fn text_value(model: &PresentationModel, property: &str) -> Option<String> {
    model
        .value(property)
        .and_then(Value::as_text)
        .map(str::to_string)
}

/// Client-side handle of a server controller.
pub struct ControllerProxy {
    context: ClientContext,
    name: String,
    id: String,
    model_id: Option<String>,
    destroyed: AtomicBool,
}

impl ControllerProxy {
    /// Returns the controller name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the server-assigned controller id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the id of the controller's model, if it has one.
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Returns a snapshot of the controller's model.
    pub fn model(&self) -> Option<PresentationModel> {
        let id = self.model_id.as_deref()?;
        self.context.store().lock().find_by_id(id).cloned()
    }

    /// Invokes an action and waits for it to complete.
    ///
    /// Fails with [`ClientError::ControllerAction`] when the action failed on
    /// the server.
    pub fn invoke(&self, action_name: &str, params: Vec<ActionParam>) -> ClientResult<()> {
        self.require_alive()?;
        let failed = self.context.send_and_read(
            Command::call_action(&self.id, action_name, params),
            |store| {
                let bean = internal_bean(store, platform::CONTROLLER_ACTION_CALL_BEAN_TYPE)?;
                Ok(bean
                    .value(action_call::ERROR)
                    .and_then(Value::as_bool)
                    .unwrap_or(false))
            },
        )?;
        if failed {
            return Err(ClientError::ControllerAction {
                controller_id: self.id.clone(),
                action_name: action_name.to_string(),
            });
        }
        Ok(())
    }

    /// Creates a child controller destroyed together with this one.
    pub fn create_child(&self, name: &str) -> ClientResult<ControllerProxy> {
        self.require_alive()?;
        self.context
            .create_controller_with_parent(name, Some(&self.id))
    }

    /// Destroys the controller on the server.
    pub fn destroy(&self) -> ClientResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Err(self.destroyed_error());
        }
        self.context.send_and_wait(Command::DestroyController {
            controller_id: self.id.clone(),
        })?;
        debug!(controller_id = %self.id, "controller destroyed");
        Ok(())
    }

    /// Returns true once [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn require_alive(&self) -> ClientResult<()> {
        if self.is_destroyed() {
            Err(self.destroyed_error())
        } else {
            Ok(())
        }
    }

    fn destroyed_error(&self) -> ClientError {
        ClientError::ControllerDestroyed {
            controller_id: self.id.clone(),
        }
    }
}

impl std::fmt::Debug for ControllerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerProxy")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("model_id", &self.model_id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use dolphin_model::PresentationModelBuilder;
    use dolphin_protocol::AttributeDto;
    use std::time::Duration;

    /// Answers like a server with one controller type whose `fail` action
    /// always fails.
    fn scripted_server(commands: &[Command]) -> ClientResult<Vec<Command>> {
        let mut response = Vec::new();
        for command in commands {
            match command {
                Command::CreateContext => {
                    response.push(Command::CreatePresentationModel {
                        pm_id: "highlander".into(),
                        pm_type: platform::INTERNAL_ATTRIBUTES_BEAN_TYPE.into(),
                        attributes: vec![
                            AttributeDto::new("h-name", internal_attributes::CONTROLLER_NAME, Value::Null),
                            AttributeDto::new("h-id", internal_attributes::CONTROLLER_ID, Value::Null),
                            AttributeDto::new("h-model", internal_attributes::MODEL, Value::Null),
                        ],
                    });
                    response.push(Command::CreatePresentationModel {
                        pm_id: "action-call".into(),
                        pm_type: platform::CONTROLLER_ACTION_CALL_BEAN_TYPE.into(),
                        attributes: vec![AttributeDto::new("a-error", action_call::ERROR, false)],
                    });
                }
                Command::CreateController { controller_name, .. } => {
                    let model_id = format!("m-{controller_name}");
                    response.push(Command::value_changed(
                        "h-id",
                        Value::Null,
                        format!("c-{controller_name}"),
                    ));
                    response.push(Command::CreatePresentationModel {
                        pm_id: model_id.clone(),
                        pm_type: controller_name.clone(),
                        attributes: vec![AttributeDto::new(
                            format!("{model_id}-count"),
                            "count",
                            0i64,
                        )],
                    });
                    response.push(Command::value_changed("h-model", Value::Null, model_id));
                }
                Command::CallAction { action_name, .. } => {
                    response.push(Command::value_changed("a-error", Value::Null, false));
                    if action_name == "fail" {
                        response.push(Command::value_changed("a-error", false, true));
                    }
                }
                _ => {}
            }
        }
        Ok(response)
    }

    /// Dispatches every response on its own thread, so responses of
    /// consecutive batches are applied concurrently.
    struct ThreadPerTask;

    impl UiExecutor for ThreadPerTask {
        fn execute(&self, task: Box<dyn FnOnce() + Send>) {
            std::thread::spawn(task);
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_defer_window(Duration::from_millis(5))
            .with_push_enabled(false)
            .with_connection_timeout(Duration::from_secs(2))
    }

    fn context() -> (ClientContext, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        transport.set_responder(scripted_server);
        let context =
            ClientContext::new(config(), Arc::clone(&transport) as Arc<dyn CommandTransport>)
                .unwrap();
        (context, transport)
    }

    fn threaded_context() -> ClientContext {
        let transport = Arc::new(MockTransport::new());
        transport.set_responder(scripted_server);
        let context = ClientContext::with_executor(
            config(),
            transport as Arc<dyn CommandTransport>,
            Arc::new(ThreadPerTask),
        )
        .unwrap();
        context.connect().unwrap();
        context
    }

    #[test]
    fn controller_lifecycle() {
        let (context, transport) = context();
        assert_eq!(
            context.create_controller("Counter").unwrap_err(),
            ClientError::NotConnected
        );

        context.connect().unwrap();
        let controller = context.create_controller("Counter").unwrap();
        assert_eq!(controller.id(), "c-Counter");
        assert_eq!(controller.model_id(), Some("m-Counter"));
        assert_eq!(
            controller.model().unwrap().value("count"),
            Some(&Value::Integer(0))
        );

        controller.invoke("increment", Vec::new()).unwrap();
        assert_eq!(
            controller.invoke("fail", Vec::new()),
            Err(ClientError::ControllerAction {
                controller_id: "c-Counter".into(),
                action_name: "fail".into()
            })
        );
        // A failed action does not poison the next call.
        controller.invoke("increment", Vec::new()).unwrap();

        controller.destroy().unwrap();
        assert!(matches!(
            controller.destroy(),
            Err(ClientError::ControllerDestroyed { .. })
        ));
        assert!(matches!(
            controller.invoke("increment", Vec::new()),
            Err(ClientError::ControllerDestroyed { .. })
        ));

        context.disconnect().unwrap();
        assert!(!context.is_connected());
        assert!(transport
            .sent_commands()
            .contains(&Command::DestroyContext));
    }

    #[test]
    fn concurrent_actions_see_their_own_error_flag() {
        let context = threaded_context();
        let controller = Arc::new(context.create_controller("Counter").unwrap());

        for _ in 0..20 {
            let failing = Arc::clone(&controller);
            let failing = std::thread::spawn(move || failing.invoke("fail", Vec::new()));
            let passing = Arc::clone(&controller);
            let passing = std::thread::spawn(move || passing.invoke("increment", Vec::new()));

            assert!(matches!(
                failing.join().unwrap(),
                Err(ClientError::ControllerAction { .. })
            ));
            assert_eq!(passing.join().unwrap(), Ok(()));
        }
    }

    #[test]
    fn concurrent_creations_get_their_own_ids() {
        let context = threaded_context();
        let names = ["Counter", "Timer", "Clock", "Editor"];
        let handles: Vec<_> = names
            .iter()
            .map(|&name| {
                let context = context.clone();
                std::thread::spawn(move || context.create_controller(name).unwrap())
            })
            .collect();

        for (name, handle) in names.iter().zip(handles) {
            let controller = handle.join().unwrap();
            assert_eq!(controller.id(), format!("c-{name}"));
            assert_eq!(controller.model_id(), Some(format!("m-{name}").as_str()));
        }
    }

    #[test]
    fn local_mutations_are_sent() {
        let (context, transport) = context();
        context.connect().unwrap();

        let (model, other) = {
            let store = context.store().lock();
            let model = PresentationModelBuilder::new("Person")
                .with_id("p-1")
                .with_qualified_value("name", "Ada", "person.name")
                .build(store.ids());
            let other = PresentationModelBuilder::new("Card")
                .with_id("p-2")
                .with_qualified_value("title", "Ada", "person.name")
                .build(store.ids());
            (model, other)
        };
        context.add_model(model).unwrap();
        context.add_model(other).unwrap();

        context.set_property("p-1", "name", "Grace").unwrap();
        context.remove_model("p-2").unwrap();
        context.sync().unwrap();

        let sent = transport.sent_commands();
        let value_changes = sent
            .iter()
            .filter(|c| matches!(c, Command::ValueChanged { .. }))
            .count();
        assert_eq!(value_changes, 2);
        assert!(sent.contains(&Command::delete_presentation_model("p-2")));
        assert!(matches!(
            sent.iter().find(|c| matches!(c, Command::CreatePresentationModel { .. })),
            Some(Command::CreatePresentationModel { pm_id, .. }) if pm_id == "p-1"
        ));
    }

    #[test]
    fn transport_failure_fails_connect() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let context = ClientContext::new(
            ClientConfig::default().with_push_enabled(false),
            transport as Arc<dyn CommandTransport>,
        )
        .unwrap();
        assert!(context.connect().unwrap_err().is_transport());
        assert!(!context.is_connected());
    }
}
