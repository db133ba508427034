//! Controller definitions and action dispatch.
//!
//! Controllers are declared up front with a [`ControllerBuilder`]: a name,
//! an optional model bean type, the actions with their declared parameter
//! names, and optional init/destroy hooks. The builder erases the concrete
//! controller type so sessions can hold any controller behind one
//! [`ControllerType`].
//!
//! ```
//! use dolphin_server::{ActionParams, ControllerBuilder};
//!
//! #[derive(Default)]
//! struct Greeter {
//!     greeted: u32,
//! }
//!
//! let controller = ControllerBuilder::<Greeter>::with_default("Greeter")
//!     .action("greet", &["name"], |greeter, _ctx, params: &ActionParams| {
//!         greeter.greeted += 1;
//!         params.require("name")?;
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//! assert!(controller.has_action("greet"));
//! ```

use crate::bean_manager::BeanManager;
use crate::error::{ServerError, ServerResult};
use crate::event_bus::EventBus;
use crate::task_queue::SessionHandle;
use dolphin_protocol::{ActionParam, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A live controller instance.
pub type ControllerInstance = Box<dyn Any + Send>;

type ErasedAction =
    Arc<dyn Fn(&mut (dyn Any + Send), &mut ActionContext<'_>, &ActionParams) -> ServerResult<()> + Send + Sync>;

type ErasedHook = Arc<dyn Fn(&mut (dyn Any + Send), &mut ActionContext<'_>) -> ServerResult<()> + Send + Sync>;

/// What a controller sees while an action or hook runs.
pub struct ActionContext<'a> {
    controller_id: &'a str,
    model_id: Option<&'a str>,
    beans: &'a mut BeanManager,
    session: &'a SessionHandle,
    event_bus: &'a Arc<EventBus>,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(
        controller_id: &'a str,
        model_id: Option<&'a str>,
        beans: &'a mut BeanManager,
        session: &'a SessionHandle,
        event_bus: &'a Arc<EventBus>,
    ) -> Self {
        Self {
            controller_id,
            model_id,
            beans,
            session,
            event_bus,
        }
    }

    /// Returns the controller id.
    pub fn controller_id(&self) -> &str {
        self.controller_id
    }

    /// Returns the id of the controller's model bean, if it has one.
    pub fn model_id(&self) -> Option<&str> {
        self.model_id
    }

    /// Returns the session's bean manager.
    pub fn beans(&mut self) -> &mut BeanManager {
        &mut *self.beans
    }

    /// Returns the session handle.
    pub fn session(&self) -> &SessionHandle {
        self.session
    }

    /// Returns the server's event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.event_bus
    }

    /// Reads a property of the controller's model.
    pub fn model_value(&self, property: &str) -> ServerResult<Value> {
        let model_id = self.require_model()?;
        self.beans.get(model_id, property)
    }

    /// Writes a property of the controller's model.
    pub fn set_model_value(&mut self, property: &str, value: impl Into<Value>) -> ServerResult<()> {
        let model_id = self.require_model()?;
        self.beans.set(model_id, property, value)
    }

    fn require_model(&self) -> ServerResult<&'a str> {
        self.model_id.ok_or_else(|| {
            ServerError::Internal(format!("controller {} has no model", self.controller_id))
        })
    }
}

/// Action arguments bound to the declared parameter names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionParams {
    values: Vec<(String, Value)>,
}

impl ActionParams {
    /// Binds supplied parameters to declared names.
    ///
    /// Each declared parameter is matched by name, then by its index used as
    /// a name, then by position.
    pub fn bind(action: &str, declared: &[String], supplied: &[ActionParam]) -> ServerResult<Self> {
        let mut values = Vec::with_capacity(declared.len());
        for (index, name) in declared.iter().enumerate() {
            let position_name = index.to_string();
            let value = supplied
                .iter()
                .find(|p| &p.name == name)
                .or_else(|| supplied.iter().find(|p| p.name == position_name))
                .or_else(|| supplied.get(index))
                .map(|p| p.value.clone())
                .ok_or_else(|| ServerError::MissingParameter {
                    action: action.to_string(),
                    param: name.clone(),
                })?;
            values.push((name.clone(), value));
        }
        Ok(Self { values })
    }

    /// Returns a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns a parameter by name or fails with `MissingParameter`.
    pub fn require(&self, name: &str) -> ServerResult<&Value> {
        self.get(name).ok_or_else(|| ServerError::MissingParameter {
            action: String::new(),
            param: name.to_string(),
        })
    }

    /// Returns a parameter by declaration index.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index).map(|(_, v)| v)
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no parameter is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Clone)]
struct ActionDef {
    params: Vec<String>,
    handler: ErasedAction,
}

/// Declares a controller type.
pub struct ControllerBuilder<C> {
    name: String,
    model_type: Option<String>,
    factory: Arc<dyn Fn() -> C + Send + Sync>,
    actions: HashMap<String, ActionDef>,
    on_init: Option<ErasedHook>,
    on_destroy: Option<ErasedHook>,
    duplicate: Option<String>,
}

impl<C: Send + 'static> ControllerBuilder<C> {
    /// Starts a controller declaration with an instance factory.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            model_type: None,
            factory: Arc::new(factory),
            actions: HashMap::new(),
            on_init: None,
            on_destroy: None,
            duplicate: None,
        }
    }

    /// Starts a controller declaration using `C::default()` as factory.
    pub fn with_default(name: impl Into<String>) -> Self
    where
        C: Default,
    {
        Self::new(name, C::default)
    }

    /// Gives each controller a root model bean of `bean_type`.
    pub fn with_model(mut self, bean_type: impl Into<String>) -> Self {
        self.model_type = Some(bean_type.into());
        self
    }

    /// Declares an action.
    ///
    /// Declaring two actions with the same name makes [`build`](Self::build)
    /// fail.
    pub fn action<F>(mut self, name: impl Into<String>, params: &[&str], handler: F) -> Self
    where
        F: Fn(&mut C, &mut ActionContext<'_>, &ActionParams) -> ServerResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let controller = self.name.clone();
        let erased: ErasedAction = Arc::new(
            move |instance: &mut (dyn Any + Send), ctx: &mut ActionContext<'_>, params: &ActionParams| {
                let instance = downcast::<C>(instance, &controller)?;
                handler(instance, ctx, params)
            },
        );
        let def = ActionDef {
            params: params.iter().map(|p| p.to_string()).collect(),
            handler: erased,
        };
        if self.actions.insert(name.clone(), def).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name);
        }
        self
    }

    /// Sets a hook run after a controller is created.
    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C, &mut ActionContext<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.on_init = Some(erase_hook(self.name.clone(), hook));
        self
    }

    /// Sets a hook run before a controller is destroyed.
    pub fn on_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut C, &mut ActionContext<'_>) -> ServerResult<()> + Send + Sync + 'static,
    {
        self.on_destroy = Some(erase_hook(self.name.clone(), hook));
        self
    }

    /// Finishes the declaration.
    pub fn build(self) -> ServerResult<ControllerType> {
        if let Some(action) = self.duplicate {
            return Err(ServerError::DuplicateAction {
                controller: self.name,
                action,
            });
        }
        let factory = self.factory;
        Ok(ControllerType {
            name: self.name,
            model_type: self.model_type,
            factory: Arc::new(move || Box::new(factory()) as ControllerInstance),
            actions: self.actions,
            on_init: self.on_init,
            on_destroy: self.on_destroy,
        })
    }
}

fn downcast<'a, C: 'static>(
    instance: &'a mut (dyn Any + Send),
    controller: &str,
) -> ServerResult<&'a mut C> {
    instance.downcast_mut::<C>().ok_or_else(|| {
        ServerError::Internal(format!("instance of controller {controller} has the wrong type"))
    })
}

fn erase_hook<C, F>(controller: String, hook: F) -> ErasedHook
where
    C: Send + 'static,
    F: Fn(&mut C, &mut ActionContext<'_>) -> ServerResult<()> + Send + Sync + 'static,
{
    Arc::new(move |instance: &mut (dyn Any + Send), ctx: &mut ActionContext<'_>| {
        let instance = downcast::<C>(instance, &controller)?;
        hook(instance, ctx)
    })
}

/// A declared controller type, independent of its concrete Rust type.
#[derive(Clone)]
pub struct ControllerType {
    name: String,
    model_type: Option<String>,
    factory: Arc<dyn Fn() -> ControllerInstance + Send + Sync>,
    actions: HashMap<String, ActionDef>,
    on_init: Option<ErasedHook>,
    on_destroy: Option<ErasedHook>,
}

impl ControllerType {
    /// Returns the controller name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the model bean type, if any.
    pub fn model_type(&self) -> Option<&str> {
        self.model_type.as_deref()
    }

    /// Creates a new instance.
    pub fn instantiate(&self) -> ControllerInstance {
        (self.factory)()
    }

    /// Returns true if the action is declared.
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Returns the declared action names, sorted.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Binds the parameters and invokes an action on an instance.
    pub fn invoke(
        &self,
        instance: &mut ControllerInstance,
        action: &str,
        params: &[ActionParam],
        ctx: &mut ActionContext<'_>,
    ) -> ServerResult<()> {
        let def = self
            .actions
            .get(action)
            .ok_or_else(|| ServerError::ActionNotFound {
                controller: self.name.clone(),
                action: action.to_string(),
            })?;
        let bound = ActionParams::bind(action, &def.params, params)?;
        (def.handler)(instance.as_mut(), ctx, &bound)
    }

    pub(crate) fn run_init(
        &self,
        instance: &mut ControllerInstance,
        ctx: &mut ActionContext<'_>,
    ) -> ServerResult<()> {
        match &self.on_init {
            Some(hook) => hook(instance.as_mut(), ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn run_destroy(
        &self,
        instance: &mut ControllerInstance,
        ctx: &mut ActionContext<'_>,
    ) -> ServerResult<()> {
        match &self.on_destroy {
            Some(hook) => hook(instance.as_mut(), ctx),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerType")
            .field("name", &self.name)
            .field("model_type", &self.model_type)
            .field("actions", &self.action_names())
            .finish()
    }
}

/// Controller types by name.
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    types: HashMap<String, Arc<ControllerType>>,
}

impl ControllerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a controller type.
    pub fn register(&mut self, controller: ControllerType) -> ServerResult<()> {
        if self.types.contains_key(controller.name()) {
            return Err(ServerError::DuplicateController {
                name: controller.name().to_string(),
            });
        }
        self.types
            .insert(controller.name().to_string(), Arc::new(controller));
        Ok(())
    }

    /// Looks up a controller type.
    pub fn get(&self, name: &str) -> ServerResult<Arc<ControllerType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::ControllerTypeNotFound {
                name: name.to_string(),
            })
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Creates and disposes controller instances.
///
/// Dependency-injection containers plug in here.
pub trait ContainerManager: Send + Sync {
    /// Creates a managed instance of a controller type.
    fn create_managed_controller(
        &self,
        controller_type: &ControllerType,
        model_id: Option<&str>,
    ) -> ServerResult<ControllerInstance>;

    /// Disposes of an instance.
    fn destroy_controller(&self, controller_type: &ControllerType, instance: ControllerInstance);
}

/// Instantiates controllers with their factory and drops them on destroy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContainerManager;

impl ContainerManager for DefaultContainerManager {
    fn create_managed_controller(
        &self,
        controller_type: &ControllerType,
        _model_id: Option<&str>,
    ) -> ServerResult<ControllerInstance> {
        Ok(controller_type.instantiate())
    }

    fn destroy_controller(&self, _controller_type: &ControllerType, instance: ControllerInstance) {
        drop(instance);
    }
}
