//! Live controllers of one session.

use crate::bean_manager::BeanManager;
use crate::controller::{
    ActionContext, ContainerManager, ControllerInstance, ControllerRegistry, ControllerType,
};
use crate::error::{ServerError, ServerResult};
use crate::event_bus::EventBus;
use crate::task_queue::SessionHandle;
use dolphin_protocol::ActionParam;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

struct ManagedController {
    controller_type: Arc<ControllerType>,
    instance: ControllerInstance,
    model_id: Option<String>,
    parent: Option<String>,
    children: Vec<String>,
}

/// Borrowed session services handed to controllers.
pub(crate) struct SessionServices<'a> {
    pub(crate) beans: &'a mut BeanManager,
    pub(crate) session: &'a SessionHandle,
    pub(crate) event_bus: &'a Arc<EventBus>,
}

/// Creates, invokes and destroys the controllers of a session.
pub struct ControllerHandler {
    registry: Arc<ControllerRegistry>,
    container: Arc<dyn ContainerManager>,
    controllers: HashMap<String, ManagedController>,
}

impl ControllerHandler {
    /// Creates a handler with no live controllers.
    pub fn new(registry: Arc<ControllerRegistry>, container: Arc<dyn ContainerManager>) -> Self {
        Self {
            registry,
            container,
            controllers: HashMap::new(),
        }
    }

    /// Returns the number of live controllers.
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Returns true if no controller is live.
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Returns true if a controller with this id is live.
    pub fn contains(&self, controller_id: &str) -> bool {
        self.controllers.contains_key(controller_id)
    }

    /// Returns the model bean id of a controller.
    pub fn controller_model(&self, controller_id: &str) -> Option<&str> {
        self.controllers
            .get(controller_id)
            .and_then(|c| c.model_id.as_deref())
    }

    /// Returns the ids of a controller's children.
    pub fn children(&self, controller_id: &str) -> Vec<String> {
        self.controllers
            .get(controller_id)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    /// Creates a controller and returns its id.
    ///
    /// The model bean, when the type declares one, exists before the
    /// instance is created and its init hook runs.
    pub(crate) fn create_controller(
        &mut self,
        name: &str,
        parent: Option<&str>,
        services: SessionServices<'_>,
    ) -> ServerResult<String> {
        let controller_type = self.registry.get(name)?;
        if let Some(parent) = parent {
            if !self.controllers.contains_key(parent) {
                return Err(ServerError::ControllerNotFound {
                    id: parent.to_string(),
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let model_id = match controller_type.model_type() {
            Some(bean_type) => Some(services.beans.create_root(bean_type)?),
            None => None,
        };

        let mut instance = match self
            .container
            .create_managed_controller(&controller_type, model_id.as_deref())
        {
            Ok(instance) => instance,
            Err(err) => {
                discard_model(services.beans, model_id.as_deref());
                return Err(err);
            }
        };

        let mut ctx = ActionContext::new(
            &id,
            model_id.as_deref(),
            &mut *services.beans,
            services.session,
            services.event_bus,
        );
        if let Err(err) = controller_type.run_init(&mut instance, &mut ctx) {
            self.container.destroy_controller(&controller_type, instance);
            discard_model(services.beans, model_id.as_deref());
            return Err(err);
        }

        if let Some(parent) = parent.and_then(|p| self.controllers.get_mut(p)) {
            parent.children.push(id.clone());
        }
        debug!(controller = name, controller_id = %id, model_id = ?model_id, "controller created");
        self.controllers.insert(
            id.clone(),
            ManagedController {
                controller_type,
                instance,
                model_id,
                parent: parent.map(str::to_string),
                children: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Invokes an action on a live controller.
    pub(crate) fn invoke_action(
        &mut self,
        controller_id: &str,
        action: &str,
        params: &[ActionParam],
        services: SessionServices<'_>,
    ) -> ServerResult<()> {
        let controller =
            self.controllers
                .get_mut(controller_id)
                .ok_or_else(|| ServerError::ControllerNotFound {
                    id: controller_id.to_string(),
                })?;
        let mut ctx = ActionContext::new(
            controller_id,
            controller.model_id.as_deref(),
            services.beans,
            services.session,
            services.event_bus,
        );
        controller
            .controller_type
            .invoke(&mut controller.instance, action, params, &mut ctx)
    }

    /// Destroys a controller and, first, all of its children.
    pub(crate) fn destroy_controller(
        &mut self,
        controller_id: &str,
        services: SessionServices<'_>,
    ) -> ServerResult<()> {
        if !self.controllers.contains_key(controller_id) {
            return Err(ServerError::ControllerNotFound {
                id: controller_id.to_string(),
            });
        }
        let SessionServices {
            beans,
            session,
            event_bus,
        } = services;
        let mut result = Ok(());
        self.destroy_tree(controller_id, beans, session, event_bus, &mut result);
        result
    }

    /// Destroys every live controller. Returns the first hook error.
    pub(crate) fn destroy_all(&mut self, services: SessionServices<'_>) -> ServerResult<()> {
        let SessionServices {
            beans,
            session,
            event_bus,
        } = services;
        let mut roots: Vec<String> = self
            .controllers
            .iter()
            .filter(|(_, c)| c.parent.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        roots.sort_unstable();

        let mut result = Ok(());
        for id in roots {
            self.destroy_tree(&id, beans, session, event_bus, &mut result);
        }
        result
    }

    fn destroy_tree(
        &mut self,
        controller_id: &str,
        beans: &mut BeanManager,
        session: &SessionHandle,
        event_bus: &Arc<EventBus>,
        result: &mut ServerResult<()>,
    ) {
        let Some(mut controller) = self.controllers.remove(controller_id) else {
            return;
        };
        for child in std::mem::take(&mut controller.children) {
            self.destroy_tree(&child, beans, session, event_bus, result);
        }
        if let Some(parent) = controller
            .parent
            .as_deref()
            .and_then(|p| self.controllers.get_mut(p))
        {
            parent.children.retain(|c| c != controller_id);
        }

        let mut ctx = ActionContext::new(
            controller_id,
            controller.model_id.as_deref(),
            beans,
            session,
            event_bus,
        );
        if let Err(err) = controller
            .controller_type
            .run_destroy(&mut controller.instance, &mut ctx)
        {
            warn!(controller_id, error = %err, "destroy hook failed");
            if result.is_ok() {
                *result = Err(err);
            }
        }
        self.container
            .destroy_controller(&controller.controller_type, controller.instance);
        discard_model(beans, controller.model_id.as_deref());
        debug!(controller = controller.controller_type.name(), controller_id, "controller destroyed");
    }
}

fn discard_model(beans: &mut BeanManager, model_id: Option<&str>) {
    if let Some(model_id) = model_id {
        if let Err(err) = beans.remove(model_id) {
            warn!(model_id, error = %err, "controller model already gone");
        }
    }
}

impl std::fmt::Debug for ControllerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandler")
            .field("registry", &self.registry)
            .field("controllers", &self.controllers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerBuilder, DefaultContainerManager};
    use crate::task_queue::TaskQueue;
    use dolphin_model::{BeanSchema, SchemaRegistry};
    use dolphin_protocol::Value;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Page;

    struct Env {
        beans: BeanManager,
        session: SessionHandle,
        bus: Arc<EventBus>,
    }

    impl Env {
        fn services(&mut self) -> SessionServices<'_> {
            SessionServices {
                beans: &mut self.beans,
                session: &self.session,
                event_bus: &self.bus,
            }
        }
    }

    fn setup() -> (ControllerHandler, Env, Arc<Mutex<Vec<String>>>) {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&destroyed);
        let mut registry = ControllerRegistry::new();
        registry
            .register(
                ControllerBuilder::<Page>::with_default("Page")
                    .with_model("PageModel")
                    .on_init(|_, ctx| ctx.set_model_value("title", "ready"))
                    .on_destroy(move |_, ctx| {
                        log.lock().push(ctx.controller_id().to_string());
                        Ok(())
                    })
                    .action("rename", &["title"], |_, ctx, params| {
                        let title = params.require("title")?.clone();
                        ctx.set_model_value("title", title)
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                ControllerBuilder::<Page>::with_default("Broken")
                    .with_model("PageModel")
                    .on_init(|_, _| Err(ServerError::Internal("init failed".into())))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let mut schemas = SchemaRegistry::new();
        schemas
            .register(BeanSchema::new("PageModel").with_value("title"))
            .unwrap();
        let env = Env {
            beans: BeanManager::with_schemas(Arc::new(schemas)),
            session: SessionHandle::new("s", Arc::new(TaskQueue::new("s", Duration::ZERO))),
            bus: Arc::new(EventBus::new()),
        };
        let handler = ControllerHandler::new(Arc::new(registry), Arc::new(DefaultContainerManager));
        (handler, env, destroyed)
    }

    #[test]
    fn create_runs_init_against_model() {
        let (mut handler, mut env, _) = setup();
        let id = handler.create_controller("Page", None, env.services()).unwrap();
        let model = handler.controller_model(&id).unwrap().to_string();
        assert_eq!(env.beans.get(&model, "title").unwrap(), Value::from("ready"));

        handler
            .invoke_action(&id, "rename", &[ActionParam::new("title", "done")], env.services())
            .unwrap();
        assert_eq!(env.beans.get(&model, "title").unwrap(), Value::from("done"));
        assert!(matches!(
            handler.invoke_action("nope", "rename", &[], env.services()),
            Err(ServerError::ControllerNotFound { .. })
        ));
    }

    #[test]
    fn unknown_type_and_parent_are_rejected() {
        let (mut handler, mut env, _) = setup();
        assert!(matches!(
            handler.create_controller("Missing", None, env.services()),
            Err(ServerError::ControllerTypeNotFound { .. })
        ));
        assert!(matches!(
            handler.create_controller("Page", Some("nope"), env.services()),
            Err(ServerError::ControllerNotFound { .. })
        ));
        assert!(handler.is_empty());
    }

    #[test]
    fn failed_init_leaves_nothing_behind() {
        let (mut handler, mut env, _) = setup();
        assert!(handler.create_controller("Broken", None, env.services()).is_err());
        assert!(handler.is_empty());
        assert!(env.beans.find_all("PageModel").is_empty());
    }

    #[test]
    fn destroy_cascades_to_children() {
        let (mut handler, mut env, destroyed) = setup();
        let parent = handler.create_controller("Page", None, env.services()).unwrap();
        let child = handler
            .create_controller("Page", Some(&parent), env.services())
            .unwrap();
        let other = handler.create_controller("Page", None, env.services()).unwrap();
        assert_eq!(handler.children(&parent), vec![child.clone()]);

        handler.destroy_controller(&parent, env.services()).unwrap();
        assert_eq!(*destroyed.lock(), vec![child.clone(), parent.clone()]);
        assert!(!handler.contains(&child));
        assert!(handler.contains(&other));
        assert_eq!(env.beans.find_all("PageModel").len(), 1);

        assert!(matches!(
            handler.destroy_controller(&parent, env.services()),
            Err(ServerError::ControllerNotFound { .. })
        ));
        handler.destroy_all(env.services()).unwrap();
        assert!(handler.is_empty());
        assert!(env.beans.find_all("PageModel").is_empty());
    }
}
