//! Ready-made controllers, schemas and client/server wiring for tests.

use dolphin_client::{
    ClientConfig, ClientContext, ClientResult, CommandTransport, HttpTransport, LoopbackClient,
};
use dolphin_model::BeanSchema;
use dolphin_protocol::{HttpResponse, Value, DEFAULT_ENDPOINT};
use dolphin_server::{
    ControllerBuilder, ControllerType, DolphinServer, ServerConfig, ServerError, ServerResult,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Name of the counter controller.
pub const COUNTER_CONTROLLER: &str = "Counter";
/// Bean type of the counter model.
pub const COUNTER_MODEL: &str = "CounterModel";
/// Name of the todo-list controller.
pub const TODO_CONTROLLER: &str = "TodoList";
/// Bean type of the todo-list model.
pub const TODO_LIST_MODEL: &str = "TodoListModel";
/// Bean type of one todo item.
pub const TODO_ITEM: &str = "TodoItem";

#[derive(Debug, Default)]
struct Counter {
    count: i64,
}

/// A controller with a `count` model and `increment`, `add(amount)`,
/// `reset` and `fail` actions.
pub fn counter_controller() -> ServerResult<ControllerType> {
    ControllerBuilder::<Counter>::with_default(COUNTER_CONTROLLER)
        .with_model(COUNTER_MODEL)
        .on_init(|counter, ctx| ctx.set_model_value("count", counter.count))
        .action("increment", &[], |counter, ctx, _| {
            counter.count += 1;
            ctx.set_model_value("count", counter.count)
        })
        .action("add", &["amount"], |counter, ctx, params| {
            let amount = params
                .require("amount")?
                .as_integer()
                .ok_or_else(|| ServerError::action_failed("add", "amount must be an integer"))?;
            counter.count += amount;
            ctx.set_model_value("count", counter.count)
        })
        .action("reset", &[], |counter, ctx, _| {
            counter.count = 0;
            ctx.set_model_value("count", 0i64)
        })
        .action("fail", &[], |_, _, _| {
            Err(ServerError::action_failed("fail", "failure requested"))
        })
        .build()
}

/// A controller managing a list of todo item beans.
///
/// `add(text)` creates an item, `remove(index)` drops it from the list so
/// the garbage collector can reclaim it.
pub fn todo_controller() -> ServerResult<ControllerType> {
    ControllerBuilder::<()>::with_default(TODO_CONTROLLER)
        .with_model(TODO_LIST_MODEL)
        .action("add", &["text"], |_, ctx, params| {
            let text = params.require("text")?.clone();
            let list = model_id(ctx.model_id())?;
            let item = ctx.beans().create(TODO_ITEM)?;
            ctx.beans().set(&item, "text", text)?;
            ctx.beans().set(&item, "done", false)?;
            ctx.beans().list_add(&list, "items", item)
        })
        .action("remove", &["index"], |_, ctx, params| {
            let index = params
                .require("index")?
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| ServerError::action_failed("remove", "index must be a position"))?;
            let list = model_id(ctx.model_id())?;
            ctx.beans().list_remove(&list, "items", index).map(|_| ())
        })
        .build()
}

fn model_id(model_id: Option<&str>) -> ServerResult<String> {
    model_id
        .map(str::to_string)
        .ok_or_else(|| ServerError::Internal("controller has no model".into()))
}

/// Schemas used by [`counter_controller`] and [`todo_controller`].
pub fn fixture_schemas() -> Vec<BeanSchema> {
    vec![
        BeanSchema::new(COUNTER_MODEL).with_value("count"),
        BeanSchema::new(TODO_LIST_MODEL).with_bean_list("items", TODO_ITEM),
        BeanSchema::new(TODO_ITEM).with_value("text").with_value("done"),
    ]
}

/// Builds a server with the fixture controllers and schemas.
pub fn fixture_server(config: ServerConfig) -> ServerResult<Arc<DolphinServer>> {
    let mut builder = DolphinServer::builder().with_config(config);
    for schema in fixture_schemas() {
        builder = builder.schema(schema)?;
    }
    let server = builder
        .controller(counter_controller()?)?
        .controller(todo_controller()?)?
        .build();
    Ok(Arc::new(server))
}

/// A client transport that calls the server in-process.
pub fn loopback_transport(server: &Arc<DolphinServer>) -> Arc<dyn CommandTransport> {
    let server = Arc::clone(server);
    let client = LoopbackClient::new(move |client_id: Option<&str>, body: &str| -> HttpResponse {
        server.handle_request(client_id, body)
    });
    Arc::new(HttpTransport::new(DEFAULT_ENDPOINT, client))
}

/// Client settings suited to tests: short defer window and timeout.
pub fn test_client_config(push_enabled: bool) -> ClientConfig {
    ClientConfig::new(DEFAULT_ENDPOINT)
        .with_defer_window(Duration::from_millis(2))
        .with_push_enabled(push_enabled)
        .with_connection_timeout(Duration::from_secs(5))
}

/// A connected client wired to an in-process server.
pub fn connected_client(server: &Arc<DolphinServer>, push_enabled: bool) -> ClientResult<ClientContext> {
    let context = ClientContext::new(test_client_config(push_enabled), loopback_transport(server))?;
    context.connect()?;
    Ok(context)
}

/// Reads a property of a model from the client store.
pub fn client_value(context: &ClientContext, model_id: &str, property: &str) -> Option<Value> {
    context
        .store()
        .lock()
        .find_by_id(model_id)
        .and_then(|m| m.value(property).cloned())
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
