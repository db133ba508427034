//! Integration tests for the client against an in-process server.

use dolphin_client::{
    ClientConfig, ClientContext, ClientError, CommandTransport, HttpTransport, LoopbackClient,
};
use dolphin_model::BeanSchema;
use dolphin_protocol::{ActionParam, HttpResponse, Value, DEFAULT_ENDPOINT};
use dolphin_server::{ControllerBuilder, DolphinServer, ServerConfig, ServerError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Counter {
    count: i64,
}

fn server(max_poll_time: Duration) -> Arc<DolphinServer> {
    let counter = ControllerBuilder::<Counter>::with_default("Counter")
        .with_model("CounterModel")
        .action("increment", &[], |counter, ctx, _| {
            counter.count += 1;
            ctx.set_model_value("count", counter.count)
        })
        .action("add", &["amount"], |counter, ctx, params| {
            let amount = params
                .require("amount")?
                .as_integer()
                .ok_or_else(|| ServerError::action_failed("add", "amount is not an integer"))?;
            counter.count += amount;
            ctx.set_model_value("count", counter.count)
        })
        .action("fail", &[], |_, _, _| {
            Err(ServerError::action_failed("fail", "requested failure"))
        })
        .build()
        .unwrap();

    Arc::new(
        DolphinServer::builder()
            .with_config(ServerConfig::default().with_max_poll_time(max_poll_time))
            .schema(BeanSchema::new("CounterModel").with_value("count"))
            .unwrap()
            .controller(counter)
            .unwrap()
            .build(),
    )
}

fn client(server: &Arc<DolphinServer>, push: bool) -> ClientContext {
    let server = Arc::clone(server);
    let loopback = LoopbackClient::new(move |id: Option<&str>, body: &str| -> HttpResponse {
        server.handle_request(id, body)
    });
    let transport: Arc<dyn CommandTransport> = Arc::new(HttpTransport::new(DEFAULT_ENDPOINT, loopback));
    let config = ClientConfig::new(DEFAULT_ENDPOINT)
        .with_defer_window(Duration::from_millis(2))
        .with_push_enabled(push)
        .with_connection_timeout(Duration::from_secs(5));
    ClientContext::new(config, transport).unwrap()
}

fn count(context: &ClientContext, model_id: &str) -> Option<Value> {
    context
        .store()
        .lock()
        .find_by_id(model_id)
        .and_then(|m| m.value("count").cloned())
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn controller_round_trip() {
    let server = server(Duration::from_millis(50));
    let context = client(&server, false);
    context.connect().unwrap();
    assert_eq!(server.session_count(), 1);

    let counter = context.create_controller("Counter").unwrap();
    let model_id = counter.model_id().unwrap().to_string();
    assert_eq!(count(&context, &model_id), Some(Value::Null));

    counter.invoke("increment", Vec::new()).unwrap();
    counter
        .invoke("add", vec![ActionParam::new("amount", 41i64)])
        .unwrap();
    assert_eq!(count(&context, &model_id), Some(Value::Integer(42)));

    counter.destroy().unwrap();
    assert!(context.store().lock().find_by_id(&model_id).is_none());
    context.disconnect().unwrap();
    assert_eq!(server.session_count(), 0);
}

#[test]
fn action_error_is_reported_without_killing_the_session() {
    let server = server(Duration::from_millis(50));
    let context = client(&server, false);
    context.connect().unwrap();
    let counter = context.create_controller("Counter").unwrap();

    assert_eq!(
        counter.invoke("fail", Vec::new()),
        Err(ClientError::ControllerAction {
            controller_id: counter.id().to_string(),
            action_name: "fail".into()
        })
    );
    assert!(matches!(
        counter.invoke("no-such-action", Vec::new()),
        Err(ClientError::ControllerAction { .. })
    ));
    counter.invoke("increment", Vec::new()).unwrap();
    assert_eq!(
        count(&context, counter.model_id().unwrap()),
        Some(Value::Integer(1))
    );
    assert_eq!(server.session_count(), 1);
}

#[test]
fn unknown_controller_fails_the_request() {
    let server = server(Duration::from_millis(50));
    let context = client(&server, false);
    context.connect().unwrap();
    assert!(context.create_controller("Missing").is_err());
}

#[test]
fn server_push_reaches_the_client() {
    let server = server(Duration::from_millis(200));
    let context = client(&server, true);
    context.connect().unwrap();
    let counter = context.create_controller("Counter").unwrap();
    let model_id = counter.model_id().unwrap().to_string();

    let client_id = context.connector().client_id().unwrap();
    let session = server.session(&client_id).unwrap();
    let target = model_id.clone();
    session.run_later(move |beans| beans.set(&target, "count", 99i64));

    assert!(wait_for(Duration::from_secs(5), || {
        count(&context, &model_id) == Some(Value::Integer(99))
    }));

    // Sending while a poll is outstanding releases it first.
    counter.invoke("increment", Vec::new()).unwrap();
    assert_eq!(count(&context, &model_id), Some(Value::Integer(1)));
    context.disconnect().unwrap();
}

#[test]
fn local_changes_reach_the_server_model() {
    let server = server(Duration::from_millis(50));
    let context = client(&server, false);
    context.connect().unwrap();
    let counter = context.create_controller("Counter").unwrap();
    let model_id = counter.model_id().unwrap().to_string();

    context
        .set_property(&model_id, "count", Value::Integer(10))
        .unwrap();
    context.sync().unwrap();
    // The controller's own counter is independent of the model value.
    counter.invoke("increment", Vec::new()).unwrap();
    assert_eq!(count(&context, &model_id), Some(Value::Integer(1)));
}

#[test]
fn expired_session_is_reported() {
    let server = server(Duration::from_millis(50));
    let first = client(&server, false);
    first.connect().unwrap();
    let stale_id = first.connector().client_id().unwrap();
    first.disconnect().unwrap();

    let response = server.handle_request(Some(&stale_id), "[]");
    assert_eq!(response.status, dolphin_protocol::status::REQUEST_TIMEOUT);
}
