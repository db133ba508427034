//! Client and server talking over a real socket.

use dolphin_client::{ClientConfig, ClientContext, CommandTransport, HttpTransport};
use dolphin_http::{serve_listener, ReqwestClient};
use dolphin_model::BeanSchema;
use dolphin_protocol::{ActionParam, Value};
use dolphin_server::{ControllerBuilder, DolphinServer, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

#[derive(Default)]
struct Greeter;

fn server() -> Arc<DolphinServer> {
    let greeter = ControllerBuilder::<Greeter>::with_default("Greeter")
        .with_model("Greeting")
        .action("greet", &["name"], |_, ctx, params| {
            let name = params.require("name")?.as_text().unwrap_or("nobody").to_string();
            ctx.set_model_value("text", format!("Hello, {name}!"))
        })
        .build()
        .unwrap();
    Arc::new(
        DolphinServer::builder()
            .with_config(ServerConfig::default().with_max_poll_time(Duration::from_millis(100)))
            .schema(BeanSchema::new("Greeting").with_value("text"))
            .unwrap()
            .controller(greeter)
            .unwrap()
            .build(),
    )
}

#[test]
fn greet_over_http() {
    let server = server();
    let runtime = Runtime::new().unwrap();
    let listener = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = runtime.spawn(serve_listener(Arc::clone(&server), listener, async move {
        let _ = stop_rx.await;
    }));

    let url = format!("http://{addr}{}", server.config().endpoint_path);
    let transport: Arc<dyn CommandTransport> =
        Arc::new(HttpTransport::new(url.clone(), ReqwestClient::new().unwrap()));
    let context = ClientContext::new(
        ClientConfig::new(url)
            .with_push_enabled(true)
            .with_connection_timeout(Duration::from_secs(10)),
        transport,
    )
    .unwrap();

    context.connect().unwrap();
    let greeter = context.create_controller("Greeter").unwrap();
    greeter
        .invoke("greet", vec![ActionParam::new("name", "Dolphin")])
        .unwrap();
    assert_eq!(
        greeter.model().unwrap().value("text"),
        Some(&Value::from("Hello, Dolphin!"))
    );
    context.disconnect().unwrap();
    assert_eq!(server.session_count(), 0);

    let _ = stop_tx.send(());
    runtime.block_on(serving).unwrap().unwrap();
}
