//! Demo command implementation.
//!
//! Runs a client against an in-process server and prints what the client
//! store sees after each step.

use dolphin_client::ClientContext;
use dolphin_protocol::{ActionParam, Value};
use dolphin_server::ServerConfig;
use dolphin_testkit::{
    client_value, connected_client, fixture_server, COUNTER_CONTROLLER, TODO_CONTROLLER, TODO_ITEM,
};
use std::time::Duration;

/// Runs the demo.
pub fn run(increments: u32) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::default().with_max_poll_time(Duration::from_millis(200));
    let server = fixture_server(config)?;
    let client = connected_client(&server, false)?;
    println!(
        "Connected as {}",
        client.connector().client_id().unwrap_or_default()
    );

    let counter = client.create_controller(COUNTER_CONTROLLER)?;
    let model = counter.model_id().ok_or("Counter has no model")?.to_string();
    for _ in 0..increments {
        counter.invoke("increment", Vec::new())?;
    }
    counter.invoke("add", vec![ActionParam::new("amount", 10i64)])?;
    println!("Counter: {}", display(&client, &model, "count"));

    if let Err(err) = counter.invoke("fail", Vec::new()) {
        println!("Failing action reported: {err}");
    }

    let todo = client.create_controller(TODO_CONTROLLER)?;
    for text in ["write tests", "ship it"] {
        todo.invoke("add", vec![ActionParam::new("text", text)])?;
    }
    let items: Vec<String> = {
        let store = client.store().lock();
        store
            .find_all_by_type(TODO_ITEM)
            .iter()
            .map(|item| item.value("text").cloned().unwrap_or_default().to_string())
            .collect()
    };
    println!("Todo items: {}", items.join(", "));

    todo.destroy()?;
    counter.destroy()?;
    client.disconnect()?;
    println!("Disconnected, {} live sessions", server.session_count());
    Ok(())
}

fn display(client: &ClientContext, model_id: &str, property: &str) -> Value {
    client_value(client, model_id, property).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_to_completion() {
        run(3).unwrap();
    }
}
