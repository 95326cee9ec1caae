//! Builds a small routing tree and pushes a few requests through it.
//!
//! Run with `RUST_LOG=debug` to see the dispatcher's own events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use waypoint::http::{Recorder, Request, StatusCode};
use waypoint::middleware::{json, logger};
use waypoint::{Context, HandlerResult, Router, handler};

#[derive(Debug, Deserialize, Serialize)]
struct Greeting {
    name: String,
}

fn hello(ctx: &mut Context) -> HandlerResult {
    ctx.set_body("Hello, World!");
    Ok(())
}

fn greet(ctx: &mut Context) -> HandlerResult {
    let greeting: Greeting = ctx.decode_body()?;
    ctx.set_status(StatusCode::CREATED);
    ctx.set_json(&serde_json::json!({ "message": format!("Hello, {}!", greeting.name) }))?;
    Ok(())
}

fn user(ctx: &mut Context) -> HandlerResult {
    let id = ctx.param("id").unwrap_or_default().to_owned();
    ctx.set_json(&serde_json::json!({ "id": id }))?;
    Ok(())
}

async fn show(router: &Arc<Router>, request: Request) -> Result<(), Box<dyn std::error::Error>> {
    let recorder = Recorder::new();
    router.serve_blocking(request, recorder.clone()).await?;
    println!("{}", String::from_utf8_lossy(&recorder.to_http_bytes()));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut users = Router::new();
    users.public_get("/users/:id(\\d+)", [handler(user)]);

    let mut router = Router::new();
    router.use_all([logger(), json()]);
    router.public_get("/", [handler(hello)]);
    router.public_post("/greet", [handler(greet)]);
    router.use_at("/users", users);
    let router = Arc::new(router);

    for descriptor in router.route_descriptors() {
        println!("route: {descriptor}");
    }
    println!();

    show(&router, Request::new("GET", "/")).await?;
    show(
        &router,
        Request::new("POST", "/greet")
            .header("Content-Type", "application/json")
            .body(r#"{"name":"waypoint"}"#),
    )
    .await?;
    show(&router, Request::new("GET", "/users/42")).await?;
    show(&router, Request::new("GET", "/users/nope")).await?;
    Ok(())
}
