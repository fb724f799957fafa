//! Calls the `basic` demo server with the httpkit client.
//!
//! Start the server first:
//!   cargo run --example basic
//! then:
//!   cargo run --example client

use httpkit::{Client, Context, Tracer};

#[tokio::main]
async fn main() -> Result<(), httpkit::Error> {
    httpkit::logging::init("info", false)?;

    let client = Client::builder("users-cli", "http://127.0.0.1:3000/")
        .x_token("admin-token")
        .tracer(Tracer::new("users-cli"))
        .build()?;

    let ctx = Context::new()
        .with_request_id("users-cli-000001")
        .with_value("admin-token", "letmein");

    let (status, body) = client.get(&ctx, "/users/42").await?;
    println!("GET /users/42 -> {status}: {}", String::from_utf8_lossy(&body));

    let (status, body) = client.post(&ctx, "/users", r#"{"name":"bob"}"#).await?;
    println!("POST /users -> {status}: {}", String::from_utf8_lossy(&body));

    let (status, body) = client.get(&ctx, "/admin").await?;
    println!("GET /admin -> {status}: {}", String::from_utf8_lossy(&body));

    client.close();
    Ok(())
}
