//! A small server demonstrating contexts, pattern routes and streaming responses.

use async_trait::async_trait;
use clawhttp::{
    Handler, HttpError, HttpServer, Request, Resources, Response, Router, Routes, ScopedLog, ServerConfig,
};
use log::info;
use serde::{Deserialize, Serialize};

struct Hello;

#[async_trait]
impl Handler for Hello {
    async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
        let name = request
            .parameters()
            .into_iter()
            .find(|(key, _)| key == "name")
            .map_or_else(|| "World".to_string(), |(_, value)| value);

        let mut writer = response.open_writer("text/plain")?;
        writer.write(&format!("Hello, {name}!\n")).await?;
        writer.write(&format!("You are at {}\n", request.url(request.relative_path()))).await?;
        writer.close().await
    }
}

#[derive(Serialize, Deserialize)]
struct Item {
    id: String,
    name: String,
}

struct GetItem;

#[async_trait]
impl Handler for GetItem {
    async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
        let id = request.param("id").unwrap_or_default().to_string();
        if id == "0" {
            return Err(HttpError::not_found("Item 0 does not exist"));
        }
        response
            .write_json(&Item {
                name: format!("Item {id}"),
                id,
            })
            .await
    }
}

struct PutItem;

#[async_trait]
impl Handler for PutItem {
    async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
        let item: Item = request.read_json().await?;
        request.log().info(format_args!("Stored item {}", item.id));
        response.set_status(201u16)?;
        response.write_json(&item).await
    }

    fn should_continue(&self, request: &Request<'_>) -> bool {
        request.content_type() == Some("application/json")
    }
}

struct Static(Resources);

#[async_trait]
impl Handler for Static {
    async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
        let name = request.relative_path().to_string();
        response.write_resource(&self.0, &name, "text/css").await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let config = ServerConfig {
        addr: "127.0.0.1:8081".parse()?,
        ..ServerConfig::default()
    };

    let items = Routes::new()
        .get("/items/:id", GetItem)?
        .put("/items/:id", PutItem)?;
    let resources = Resources::new().with("site.css", b"body { font-family: sans-serif; }\n");

    let router = Router::new()
        .mount("/", Hello)
        .mount("/api", items)
        .mount("/static", Static(resources));

    info!("Try GET /?name=you, GET /api/items/7 or GET /static/site.css");

    let server = HttpServer::new(config, router);
    server.start().await?;

    Ok(())
}
