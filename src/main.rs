use std::net::SocketAddr;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pg = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .context("could not connect to Postgres")?;
    sqlx::migrate!("./migrations").run(&pg).await?;

    let addr: SocketAddr = std::env::var("SLMS_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .context("SLMS_BIND_ADDR must be a socket address")?;

    log::info!("Starting SLMS HTTP Server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(slms_server::app(pg).into_make_service())
        .await?;
    Ok(())
}
