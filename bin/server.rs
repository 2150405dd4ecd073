// Gym Access - Web Server
// REST API with Axum over the role-scoped access layer

use anyhow::{Context, Result};
use clap::Parser;
use gym_access::{api, init_logging, StoreArgs};

#[derive(Parser, Debug)]
#[command(name = "gym-server", version, about = "Gym dashboard REST API")]
struct ServerArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Address to listen on
    #[arg(long, env = "GYM_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = ServerArgs::parse();

    let access = args.store.open_access()?;
    let app = api::router(access);

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;

    println!("🚀 Server running on http://{}", args.addr);
    println!("📊 API endpoints:");
    println!("   GET  /api/health");
    println!("   GET  /api/session?role=&user=");
    println!("   GET  /api/branches            POST (admin)");
    println!("   GET  /api/instructors         POST (admin)");
    println!("   GET  /api/users");
    println!("   POST /api/users/:id/check-in");
    println!("   POST /api/terms               GET (admin)");
    println!("   GET  /api/announcements       POST");
    println!("   GET  /api/audit/references    (admin)");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
