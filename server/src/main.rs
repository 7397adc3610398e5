//! Server entry point: configuration, database bring-up, world load,
//! listener and worker spawn, graceful shutdown.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use tokio::net::{TcpListener, UdpSocket};

use server::config::Config;
use server::network::GameServer;
use server::persistence::Store;
use server::{tick, worldgen};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind both listeners on
    #[clap(long, default_value = "0.0.0.0")]
    host: String,

    /// GeoJSON source for first-run world generation
    #[clap(long, default_value = "assets/countries.geojson")]
    world: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Hint: set RUST_LOG=info to see server logs");
    }

    let args = Args::parse();
    let config = Config::from_env()?;

    let store = Store::connect(&config).await?;
    store.ensure_schema().await?;
    store.seed_units().await?;

    // First run on an empty database: rasterise the world.
    let mut countries = store.load_countries().await?;
    if countries.is_empty() {
        worldgen::run(&store, &args.world).await?;
        countries = store.load_countries().await?;
    }
    store.seed_player().await?;

    let units = store.load_units().await?;
    let tiles = store.load_tiles().await?;

    // The same port, bound twice: streams and datagrams.
    let addr = format!("{}:{}", args.host, config.app_port);
    let tcp_listener = TcpListener::bind(&addr).await?;
    let udp_socket = Arc::new(UdpSocket::bind(&addr).await?);
    info!("listening on {} (tcp + udp)", addr);

    let server = Arc::new(GameServer::new(config, store, udp_socket));
    server.load_world(countries, units, tiles).await;

    tokio::spawn(Arc::clone(&server).run_tcp_listener(tcp_listener));
    tokio::spawn(Arc::clone(&server).run_udp_listener());
    tokio::spawn(tick::run(Arc::clone(&server)));
    tokio::spawn(Arc::clone(&server.net).run_reassembly_sweeper());
    tokio::spawn(Arc::clone(&server.net).run_sent_cache_reaper());
    tokio::spawn(Arc::clone(&server).run_session_reaper());
    tokio::spawn(Arc::clone(&server).run_persistence_sink());

    info!("server started");

    tokio::signal::ctrl_c().await?;
    warn!("interrupt received, shutting down");

    // Drain: one final checkpoint, then let the listeners drop.
    server.persist_world().await;
    info!("server stopped");
    Ok(())
}
