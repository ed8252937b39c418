use clap::Parser;
use roomsync::room_registry::RoomRegistry;
use roomsync::session::SessionRegistry;
use roomsync::transport;
use roomsync::SyncConfig;

#[derive(Parser)]
#[command(name = "roomsync-server", about = "Real-time room state-synchronization server")]
struct Args {
    /// Port to listen on
    port: u16,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = SyncConfig::new(([0, 0, 0, 0], args.port).into());

    if let Err(e) = transport::serve(config, SessionRegistry::new(), RoomRegistry::new()).await {
        eprintln!("failed to start roomsync server: {e}");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}
