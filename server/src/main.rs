use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, TurnOrder, DEFAULT_HOST, DEFAULT_MAX_PLAYERS, DEFAULT_PORT};
use server::network::Server;
use shared::ca::{ProvisionOptions, Role, DEFAULT_CA_DIR};
use shared::crypto::DEFAULT_KEY_BITS;
use shared::{CertificateAuthority, LocalIdentity};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Connect-four game server", long_about = None)]
struct Args {
    /// Print the server's IPv4 address
    #[arg(short = 'i', long)]
    ipaddr: bool,

    /// Print the server's host name
    #[arg(short = 'd', long)]
    dns: bool,

    /// Print the port the server is listening on
    #[arg(short = 'P', long)]
    print_port: bool,

    /// Port to listen on; an ephemeral port is used if it cannot be bound
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Maximum simultaneous connections (an even number)
    #[arg(long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// RSA key size for the server's own key pair and a newly created CA
    #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
    key_bits: usize,

    /// Directory holding the shared CA key pair
    #[arg(long, default_value = DEFAULT_CA_DIR)]
    ca_dir: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_players: args.max_players,
        key_bits: args.key_bits,
        ca_dir: args.ca_dir,
        turn_order: TurnOrder::Random,
    };
    config.validate()?;

    let options = ProvisionOptions {
        key_bits: config.key_bits,
        ..ProvisionOptions::default()
    };
    let ca = CertificateAuthority::provision(&config.ca_dir, Role::Server, &options).await?;
    let identity = LocalIdentity::generate(config.key_bits, &ca)?;
    info!("Server key pair generated and signed by the CA");

    let mut server = Server::bind(&config, identity, ca).await?;
    let local_addr = server.local_addr()?;

    let host_name = gethostname::gethostname().to_string_lossy().into_owned();
    if args.ipaddr {
        match host_ipv4(&host_name, local_addr).await {
            Some(ip) => println!("IP address: {}", ip),
            None => println!("IP address: unknown"),
        }
    }
    if args.dns {
        println!("DNS name: {}", host_name);
    }
    if args.print_port {
        println!("Port: {}", local_addr.port());
    }

    if let Err(e) = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await
    {
        error!("Server loop failed: {}", e);
        return Err(e);
    }

    Ok(())
}

/// The address clients should use: the bound one unless it is a wildcard,
/// otherwise whatever the host name resolves to.
async fn host_ipv4(host_name: &str, bound: SocketAddr) -> Option<IpAddr> {
    if !bound.ip().is_unspecified() {
        return Some(bound.ip());
    }
    tokio::net::lookup_host((host_name, bound.port()))
        .await
        .ok()?
        .map(|addr| addr.ip())
        .find(IpAddr::is_ipv4)
}
