use clap::Parser;
use client::game::{play, ClientGame};
use client::input::{prompt_name, LineMoves};
use client::network::ServerLink;
use client::rendering::TerminalRenderer;
use log::{error, info};
use shared::ca::{ProvisionOptions, Role, DEFAULT_CA_DIR};
use shared::crypto::DEFAULT_KEY_BITS;
use shared::{CertificateAuthority, LocalIdentity};
use std::path::PathBuf;

const INSTRUCTIONS: &str = "\
How to play:
  Two players take turns dropping pieces into a 7-column, 6-row grid.
  When it is your turn, type a column number (0-6) and press Enter.
  The first player to line up four pieces horizontally, vertically or
  diagonally wins. A full board with no line of four is a draw.
  If your opponent disconnects mid-game, you win by forfeit.";

#[derive(Parser, Debug)]
#[command(author, version, about = "Connect-four game client", long_about = None, after_help = INSTRUCTIONS)]
struct Args {
    /// Server IP address or host name
    #[arg(short = 'i', long = "server_ip")]
    server_ip: String,

    /// Server port
    #[arg(short, long)]
    port: u16,

    /// Print what the server address resolves to
    #[arg(short = 'n', long)]
    dns: bool,

    /// Display name; asked for interactively when omitted
    #[arg(long)]
    name: Option<String>,

    /// RSA key size for this client's key pair
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

    if args.dns {
        let resolved: Vec<_> = tokio::net::lookup_host((args.server_ip.as_str(), args.port))
            .await?
            .collect();
        for addr in resolved {
            println!("{} resolves to {}", args.server_ip, addr.ip());
        }
    }

    let name = match args.name {
        Some(name) => name,
        None => prompt_name(&mut std::io::stdin().lock(), &mut std::io::stdout())?,
    };

    let options = ProvisionOptions {
        key_bits: args.key_bits,
        ..ProvisionOptions::default()
    };
    let ca = CertificateAuthority::provision(&args.ca_dir, Role::Client, &options).await?;
    let identity = LocalIdentity::generate(args.key_bits, &ca)?;

    info!("Connecting to {}:{}", args.server_ip, args.port);
    let mut link = ServerLink::connect((args.server_ip.as_str(), args.port), identity, ca).await?;

    let player_id = match link.register(&name).await {
        Ok(player_id) => player_id,
        Err(e) => {
            error!("Registration failed: {}", e);
            eprintln!("Could not join the game: {}", e);
            std::process::exit(1);
        }
    };

    let mut renderer = TerminalRenderer::stdout();
    renderer.welcome(player_id)?;

    let mut game = ClientGame::new(player_id);
    let mut moves = LineMoves::stdin();
    let result = play(&mut link, &mut game, &mut moves, &mut renderer).await?;
    info!("Game finished: {:?}", result);

    Ok(())
}
