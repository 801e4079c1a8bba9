use clap::{Parser, ValueEnum};
use log::info;
use server::config::{RoundSettings, ServerConfig, StoppingPolicy};
use server::network::Server;
use shared::{DEFAULT_SERVER_NAME, DISCOVERY_PORT};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Last one standing wins
    Single,
    /// Several elimination rounds, most round wins takes it
    Tournament,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to listen on
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// TCP port to listen on, 0 picks a free one
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Name advertised to clients
    #[arg(short, long, default_value = DEFAULT_SERVER_NAME)]
    name: String,

    /// UDP port clients listen on for offers
    #[arg(long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,

    /// Address offers are broadcast to
    #[arg(long, default_value = "255.255.255.255")]
    broadcast_addr: IpAddr,

    /// Milliseconds between offers
    #[arg(long, default_value = "1000")]
    broadcast_period: u64,

    #[arg(long, default_value = "2")]
    min_players: usize,

    /// Close admission as soon as this many have joined
    #[arg(long)]
    max_players: Option<usize>,

    /// Seconds to wait for latecomers once enough players have joined
    #[arg(long, default_value = "10")]
    join_timeout: u64,

    /// Seconds each player has to answer
    #[arg(long, default_value = "20")]
    answer_timeout: u64,

    /// Milliseconds between questions
    #[arg(long, default_value = "1000")]
    round_pause: u64,

    /// Seconds finished clients get to disconnect on their own
    #[arg(long, default_value = "3")]
    post_game_grace: u64,

    #[arg(short, long, value_enum, default_value = "single")]
    mode: Mode,

    /// Minimum rounds in tournament mode
    #[arg(long, default_value = "3")]
    min_rounds: u32,

    /// Win ledger file; defaults to <name>_Champs.json
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// JSON question file to use instead of the built-in questions
    #[arg(long)]
    questions: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let policy = match self.mode {
            Mode::Single => StoppingPolicy::SingleElimination,
            Mode::Tournament => StoppingPolicy::Tournament {
                min_rounds: self.min_rounds,
            },
        };
        let ledger = self
            .ledger
            .unwrap_or_else(|| PathBuf::from(format!("{}_Champs.json", self.name)));

        ServerConfig {
            server_name: self.name,
            host: self.host,
            port: self.port,
            broadcast_addr: SocketAddr::new(self.broadcast_addr, self.discovery_port),
            broadcast_period: Duration::from_millis(self.broadcast_period),
            min_participants: self.min_players,
            max_participants: self.max_players,
            join_timeout: Duration::from_secs(self.join_timeout),
            rounds: RoundSettings {
                answer_timeout: Duration::from_secs(self.answer_timeout),
                round_pause: Duration::from_millis(self.round_pause),
                policy,
            },
            post_game_grace: Duration::from_secs(self.post_game_grace),
            ledger_path: Some(ledger),
            questions_path: self.questions,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!("Starting {} with {:?}", config.server_name, config.rounds.policy);

    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
