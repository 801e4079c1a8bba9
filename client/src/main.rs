use clap::Parser;
use client::discovery::{bind_discovery_socket, OfferListener};
use client::names::NameGenerator;
use client::network::{Client, ServerSource};
use client::strategy::{BotLevel, BotStrategy, ConsoleStrategy, Strategy};
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{QuestionBank, DISCOVERY_PORT};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of bots to run; 0 plays from the keyboard
    #[arg(short, long, default_value = "0")]
    bots: usize,

    /// How often bots answer correctly
    #[arg(short, long, value_enum, default_value = "average")]
    level: BotLevel,

    /// Team name for a keyboard player; picked at random if omitted
    #[arg(short, long)]
    name: Option<String>,

    /// UDP port to listen on for server offers
    #[arg(long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,

    /// Seconds to wait for an offer before trying again
    #[arg(long, default_value = "10")]
    discovery_timeout: u64,

    /// Connect straight to this server instead of waiting for offers
    #[arg(short, long)]
    server: Option<SocketAddr>,
}

enum Offers {
    Listen(OfferListener),
    Fixed(SocketAddr),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let discovery_timeout = Duration::from_secs(args.discovery_timeout);

    // One discovery socket for every player in this process
    let offers = match args.server {
        Some(addr) => Offers::Fixed(addr),
        None => Offers::Listen(OfferListener::spawn(bind_discovery_socket(args.discovery_port)?)),
    };
    let source = || match &offers {
        Offers::Listen(listener) => ServerSource::Discovery(listener.subscribe()),
        Offers::Fixed(addr) => ServerSource::Fixed(*addr),
    };

    let mut names = NameGenerator::new();
    let mut rng = StdRng::from_entropy();

    if args.bots == 0 {
        let name = match args.name {
            Some(name) => {
                names.reserve(&name);
                name
            }
            None => names.team_name(&mut rng),
        };
        println!("Your team name is: {}", name);

        let strategy = Strategy::Console(ConsoleStrategy::from_stdin());
        let mut client = Client::new(name, strategy, source(), discovery_timeout);
        client.run().await?;
        return Ok(());
    }

    let bank = Arc::new(QuestionBank::builtin());
    info!("Starting {} {:?} bots", args.bots, args.level);

    let mut bots = tokio::task::JoinSet::new();
    for _ in 0..args.bots {
        let name = names.bot_name(&mut rng);
        let strategy = Strategy::Bot(BotStrategy::new(
            args.level,
            Arc::clone(&bank),
            StdRng::from_rng(&mut rng)?,
        ));
        let mut client = Client::new(name, strategy, source(), discovery_timeout);
        bots.spawn(async move {
            if let Err(e) = client.run().await {
                error!("{} stopped: {}", client.name(), e);
            }
        });
    }

    while bots.join_next().await.is_some() {}
    Ok(())
}
