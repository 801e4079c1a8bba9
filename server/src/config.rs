//! Server tunables
//!
//! Everything the CLI exposes ends up in a [`ServerConfig`]; the defaults
//! are the values a LAN game night is played with.

use shared::{DEFAULT_SERVER_NAME, DISCOVERY_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// How a session decides it is over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoppingPolicy {
    #[default]
    /// Wrong answers are out; the last one standing wins.
    SingleElimination,
    /// Play at least `min_rounds` elimination heats, one point to each heat's
    /// last survivor, then tiebreak heats until a single leader remains.
    Tournament { min_rounds: u32 },
}

/// Timing and policy knobs used by the round coordinator
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub answer_timeout: Duration,
    pub round_pause: Duration,
    pub policy: StoppingPolicy,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(20),
            round_pause: Duration::from_secs(1),
            policy: StoppingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name advertised in discovery packets and the welcome frame
    pub server_name: String,
    pub host: IpAddr,
    /// Stream port, 0 lets the OS choose
    pub port: u16,
    /// Where discovery packets are sent
    pub broadcast_addr: SocketAddr,
    pub broadcast_period: Duration,
    pub min_participants: usize,
    pub max_participants: Option<usize>,
    /// Grace period for latecomers once `min_participants` have joined
    pub join_timeout: Duration,
    pub rounds: RoundSettings,
    /// How long finished clients get to hang up before being cut off
    pub post_game_grace: Duration,
    pub ledger_path: Option<PathBuf>,
    pub questions_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            broadcast_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT),
            broadcast_period: Duration::from_secs(1),
            min_participants: 2,
            max_participants: None,
            join_timeout: Duration::from_secs(10),
            rounds: RoundSettings::default(),
            post_game_grace: Duration::from_secs(3),
            ledger_path: Some(PathBuf::from(format!("{}_Champs.json", DEFAULT_SERVER_NAME))),
            questions_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "NovaBeach");
        assert_eq!(config.port, 0);
        assert_eq!(config.min_participants, 2);
        assert_eq!(config.broadcast_addr.port(), 13117);
        assert_eq!(config.rounds.answer_timeout, Duration::from_secs(20));
        assert_eq!(config.rounds.policy, StoppingPolicy::SingleElimination);
        assert_eq!(
            config.ledger_path,
            Some(PathBuf::from("NovaBeach_Champs.json"))
        );
    }

    #[test]
    fn test_listen_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 4242,
            ..ServerConfig::default()
        };
        assert_eq!(config.listen_addr(), "127.0.0.1:4242".parse().unwrap());
    }
}
