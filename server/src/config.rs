//! Server settings assembled from the command line

use shared::ca::DEFAULT_CA_DIR;
use shared::crypto::DEFAULT_KEY_BITS;
use std::path::PathBuf;
use thiserror::Error;

/// Well-known port clients connect to when nothing else is configured
pub const DEFAULT_PORT: u16 = 55667;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_MAX_PLAYERS: usize = 2;

/// Smallest RSA modulus that still leaves room for a JSON chunk per block
pub const MIN_KEY_BITS: usize = 512;

/// Who opens a freshly paired session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOrder {
    /// Uniform choice between the two seats
    Random,
    /// Always the given seat (0 = first to register). Used by tests.
    Fixed(usize),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_players: usize,
    pub key_bits: usize,
    pub ca_dir: PathBuf,
    pub turn_order: TurnOrder,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max players must be an even number of at least 2, got {0}")]
    MaxPlayers(usize),

    #[error("key size must be at least 512 bits, got {0}")]
    KeyBits(usize),

    #[error("turn order seat {0} does not exist, sessions have two seats")]
    Seat(usize),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
            key_bits: DEFAULT_KEY_BITS,
            ca_dir: PathBuf::from(DEFAULT_CA_DIR),
            turn_order: TurnOrder::Random,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Same host, port 0: the OS picks a free port
    pub fn fallback_addr(&self) -> String {
        format!("{}:0", self.host)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players < 2 || self.max_players % 2 != 0 {
            return Err(ConfigError::MaxPlayers(self.max_players));
        }
        if self.key_bits < MIN_KEY_BITS {
            return Err(ConfigError::KeyBits(self.key_bits));
        }
        if let TurnOrder::Fixed(seat) = self.turn_order {
            if seat > 1 {
                return Err(ConfigError::Seat(seat));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:55667");
        assert_eq!(config.fallback_addr(), "0.0.0.0:0");
        assert_eq!(config.max_players, 2);
        assert_eq!(config.ca_dir, PathBuf::from("ca_keys"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_player_count_must_be_even() {
        for bad in [0, 1, 3, 7] {
            let config = ServerConfig {
                max_players: bad,
                ..ServerConfig::default()
            };
            assert_eq!(config.validate(), Err(ConfigError::MaxPlayers(bad)));
        }

        let config = ServerConfig {
            max_players: 6,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tiny_keys_rejected() {
        let config = ServerConfig {
            key_bits: 256,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::KeyBits(256)));
    }

    #[test]
    fn test_fixed_seat_range() {
        let config = ServerConfig {
            turn_order: TurnOrder::Fixed(2),
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Seat(2)));
    }
}
