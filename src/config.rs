//! Wallet and sync configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Per-network parameters the sync layer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
	/// Network name, also used as the per-network directory name.
	pub name: String,
	/// Port appended to trusted backend addresses given without one.
	pub rpc_default_port: u16,
	/// Port appended to peer addresses given without one.
	pub peer_default_port: u16,
}

impl NetworkParams {
	pub fn mainnet() -> Self {
		Self {
			name: "mainnet".to_string(),
			rpc_default_port: 9109,
			peer_default_port: 9108,
		}
	}

	pub fn testnet3() -> Self {
		Self {
			name: "testnet3".to_string(),
			rpc_default_port: 19109,
			peer_default_port: 19108,
		}
	}

	pub fn simnet() -> Self {
		Self {
			name: "simnet".to_string(),
			rpc_default_port: 19556,
			peer_default_port: 18555,
		}
	}
}

impl Default for NetworkParams {
	fn default() -> Self {
		Self::testnet3()
	}
}

/// Tuning for background sync operations
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// First delay before restarting a failed trustless run loop
	pub retry_initial_interval: Duration,
	/// Upper bound on the restart delay
	pub retry_max_interval: Duration,
	/// Buffer between the engine's rescan and the progress consumer
	pub rescan_channel_capacity: usize,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			retry_initial_interval: Duration::from_secs(1),
			retry_max_interval: Duration::from_secs(60),
			rescan_channel_capacity: 1,
		}
	}
}

/// Top-level configuration for a `WalletService`.
#[derive(Debug, Clone)]
pub struct WalletConfig {
	pub home_dir: PathBuf,
	pub network: NetworkParams,
	/// Address gap limit, added to the last used index when reporting key counts.
	pub gap_limit: u32,
	pub sync: SyncConfig,
}

impl WalletConfig {
	pub fn new(home_dir: impl Into<PathBuf>, network: NetworkParams) -> Self {
		Self {
			home_dir: home_dir.into(),
			network,
			gap_limit: 20,
			sync: SyncConfig::default(),
		}
	}

	/// Directory holding per-network wallet data, including the peer address manager.
	pub fn data_dir(&self) -> PathBuf {
		self.home_dir.join(&self.network.name)
	}
}
