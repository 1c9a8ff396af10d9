//! Persistent game snapshots stored as JSON files.
//!
//! A snapshot carries the immutable configuration, the full mutable state, and a SHA-256
//! digest of the serialized state that is checked again on load.

use crate::{
    config::PoolConfig,
    errors::{PoolResult, StorageError},
    games::{processor::Collaborators, types::Address, PoolGame},
    state_manager::GameState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub version: u32,
    pub config: PoolConfig,
    pub first_segment_start: u64,
    pub yield_token: Address,
    pub taken_at: DateTime<Utc>,
    pub state: GameState,
    /// Hex SHA-256 of the JSON-encoded `state`
    pub state_hash: String,
}

/// Digest of the canonical JSON encoding. Maps in the state are ordered, so equal states
/// always hash equally.
pub fn state_hash(state: &GameState) -> PoolResult<String> {
    let bytes = serde_json::to_vec(state).map_err(|e| {
        StorageError::WriteFailed(format!("Failed to encode game state: {}", e))
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl GameSnapshot {
    pub fn capture(game: &PoolGame) -> PoolResult<Self> {
        let state = game.state();
        Ok(Self {
            version: SNAPSHOT_FORMAT_VERSION,
            config: PoolConfig {
                game: game.config().clone(),
                collaborators: game.addresses().clone(),
                ..Default::default()
            },
            first_segment_start: game.clock().first_segment_start,
            yield_token: game.yield_token().clone(),
            taken_at: Utc::now(),
            state_hash: state_hash(&state)?,
            state,
        })
    }

    pub fn verify(&self) -> PoolResult<()> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(StorageError::CorruptedData(format!(
                "Unsupported snapshot version {}",
                self.version
            ))
            .into());
        }
        let actual = state_hash(&self.state)?;
        if actual != self.state_hash {
            return Err(StorageError::CorruptedData(format!(
                "State hash mismatch: recorded {}, computed {}",
                self.state_hash, actual
            ))
            .into());
        }
        Ok(())
    }

    /// Rebuild a live game on top of `collaborators`. The data provider is not consulted
    /// again; the recorded yield token is reused.
    pub fn into_game(self, collaborators: Collaborators) -> PoolResult<PoolGame> {
        self.verify()?;
        self.config.validate()?;
        Ok(PoolGame::assemble(
            &self.config,
            self.first_segment_start,
            self.yield_token,
            self.state,
            collaborators,
        ))
    }
}

impl PoolGame {
    pub fn snapshot(&self) -> PoolResult<GameSnapshot> {
        GameSnapshot::capture(self)
    }

    pub fn restore(snapshot: GameSnapshot, collaborators: Collaborators) -> PoolResult<Self> {
        snapshot.into_game(collaborators)
    }
}

pub fn store_snapshot<P: AsRef<Path>>(path: P, snapshot: &GameSnapshot, pretty: bool) -> PoolResult<()> {
    let path = path.as_ref();
    let bytes = if pretty {
        serde_json::to_vec_pretty(snapshot)
    } else {
        serde_json::to_vec(snapshot)
    }
    .map_err(|e| StorageError::WriteFailed(format!("Failed to encode snapshot: {}", e)))?;

    std::fs::write(path, bytes).map_err(|e| {
        StorageError::WriteFailed(format!("Failed to write {}: {}", path.display(), e))
    })?;

    tracing::info!(
        "Stored snapshot of {} players to {}",
        snapshot.state.ledger.player_count(),
        path.display()
    );
    Ok(())
}

pub fn load_snapshot<P: AsRef<Path>>(path: P) -> PoolResult<GameSnapshot> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let snapshot: GameSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::CorruptedData(format!("Failed to decode {}: {}", path.display(), e))
    })?;
    snapshot.verify()?;

    tracing::debug!("Loaded snapshot taken at {}", snapshot.taken_at);
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GhostPoolError;
    use crate::simulation::Sandbox;
    use tempfile::tempdir;

    fn played_sandbox() -> Sandbox {
        let sandbox = Sandbox::new(PoolConfig::testing()).unwrap();
        for name in ["alice", "bob"] {
            let player = sandbox.fund_player(name, 100);
            sandbox.game.join(&player).unwrap();
        }
        sandbox
    }

    #[test]
    fn test_store_and_load_round_trip() -> PoolResult<()> {
        let sandbox = played_sandbox();
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.json");

        let snapshot = sandbox.game.snapshot()?;
        store_snapshot(&path, &snapshot, true)?;
        let loaded = load_snapshot(&path)?;

        assert_eq!(loaded.state, snapshot.state);
        assert_eq!(loaded.state.total_game_principal, 20);
        Ok(())
    }

    #[test]
    fn test_tampered_state_is_rejected() -> PoolResult<()> {
        let sandbox = played_sandbox();
        let mut snapshot = GameSnapshot::capture(&sandbox.game)?;
        snapshot.state.total_game_principal += 1;

        match snapshot.verify() {
            Err(GhostPoolError::Storage(StorageError::CorruptedData(msg))) => {
                assert!(msg.contains("hash mismatch"));
            }
            other => panic!("Expected corrupted data, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_restored_game_continues() -> PoolResult<()> {
        let sandbox = played_sandbox();
        let snapshot = GameSnapshot::capture(&sandbox.game)?;

        let restored = PoolGame::restore(snapshot, sandbox.collaborators())?;
        assert_eq!(restored.players(), sandbox.game.players());
        assert_eq!(restored.total_game_principal(), 20);

        let carol = sandbox.fund_player("carol", 100);
        restored.join(&carol)?;
        assert_eq!(restored.total_game_principal(), 30);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_a_storage_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_snapshot(dir.path().join("absent.json")),
            Err(GhostPoolError::Storage(_))
        ));
    }
}
