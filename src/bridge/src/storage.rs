//! RocksDB persistence for bridge state.

use crate::errors::BridgeError;
use crate::replay::{ExecutedSet, ReplayGuard};
use crate::state::{BridgeState, TokenState};
use ferry_core::{types::short_hex, TokenId};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

/// Key prefix for per-token state
const TOKEN_PREFIX: &[u8] = b"token::";
/// Key prefix for executed sets
const EXECUTED_PREFIX: &[u8] = b"executed::";

fn key(prefix: &[u8], token: &TokenId) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + token.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(token);
    key
}

/// Persistent store of committed bridge state.
pub struct StateStore {
    db: DB,
}

impl StateStore {
    /// Opens (or creates) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Opens an existing store without write access. Every `persist` fails.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let db = DB::open_for_read_only(&Options::default(), path, false)?;
        Ok(Self { db })
    }

    /// Writes the state and executed set of every token in `tokens` in one batch.
    pub fn persist<'a, I>(&self, tokens: I, state: &BridgeState, replay: &ReplayGuard) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = &'a TokenId>,
    {
        let mut batch = WriteBatch::default();
        let mut written = 0;

        for token in tokens {
            if let Some(token_state) = state.get(token) {
                batch.put(key(TOKEN_PREFIX, token), bincode::serialize(token_state)?);
                written += 1;
            }
            if let Some(set) = replay.set_of(token) {
                batch.put(key(EXECUTED_PREFIX, token), bincode::serialize(set)?);
            }
        }

        self.db.write(batch)?;
        debug!("Persisted state of {} tokens", written);
        Ok(())
    }

    /// Loads every persisted token.
    pub fn load(&self) -> Result<(BridgeState, ReplayGuard), BridgeError> {
        let mut state = BridgeState::new();
        let mut replay = ReplayGuard::new();

        for (token, token_state) in self.scan::<TokenState>(TOKEN_PREFIX)? {
            state.insert(token, token_state);
        }
        for (token, set) in self.scan::<ExecutedSet>(EXECUTED_PREFIX)? {
            replay.restore(token, set);
        }

        info!("Loaded {} tokens from storage", state.iter().count());
        Ok((state, replay))
    }

    fn scan<T: serde::de::DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<(TokenId, T)>, BridgeError> {
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }

            let token: TokenId = key[prefix.len()..].try_into().map_err(|_| {
                BridgeError::Storage(format!("malformed key {}", short_hex(&key)))
            })?;
            entries.push((token, bincode::deserialize(&value)?));
        }

        Ok(entries)
    }
}
