//! Character and balance collaborators, with in-memory implementations.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid debit amount: {0}")]
    InvalidAmount(i64),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn lookup_character(&self, character_id: &str) -> StoreResult<Option<Character>>;
}

/// Coin balances. Balances never go negative.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get_balance(&self, user_id: &str) -> StoreResult<i64>;

    /// Removes up to `amount` coins and returns the new balance.
    async fn debit(&self, user_id: &str, amount: i64) -> StoreResult<i64>;
}

#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    balances: DashMap<String, i64>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, user_id: impl Into<String>, coins: i64) {
        self.balances.insert(user_id.into(), coins.max(0));
    }

    pub fn with_balance(self, user_id: impl Into<String>, coins: i64) -> Self {
        self.set_balance(user_id, coins);
        self
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn get_balance(&self, user_id: &str) -> StoreResult<i64> {
        Ok(self.balances.get(user_id).map(|b| *b).unwrap_or(0))
    }

    async fn debit(&self, user_id: &str, amount: i64) -> StoreResult<i64> {
        if amount < 0 {
            return Err(StoreError::InvalidAmount(amount));
        }
        let mut balance = self
            .balances
            .get_mut(user_id)
            .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))?;
        *balance = (*balance - amount).max(0);
        debug!(user_id, amount, balance = *balance, "Debited coins");
        Ok(*balance)
    }
}

#[derive(Debug, Default)]
pub struct StaticCharacterStore {
    characters: DashMap<String, Character>,
}

impl StaticCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, character: Character) {
        self.characters.insert(character.id.clone(), character);
    }

    pub fn with_character(self, character: Character) -> Self {
        self.insert(character);
        self
    }
}

#[async_trait]
impl CharacterStore for StaticCharacterStore {
    async fn lookup_character(&self, character_id: &str) -> StoreResult<Option<Character>> {
        Ok(self.characters.get(character_id).map(|c| c.clone()))
    }
}
