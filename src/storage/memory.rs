//! In-memory storage implementation
//!
//! Fast, non-persistent storage for development and testing.
//! Uses DashMap for concurrent access.
//!
//! **WARNING:** MemoryStorage is NOT recommended for production use:
//! - Data is lost on process restart
//! - Does not coordinate state across multiple process instances
//!
//! For production deployments, use SqliteStorage or PostgresStorage.

use super::*;
use dashmap::DashMap;
use parking_lot::Mutex;

type PairKey = (String, String);

/// In-memory storage implementation
#[derive(Clone)]
pub struct MemoryStorage {
    clients: Arc<DashMap<String, Client>>,
    /// code -> grant
    grants: Arc<DashMap<String, Grant>>,
    /// (client_id, user_id) -> token; the key enforces one token per pair
    tokens: Arc<DashMap<PairKey, Token>>,
    /// access_token -> pair, kept in step with `tokens` under `write_lock`
    by_access: Arc<DashMap<String, PairKey>>,
    /// Serializes multi-table writes (redeem, replace, cascades)
    write_lock: Arc<Mutex<()>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            grants: Arc::new(DashMap::new()),
            tokens: Arc::new(DashMap::new()),
            by_access: Arc::new(DashMap::new()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn pair_key(token: &Token) -> PairKey {
        (token.client_id.clone(), token.user_id.clone())
    }

    /// Insert `token` as the pair's only token. Caller holds `write_lock`.
    fn put_token(&self, token: &Token) {
        let key = Self::pair_key(token);
        if let Some(old) = self.tokens.insert(key.clone(), token.clone()) {
            self.by_access.remove(&old.access_token);
        }
        self.by_access.insert(token.access_token.clone(), key);
    }

    /// Remove every token matching `pred`. Caller holds `write_lock`.
    fn drop_tokens<F>(&self, pred: F) -> u64
    where
        F: Fn(&Token) -> bool,
    {
        let mut removed = 0u64;
        self.tokens.retain(|_, t| {
            if pred(t) {
                self.by_access.remove(&t.access_token);
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn find_token<F>(&self, pred: F) -> Option<Token>
    where
        F: Fn(&Token) -> bool,
    {
        self.tokens
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientStorage for MemoryStorage {
    async fn save_client(&self, client: &Client) -> Result<()> {
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        Ok(clients)
    }

    async fn list_clients_by_owner(&self, owner_user_id: &str) -> Result<Vec<Client>> {
        let mut clients = self.list_clients().await?;
        clients.retain(|c| c.owner_user_id == owner_user_id);
        Ok(clients)
    }

    async fn delete_client(&self, client_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.clients.remove(client_id).is_none() {
            return Err(crate::GrantryError::not_found("Client", client_id));
        }
        self.grants.retain(|_, g| g.client_id != client_id);
        self.drop_tokens(|t| t.client_id == client_id);
        Ok(())
    }
}

#[async_trait]
impl GrantStorage for MemoryStorage {
    async fn insert_grant(&self, grant: &Grant) -> Result<bool> {
        use dashmap::mapref::entry::Entry;

        match self.grants.entry(grant.code.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(grant.clone());
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    async fn get_grant(&self, client_id: &str, code: &str) -> Result<Option<Grant>> {
        Ok(self
            .grants
            .get(code)
            .filter(|g| g.client_id == client_id)
            .map(|g| g.clone()))
    }

    async fn redeem_grant(
        &self,
        client_id: &str,
        code: &str,
        now: DateTime<Utc>,
        token: &Token,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock();

        // remove_if holds the shard lock, so only one caller can observe Some
        let removed = self
            .grants
            .remove_if(code, |_, g| g.client_id == client_id && g.is_valid_at(now));
        if removed.is_none() {
            return Ok(false);
        }

        self.put_token(token);
        Ok(true)
    }
}

#[async_trait]
impl TokenStorage for MemoryStorage {
    async fn get_token_by_access(&self, access_token: &str) -> Result<Option<Token>> {
        let Some(key) = self.by_access.get(access_token).map(|k| k.clone()) else {
            return Ok(None);
        };
        Ok(self
            .tokens
            .get(&key)
            .filter(|t| t.access_token == access_token)
            .map(|t| t.clone()))
    }

    async fn get_token_by_refresh(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<Option<Token>> {
        Ok(self.find_token(|t| t.client_id == client_id && t.refresh_token == refresh_token))
    }

    async fn replace_token(&self, token: &Token) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.put_token(token);
        Ok(())
    }

    async fn renew_token(&self, refresh_token: &str, token: &Token) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let key = Self::pair_key(token);
        let current = self
            .tokens
            .get(&key)
            .is_some_and(|t| t.refresh_token == refresh_token);
        if !current {
            return Ok(false);
        }
        self.put_token(token);
        Ok(true)
    }

    async fn delete_token(&self, client_id: &str, refresh_token: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let Some(token) =
            self.find_token(|t| t.client_id == client_id && t.refresh_token == refresh_token)
        else {
            return Ok(false);
        };
        let removed = self
            .tokens
            .remove_if(&Self::pair_key(&token), |_, t| t.refresh_token == refresh_token);
        match removed {
            Some((_, t)) => {
                self.by_access.remove(&t.access_token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_client_user_tokens(&self, client_id: &str, user_id: &str) -> Result<u64> {
        let _guard = self.write_lock.lock();

        let key = (client_id.to_string(), user_id.to_string());
        match self.tokens.remove(&key) {
            Some((_, t)) => {
                self.by_access.remove(&t.access_token);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_tokens_by_user(&self, user_id: &str) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = self
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect();
        tokens.sort_by(|a, b| b.expires.cmp(&a.expires));
        Ok(tokens)
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<u64> {
        let _guard = self.write_lock.lock();

        let mut removed = 0u64;
        self.grants.retain(|_, g| {
            let keep = g.user_id != user_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed += self.drop_tokens(|t| t.user_id == user_id);
        Ok(removed)
    }

    async fn purge_expired(
        &self,
        grants_before: DateTime<Utc>,
        tokens_before: DateTime<Utc>,
    ) -> Result<PurgeStats> {
        let _guard = self.write_lock.lock();

        let mut stats = PurgeStats::default();
        self.grants.retain(|_, g| {
            let keep = g.expires >= grants_before;
            if !keep {
                stats.grants += 1;
            }
            keep
        });
        stats.tokens = self.drop_tokens(|t| t.expires < tokens_before);
        Ok(stats)
    }
}
