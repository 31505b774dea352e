// In-memory access token slot

use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct Slot {
    token: Option<String>,
    /// Bumped on every set or clear
    generation: u64,
}

/// Process-local holder for the current access token
/// Never persisted; cloning shares the same slot
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Slot>>,
}

impl TokenStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Slot {
                token: initial,
                generation: 0,
            })),
        }
    }

    /// Current token, if any
    pub fn get(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    /// Current token together with the number of changes made so far
    pub fn snapshot(&self) -> (Option<String>, u64) {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        (slot.token.clone(), slot.generation)
    }

    /// Replace the current token
    pub fn set(&self, token: impl Into<String>) {
        self.replace(Some(token.into()));
    }

    /// Wipe the current token
    pub fn clear(&self) {
        self.replace(None);
    }

    /// Store `token` only if nothing touched the slot since `generation`
    ///
    /// Returns the token held afterwards as `Err` when the slot had moved on.
    pub fn set_if_unchanged(
        &self,
        generation: u64,
        token: impl Into<String>,
    ) -> Result<(), Option<String>> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            return Err(slot.token.clone());
        }
        slot.token = Some(token.into());
        slot.generation += 1;
        Ok(())
    }

    /// Wipe the token only if nothing touched the slot since `generation`
    pub fn clear_if_unchanged(&self, generation: u64) -> Result<(), Option<String>> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            return Err(slot.token.clone());
        }
        slot.token = None;
        slot.generation += 1;
        Ok(())
    }

    fn replace(&self, token: Option<String>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.token = token;
        slot.generation += 1;
    }
}

/// Short prefix of a token that is safe to put in logs
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let store = TokenStore::default();
        assert_eq!(store.get(), None);

        store.set("token-1");
        assert_eq!(store.get().as_deref(), Some("token-1"));

        store.set("token-2".to_string());
        assert_eq!(store.get().as_deref(), Some("token-2"));

        store.clear();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_clones_share_slot() {
        let store = TokenStore::new(Some("initial".to_string()));
        let other = store.clone();

        other.set("rotated");
        assert_eq!(store.get().as_deref(), Some("rotated"));

        store.clear();
        assert_eq!(other.get(), None);
    }

    #[test]
    fn test_generation_tracks_every_change() {
        let store = TokenStore::new(Some("token-1".to_string()));
        assert_eq!(store.snapshot(), (Some("token-1".to_string()), 0));

        store.set("token-2");
        store.clear();
        assert_eq!(store.snapshot(), (None, 2));
    }

    #[test]
    fn test_set_if_unchanged() {
        let store = TokenStore::new(Some("token-1".to_string()));
        let (_, generation) = store.snapshot();

        assert_eq!(store.set_if_unchanged(generation, "token-2"), Ok(()));
        assert_eq!(store.get().as_deref(), Some("token-2"));

        // Stale generation leaves the slot alone
        assert_eq!(
            store.set_if_unchanged(generation, "token-3"),
            Err(Some("token-2".to_string()))
        );
        assert_eq!(store.get().as_deref(), Some("token-2"));
    }

    #[test]
    fn test_cleared_slot_is_not_revived_by_stale_write() {
        let store = TokenStore::new(Some("token-1".to_string()));
        let (_, generation) = store.snapshot();

        store.clear();
        assert_eq!(store.set_if_unchanged(generation, "token-2"), Err(None));
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_clear_if_unchanged() {
        let store = TokenStore::new(Some("token-1".to_string()));
        let (_, generation) = store.snapshot();

        store.set("fresh-login");
        assert_eq!(
            store.clear_if_unchanged(generation),
            Err(Some("fresh-login".to_string()))
        );
        assert_eq!(store.get().as_deref(), Some("fresh-login"));

        let (_, generation) = store.snapshot();
        assert_eq!(store.clear_if_unchanged(generation), Ok(()));
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_poisoned_slot_stays_usable() {
        let store = TokenStore::new(Some("token-1".to_string()));
        let writer = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = writer.slot.write().unwrap();
            panic!("writer crashed while holding the slot");
        })
        .join();

        assert!(store.slot.is_poisoned());
        assert_eq!(store.get().as_deref(), Some("token-1"));
        store.set("token-2");
        assert_eq!(store.get().as_deref(), Some("token-2"));
    }

    #[test]
    fn test_token_preview() {
        assert_eq!(token_preview("abcdefghijklmnop"), "abcdefgh...");
        assert_eq!(token_preview("abc"), "abc...");
        assert_eq!(token_preview(""), "...");
    }
}
