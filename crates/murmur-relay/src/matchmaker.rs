//! Matchmaking registry: connected clients, the waiting queue, and the
//! current pairings.
//!
//! Matching prefers the waiting candidate with the largest interest
//! overlap; gender filters are a hard gate in both directions. The
//! matches map is symmetric — dissolving either side frees both.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use murmur_protocol::{Gender, GenderFilter};

/// Preference snapshot carried by a queued client.
#[derive(Debug, Clone)]
pub struct QueuedPrefs {
    pub interests: Vec<String>,
    pub gender_pref: GenderFilter,
    pub user_gender: Gender,
}

#[derive(Default)]
struct RegistryInner {
    /// Outbound frame sender for each connected client.
    clients: HashMap<String, mpsc::Sender<String>>,
    /// Clients waiting for a partner, with their preferences.
    waiting: HashMap<String, QueuedPrefs>,
    /// Symmetric map of current pairings.
    matches: HashMap<String, String>,
}

/// Thread-safe matchmaking state, shared by all connection tasks.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// Register a connected client. Returns the new online count.
    pub async fn join(&self, user_id: &str, tx: mpsc::Sender<String>) -> usize {
        let mut inner = self.inner.write().await;
        inner.clients.insert(user_id.to_string(), tx);
        inner.clients.len()
    }

    /// Remove a client from every structure. Returns the partner that
    /// should be told, if one existed, and the remaining online count.
    pub async fn leave(&self, user_id: &str) -> (Option<String>, usize) {
        let mut inner = self.inner.write().await;
        inner.clients.remove(user_id);
        inner.waiting.remove(user_id);
        let partner = inner.matches.remove(user_id);
        if let Some(ref partner_id) = partner {
            inner.matches.remove(partner_id);
        }
        (partner, inner.clients.len())
    }

    /// Find a partner for `user_id`, or enqueue it.
    ///
    /// The best candidate is the compatible waiting client with the
    /// most shared interests; with no overlap anywhere, the first
    /// compatible one wins.
    pub async fn find_match(&self, user_id: &str, prefs: QueuedPrefs) -> Option<String> {
        let mut inner = self.inner.write().await;
        // A repeated request replaces the old queue entry.
        inner.waiting.remove(user_id);

        let mut best: Option<(String, usize)> = None;
        for (candidate_id, candidate) in &inner.waiting {
            if candidate_id == user_id || inner.matches.contains_key(candidate_id) {
                continue;
            }
            // Both filters must pass for the pairing to exist at all.
            if !prefs.gender_pref.accepts(candidate.user_gender)
                || !candidate.gender_pref.accepts(prefs.user_gender)
            {
                continue;
            }
            let score = overlap(&prefs.interests, &candidate.interests);
            let better = match &best {
                Some((_, best_score)) => score > *best_score,
                None => true,
            };
            if better {
                best = Some((candidate_id.clone(), score));
            }
        }

        match best {
            Some((partner_id, score)) => {
                inner.waiting.remove(&partner_id);
                inner
                    .matches
                    .insert(user_id.to_string(), partner_id.clone());
                inner
                    .matches
                    .insert(partner_id.clone(), user_id.to_string());
                tracing::info!(user = %user_id, partner = %partner_id, score, "matched");
                Some(partner_id)
            }
            None => {
                inner.waiting.insert(user_id.to_string(), prefs);
                tracing::debug!(user = %user_id, queued = inner.waiting.len(), "queued");
                None
            }
        }
    }

    /// Dissolve `user_id`'s pairing. Returns the freed partner.
    pub async fn dissolve(&self, user_id: &str) -> Option<String> {
        let mut inner = self.inner.write().await;
        let partner = inner.matches.remove(user_id);
        if let Some(ref partner_id) = partner {
            inner.matches.remove(partner_id);
        }
        partner
    }

    /// Outbound sender of `user_id`'s current partner.
    pub async fn partner_of(&self, user_id: &str) -> Option<mpsc::Sender<String>> {
        let inner = self.inner.read().await;
        let partner_id = inner.matches.get(user_id)?;
        inner.clients.get(partner_id).cloned()
    }

    /// Outbound sender of a specific client.
    pub async fn client(&self, user_id: &str) -> Option<mpsc::Sender<String>> {
        self.inner.read().await.clients.get(user_id).cloned()
    }

    /// Every connected client's sender plus the online count, for the
    /// count broadcast.
    pub async fn clients_and_count(&self) -> (Vec<mpsc::Sender<String>>, usize) {
        let inner = self.inner.read().await;
        (inner.clients.values().cloned().collect(), inner.clients.len())
    }
}

fn overlap(a: &[String], b: &[String]) -> usize {
    a.iter().filter(|tag| b.contains(tag)).count()
}
