//! Connection strategies
//!
//! A strategy orders the configured endpoints for one open attempt;
//! the connection walks the returned list until one endpoint accepts.

use ldap_core::LdapUrl;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Orders candidate endpoints for an open or reconnect attempt
pub trait ConnectionStrategy: Send + Sync {
    fn order(&self, urls: &[LdapUrl]) -> Vec<LdapUrl>;
}

/// Default strategy: always start from the first configured endpoint,
/// falling through the list only on failure
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivePassive;

impl ConnectionStrategy for ActivePassive {
    fn order(&self, urls: &[LdapUrl]) -> Vec<LdapUrl> {
        urls.to_vec()
    }
}

/// Rotates the starting endpoint on every open attempt
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionStrategy for RoundRobin {
    fn order(&self, urls: &[LdapUrl]) -> Vec<LdapUrl> {
        if urls.is_empty() {
            return Vec::new();
        }
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % urls.len();
        let mut ordered = Vec::with_capacity(urls.len());
        ordered.extend_from_slice(&urls[start..]);
        ordered.extend_from_slice(&urls[..start]);
        ordered
    }
}

/// Shuffles the endpoints on every open attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct Random;

impl ConnectionStrategy for Random {
    fn order(&self, urls: &[LdapUrl]) -> Vec<LdapUrl> {
        let mut ordered = urls.to_vec();
        ordered.shuffle(&mut rand::thread_rng());
        ordered
    }
}
