//! The single `Core` value threaded through every request handler via
//! Axum's `State` extractor, per the Design Note preferring an explicit
//! composed value over true process globals.

use std::collections::HashMap;
use std::sync::Mutex;

use diesel::r2d2;
use diesel::r2d2::ConnectionManager;
use diesel::PgConnection;
use lightning_client::PhoenixClient;
use time::Date;

use crate::price_cache::BtcPriceCache;
use crate::settings::Settings;
use crate::used_hash::UsedHashSet;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Per-endpoint daily call counters, reset at UTC midnight on any access.
#[derive(Default)]
pub struct DailyCounters {
    day: Option<Date>,
    counts: HashMap<String, u64>,
}

impl DailyCounters {
    /// Increments the counter for `key` and returns the count *before* this
    /// call, rolling the whole map over if UTC midnight has passed.
    pub fn increment(&mut self, key: &str) -> u64 {
        let today = time::OffsetDateTime::now_utc().date();
        if self.day != Some(today) {
            self.day = Some(today);
            self.counts.clear();
        }
        let entry = self.counts.entry(key.to_string()).or_insert(0);
        let previous = *entry;
        *entry += 1;
        previous
    }
}

#[derive(Clone)]
pub struct Core {
    pub pool: DbPool,
    pub phoenix: PhoenixClient,
    pub used_hashes: std::sync::Arc<UsedHashSet>,
    pub price_cache: std::sync::Arc<BtcPriceCache>,
    pub settings: std::sync::Arc<Settings>,
    pub root_key: std::sync::Arc<[u8; 32]>,
    pub daily_counters: std::sync::Arc<Mutex<DailyCounters>>,
}
