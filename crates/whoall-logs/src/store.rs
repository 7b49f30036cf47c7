use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, NaiveDateTime};
use parking_lot::RwLock;

use whoall_types::{PlayerRecord, PlayerRow, Sighting, Snapshot};

use crate::filter::PlayerFilter;
use crate::parser::FRESHNESS_WINDOW_MINUTES;

/// Result of an upsert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Thread-safe table of known players, keyed by name.
///
/// Clones share the same table. Every upsert and every query holds the lock
/// for its whole duration, so readers never see a half-applied sighting.
#[derive(Clone)]
pub struct PlayerStore {
    /// Internal storage
    players: Arc<RwLock<HashMap<String, PlayerRecord>>>,

    /// Records older than this are hidden from queries
    window: Duration,

    /// Next record ID
    next_id: Arc<AtomicU64>,
}

impl PlayerStore {
    /// Create an empty store with the default ten minute freshness window
    pub fn new() -> Self {
        Self::with_window(Duration::minutes(FRESHNESS_WINDOW_MINUTES))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            players: Arc::new(RwLock::new(HashMap::new())),
            window,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Create or update the record for the sighted player
    pub fn upsert(&self, sighting: &Sighting, now: NaiveDateTime) -> UpsertOutcome {
        let mut players = self.players.write();

        if let Some(record) = players.get_mut(&sighting.name) {
            record.apply(sighting, now);
            return UpsertOutcome::Updated;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        players.insert(
            sighting.name.clone(),
            PlayerRecord::from_sighting(id, sighting, now),
        );
        UpsertOutcome::Inserted
    }

    /// Fresh records matching `filter`, highest level first.
    ///
    /// Anonymous players sort after everyone with a level; equal levels are
    /// ordered by name.
    pub fn query(&self, filter: &PlayerFilter, now: NaiveDateTime) -> Vec<PlayerRecord> {
        let cutoff = self.cutoff(now);

        let mut matches: Vec<PlayerRecord> = self
            .players
            .read()
            .values()
            .filter(|record| record.is_fresh(cutoff) && filter.matches(record))
            .cloned()
            .collect();

        matches.sort_by(compare_for_display);
        matches
    }

    /// Same as [`query`](Self::query), projected to view rows
    pub fn query_rows(&self, filter: &PlayerFilter, now: NaiveDateTime) -> Vec<PlayerRow> {
        self.query(filter, now)
            .iter()
            .map(PlayerRecord::to_row)
            .collect()
    }

    /// Look up a single player regardless of freshness
    pub fn get(&self, name: &str) -> Option<PlayerRecord> {
        self.players.read().get(name).cloned()
    }

    /// Consistent copy of the whole table, fresh or not, ordered by ID
    pub fn snapshot(&self, taken_at_unix: f64) -> Snapshot {
        let mut data: Vec<PlayerRecord> = self.players.read().values().cloned().collect();
        data.sort_by_key(|record| record.id);

        Snapshot {
            last_updated: taken_at_unix,
            data,
        }
    }

    /// Number of fresh records
    pub fn fresh_count(&self, now: NaiveDateTime) -> usize {
        let cutoff = self.cutoff(now);
        self.players
            .read()
            .values()
            .filter(|record| record.is_fresh(cutoff))
            .count()
    }

    /// Oldest `last_updated` still considered fresh at `now`
    fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.window).unwrap_or(NaiveDateTime::MIN)
    }

    /// Total record count, including stale ones
    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }
}

impl Default for PlayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerStore")
            .field("players", &self.len())
            .field("window", &self.window)
            .finish()
    }
}

fn compare_for_display(a: &PlayerRecord, b: &PlayerRecord) -> CmpOrdering {
    // Option orders None first, so reversing puts anonymous last
    Reverse(a.level)
        .cmp(&Reverse(b.level))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sighting(name: &str, level: Option<u32>) -> Sighting {
        Sighting {
            level,
            class_name: "Magician".to_string(),
            race: "High Elf".to_string(),
            zone: "gfaydark".to_string(),
            ..Sighting::new(name, at(12, 0, 0))
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = PlayerStore::new();
        let devana = sighting("Devana", Some(11));

        assert_eq!(store.upsert(&devana, at(12, 0, 0)), UpsertOutcome::Inserted);
        let first = store.get("Devana").unwrap();

        assert_eq!(store.upsert(&devana, at(12, 1, 0)), UpsertOutcome::Updated);
        let second = store.get("Devana").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(second.last_updated, at(12, 1, 0));
        assert_eq!(
            PlayerRecord {
                last_updated: first.last_updated,
                ..second
            },
            first
        );
    }

    #[test]
    fn test_upsert_updates_fields_in_place() {
        let store = PlayerStore::new();
        store.upsert(&sighting("Devana", Some(11)), at(12, 0, 0));

        let mut levelled = sighting("Devana", Some(12));
        levelled.zone = "crushbone".to_string();
        levelled.lfg = true;
        store.upsert(&levelled, at(12, 5, 0));

        let record = store.get("Devana").unwrap();
        assert_eq!(record.id, 0);
        assert_eq!(record.level, Some(12));
        assert_eq!(record.zone, "crushbone");
        assert!(record.lfg);
    }

    #[test]
    fn test_freshness_window() {
        let store = PlayerStore::new();
        let now = at(12, 30, 0);
        store.upsert(&sighting("Old", Some(20)), now - Duration::minutes(11));
        store.upsert(&sighting("Recent", Some(20)), now - Duration::minutes(9));

        let names: Vec<String> = store
            .query(&PlayerFilter::new(), now)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Recent".to_string()]);
        assert_eq!(store.fresh_count(now), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_huge_window_keeps_everything() {
        let store = PlayerStore::with_window(Duration::weeks(52 * 1_000_000));
        let now = at(12, 0, 0);
        store.upsert(&sighting("Devana", Some(11)), NaiveDateTime::MIN);

        assert_eq!(store.query(&PlayerFilter::new(), now).len(), 1);
        assert_eq!(store.fresh_count(now), 1);
    }

    #[test]
    fn test_level_range_query() {
        let store = PlayerStore::new();
        let now = at(12, 0, 0);
        store.upsert(&sighting("Demiaan", Some(22)), now);
        store.upsert(&sighting("Devana", Some(11)), now);

        let rows = store.query_rows(&PlayerFilter::new().with_level_range(10, 20), now);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, Some(11));
        assert_eq!(rows[0].2, "Devana");
    }

    #[test]
    fn test_order_level_desc_then_name() {
        let store = PlayerStore::new();
        let now = at(12, 0, 0);
        store.upsert(&sighting("Zed", Some(11)), now);
        store.upsert(&sighting("Hidden", None), now);
        store.upsert(&sighting("Abe", Some(11)), now);
        store.upsert(&sighting("Demiaan", Some(22)), now);

        let names: Vec<String> = store
            .query(&PlayerFilter::new(), now)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Demiaan", "Abe", "Zed", "Hidden"]);
    }

    #[test]
    fn test_snapshot_includes_stale_records() {
        let store = PlayerStore::new();
        store.upsert(&sighting("First", Some(1)), at(10, 0, 0));
        store.upsert(&sighting("Second", Some(2)), at(12, 0, 0));

        let snapshot = store.snapshot(1_696_939_200.0);
        assert_eq!(snapshot.last_updated, 1_696_939_200.0);
        let names: Vec<&str> = snapshot.data.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn test_concurrent_readers_see_whole_records() {
        let store = PlayerStore::new();
        let now = at(12, 0, 0);

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for level in 1..=200 {
                    let mut s = sighting("Devana", Some(level));
                    s.zone = format!("zone{level}");
                    store.upsert(&s, now);
                }
            })
        };

        for _ in 0..200 {
            for record in store.query(&PlayerFilter::new(), now) {
                let level = record.level.unwrap();
                assert_eq!(record.zone, format!("zone{level}"));
            }
        }

        writer.join().unwrap();
        assert_eq!(store.get("Devana").unwrap().level, Some(200));
    }
}
