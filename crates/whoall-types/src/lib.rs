//! Shared types for whoall
//!
//! This crate contains the player data model used by the log ingestion crate
//! and the binary.

use chrono::NaiveDateTime;
use serde::Serialize;

// ============================================================================
// Log Types
// ============================================================================

/// A single player observation extracted from one `/who` log line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sighting {
    /// Player level (`None` for anonymous players)
    pub level: Option<u32>,

    /// Class name as printed by the client, e.g. "Shadow Knight"
    pub class_name: String,

    /// Player name, the identity key
    pub name: String,

    pub race: String,

    /// Guild name, empty when the player is unguilded
    pub guild: String,

    /// Zone short name, empty when the client printed none
    pub zone: String,

    /// Looking-for-group flag
    pub lfg: bool,

    /// Away flag (informational only, never stored)
    pub afk: bool,

    /// Timestamp printed on the log line
    pub observed_at: NaiveDateTime,
}

impl Sighting {
    /// Create a sighting with the identity fields set and everything else empty
    pub fn new(name: impl Into<String>, observed_at: NaiveDateTime) -> Self {
        Self {
            level: None,
            class_name: String::new(),
            name: name.into(),
            race: String::new(),
            guild: String::new(),
            zone: String::new(),
            lfg: false,
            afk: false,
            observed_at,
        }
    }

    /// Whether the player hid their level and class
    pub fn is_anonymous(&self) -> bool {
        self.level.is_none()
    }
}

// ============================================================================
// Store Types
// ============================================================================

/// One row handed to the view: `(level, class, name, race, guild, zone, lfg)`
pub type PlayerRow = (Option<u32>, String, String, String, String, String, bool);

/// A known player, as held by the player store
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerRecord {
    /// Sequential ID assigned on first insert
    pub id: u64,

    pub level: Option<u32>,

    #[serde(rename = "class")]
    pub class_name: String,

    pub name: String,

    pub race: String,

    pub guild: String,

    pub zone: String,

    pub lfg: bool,

    /// Wall-clock time of the last upsert
    #[serde(serialize_with = "serialize_naive")]
    pub last_updated: NaiveDateTime,
}

impl PlayerRecord {
    /// Build a fresh record from a sighting
    pub fn from_sighting(id: u64, sighting: &Sighting, now: NaiveDateTime) -> Self {
        Self {
            id,
            level: sighting.level,
            class_name: sighting.class_name.clone(),
            name: sighting.name.clone(),
            race: sighting.race.clone(),
            guild: sighting.guild.clone(),
            zone: sighting.zone.clone(),
            lfg: sighting.lfg,
            last_updated: now,
        }
    }

    /// Overwrite the mutable fields from a newer sighting.
    ///
    /// `last_updated` never moves backwards.
    pub fn apply(&mut self, sighting: &Sighting, now: NaiveDateTime) {
        self.level = sighting.level;
        self.class_name.clone_from(&sighting.class_name);
        self.race.clone_from(&sighting.race);
        self.guild.clone_from(&sighting.guild);
        self.zone.clone_from(&sighting.zone);
        self.lfg = sighting.lfg;
        self.last_updated = self.last_updated.max(now);
    }

    /// Whether the record was touched at or after `cutoff`
    pub fn is_fresh(&self, cutoff: NaiveDateTime) -> bool {
        self.last_updated >= cutoff
    }

    /// Project into the tuple shape consumed by the view
    pub fn to_row(&self) -> PlayerRow {
        (
            self.level,
            self.class_name.clone(),
            self.name.clone(),
            self.race.clone(),
            self.guild.clone(),
            self.zone.clone(),
            self.lfg,
        )
    }

    /// Level column text, "ANONYMOUS" when hidden
    pub fn level_label(&self) -> String {
        match self.level {
            Some(level) => level.to_string(),
            None => "ANONYMOUS".to_string(),
        }
    }
}

/// Full-table export: `{ "last_updated": <unix seconds>, "data": [...] }`
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    /// Unix time the snapshot was taken, in fractional seconds
    pub last_updated: f64,

    pub data: Vec<PlayerRecord>,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_naive<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&value.format("%Y-%m-%d %H:%M:%S%.6f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn devana() -> Sighting {
        Sighting {
            level: Some(11),
            class_name: "Magician".to_string(),
            race: "High Elf".to_string(),
            zone: "gfaydark".to_string(),
            lfg: true,
            ..Sighting::new("Devana", at(12, 43, 55))
        }
    }

    #[test]
    fn test_apply_never_rewinds_last_updated() {
        let mut record = PlayerRecord::from_sighting(0, &devana(), at(12, 50, 0));
        record.apply(&devana(), at(12, 45, 0));
        assert_eq!(record.last_updated, at(12, 50, 0));

        record.apply(&devana(), at(12, 55, 0));
        assert_eq!(record.last_updated, at(12, 55, 0));
    }

    #[test]
    fn test_is_fresh_at_cutoff() {
        let record = PlayerRecord::from_sighting(0, &devana(), at(12, 50, 0));
        assert!(record.is_fresh(at(12, 50, 0)));
        assert!(!record.is_fresh(at(12, 50, 0) + Duration::seconds(1)));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let record = PlayerRecord::from_sighting(3, &devana(), at(12, 50, 0));
        let snapshot = Snapshot {
            last_updated: 1_696_942_200.5,
            data: vec![record],
        };

        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(value["last_updated"], 1_696_942_200.5);
        assert_eq!(value["data"][0]["id"], 3);
        assert_eq!(value["data"][0]["class"], "Magician");
        assert_eq!(value["data"][0]["level"], 11);
        assert_eq!(value["data"][0]["lfg"], true);
        assert_eq!(value["data"][0]["last_updated"], "2023-10-10 12:50:00.000000");
    }

    #[test]
    fn test_anonymous_row() {
        let mut sighting = devana();
        sighting.level = None;
        assert!(sighting.is_anonymous());

        let record = PlayerRecord::from_sighting(0, &sighting, at(12, 50, 0));
        assert_eq!(record.level_label(), "ANONYMOUS");
        assert_eq!(record.to_row().0, None);
        assert_eq!(record.to_row().2, "Devana");
    }
}
