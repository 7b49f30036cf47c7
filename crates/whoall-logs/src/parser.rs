use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime};
use regex::{Captures, Regex};

use whoall_types::Sighting;

/// Default freshness window, in minutes, for both log lines and stored players
pub const FRESHNESS_WINDOW_MINUTES: i64 = 10;

/// Format of the date part inside the leading bracket, e.g. `Oct 10 12:43:55 2023`
const TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S %Y";

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun) (\w{3} \d{2} \d{2}:\d{2}:\d{2} \d{4})\]")
        .expect("timestamp pattern is valid")
});

// Zone is lazy and may be empty so that a bare trailing LFG is read as the flag,
// not as the zone name.
static WHO_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\[[^\]]+\]\s*",
        r"(?P<afk>AFK\s+)?",
        r"\[(?P<level>\d+|ANONYMOUS) (?P<class>[\w\s]+?)\]\s*",
        r"(?P<name>\w+)\s+",
        r"\((?P<race>[\w\s]+)\)\s*",
        r"(?:<(?P<guild>[^>]+)>)?\s*",
        r"ZONE:\s*(?P<zone>[\w\s]*?)\s*",
        r"(?P<lfg>\bLFG)?\s*$",
    ))
    .expect("who line pattern is valid")
});

/// Why a log line produced no sighting. None of these are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineRejection {
    /// No bracketed client timestamp; not a log entry
    NoTimestamp,
    /// Timestamp bracket present but not a valid date
    BadTimestamp,
    /// Older than the freshness window (historical replay)
    Stale,
    /// Further in the future than the freshness window (clock skew)
    Future,
    /// A log entry, but not a `/who` result line
    NoMatch,
}

impl LineRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTimestamp => "no_timestamp",
            Self::BadTimestamp => "bad_timestamp",
            Self::Stale => "stale",
            Self::Future => "future",
            Self::NoMatch => "no_match",
        }
    }
}

/// Parser turning `/who` result lines into sightings
#[derive(Clone, Debug)]
pub struct LogParser {
    window: Duration,
}

impl LogParser {
    /// Create a parser with the default ten minute window
    pub fn new() -> Self {
        Self::with_window(Duration::minutes(FRESHNESS_WINDOW_MINUTES))
    }

    /// Create a parser that accepts lines within `window` of the reference time
    pub fn with_window(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Parse a raw log line, discarding anything that is not a live `/who` line
    pub fn parse(&self, line: &str, now: NaiveDateTime) -> Option<Sighting> {
        self.classify(line, now).ok()
    }

    /// Parse a raw log line, reporting why it was skipped when it yields nothing
    pub fn classify(&self, line: &str, now: NaiveDateTime) -> Result<Sighting, LineRejection> {
        let observed_at = Self::extract_timestamp(line)?;

        let age = now - observed_at;
        if age > self.window {
            return Err(LineRejection::Stale);
        }
        if -age > self.window {
            return Err(LineRejection::Future);
        }

        let caps = WHO_LINE_RE.captures(line).ok_or(LineRejection::NoMatch)?;
        Self::sighting_from_captures(&caps, observed_at)
    }

    /// Extract the client timestamp from the line's leading bracket
    fn extract_timestamp(line: &str) -> Result<NaiveDateTime, LineRejection> {
        let caps = TIMESTAMP_RE
            .captures(line)
            .ok_or(LineRejection::NoTimestamp)?;

        NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT)
            .map_err(|_| LineRejection::BadTimestamp)
    }

    fn sighting_from_captures(
        caps: &Captures<'_>,
        observed_at: NaiveDateTime,
    ) -> Result<Sighting, LineRejection> {
        let text = |group: &str| {
            caps.name(group)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default()
        };

        // A level too large for u32 is malformed, not anonymous
        let level = match caps.name("level").map(|m| m.as_str()) {
            Some("ANONYMOUS") | None => None,
            Some(digits) => Some(digits.parse::<u32>().map_err(|_| LineRejection::NoMatch)?),
        };

        Ok(Sighting {
            level,
            class_name: text("class"),
            name: text("name"),
            race: text("race"),
            guild: text("guild"),
            zone: text("zone"),
            lfg: caps.name("lfg").is_some(),
            afk: caps.name("afk").is_some(),
            observed_at,
        })
    }
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}
