use whoall_types::PlayerRecord;

/// Query filter for the player store.
///
/// Every criterion is optional; an empty filter matches every record. Blank
/// strings are treated as "no filter".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerFilter {
    /// Inclusive level range, applied only when both bounds are set
    level_start: Option<u32>,
    level_end: Option<u32>,

    /// Exact class name
    class_name: Option<String>,

    /// Name substring (ASCII case-insensitive)
    name: Option<String>,

    /// Exact race
    race: Option<String>,

    /// Zone substring (ASCII case-insensitive)
    zone: Option<String>,

    /// Guild substring (ASCII case-insensitive)
    guild: Option<String>,

    /// Keep only players flagged looking-for-group
    lfg_only: bool,
}

impl PlayerFilter {
    /// Create a filter that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level_start(mut self, level: Option<u32>) -> Self {
        self.level_start = level;
        self
    }

    pub fn with_level_end(mut self, level: Option<u32>) -> Self {
        self.level_end = level;
        self
    }

    /// Set both level bounds
    pub fn with_level_range(self, start: u32, end: u32) -> Self {
        self.with_level_start(Some(start)).with_level_end(Some(end))
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = non_blank(class_name);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = non_blank(name).map(|s| s.to_ascii_lowercase());
        self
    }

    pub fn with_race(mut self, race: &str) -> Self {
        self.race = non_blank(race);
        self
    }

    pub fn with_zone(mut self, zone: &str) -> Self {
        self.zone = non_blank(zone).map(|s| s.to_ascii_lowercase());
        self
    }

    pub fn with_guild(mut self, guild: &str) -> Self {
        self.guild = non_blank(guild).map(|s| s.to_ascii_lowercase());
        self
    }

    pub fn lfg_only(mut self, lfg_only: bool) -> Self {
        self.lfg_only = lfg_only;
        self
    }

    /// Check if a record matches this filter (freshness is checked by the store)
    pub fn matches(&self, record: &PlayerRecord) -> bool {
        if let (Some(start), Some(end)) = (self.level_start, self.level_end) {
            match record.level {
                Some(level) if (start..=end).contains(&level) => {}
                _ => return false,
            }
        }

        if let Some(class_name) = &self.class_name {
            if &record.class_name != class_name {
                return false;
            }
        }

        if let Some(race) = &self.race {
            if &record.race != race {
                return false;
            }
        }

        if !contains_ignore_ascii_case(&record.name, self.name.as_deref())
            || !contains_ignore_ascii_case(&record.zone, self.zone.as_deref())
            || !contains_ignore_ascii_case(&record.guild, self.guild.as_deref())
        {
            return false;
        }

        !self.lfg_only || record.lfg
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `needle` must already be lowercase
fn contains_ignore_ascii_case(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(needle) => haystack.to_ascii_lowercase().contains(needle),
        None => true,
    }
}
