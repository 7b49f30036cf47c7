//! Plain-text result table and JSON snapshot export

use std::fmt::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use whoall_logs::{PlayerRow, PlayerStore};

const HEADERS: [&str; 7] = ["Level", "Class", "Name", "Race", "Guild", "Zone", "LFG"];

/// Render query rows as an aligned text table followed by the row count
pub fn render_rows(rows: &[PlayerRow]) -> String {
    let cells: Vec<[String; 7]> = rows
        .iter()
        .map(|(level, class, name, race, guild, zone, lfg)| {
            [
                level.map(|l| l.to_string()).unwrap_or_else(|| "ANON".to_string()),
                class.clone(),
                name.clone(),
                race.clone(),
                guild.clone(),
                zone.clone(),
                if *lfg { "LFG" } else { "" }.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    let _ = writeln!(out, "Number of rows: {}", rows.len());
    out
}

fn push_line(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

/// Write the whole store as a JSON snapshot to `path`
pub fn write_export(store: &PlayerStore, path: &Path) -> Result<usize> {
    let taken_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let snapshot = store.snapshot(taken_at);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = snapshot.to_json_pretty()?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write export {}", path.display()))?;

    Ok(snapshot.data.len())
}
