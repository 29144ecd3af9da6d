//! Line activity classification
//!
//! Pure functions over one radar snapshot. Everything that filters or ranks
//! lines goes through [`in_scope_line`] so the scope rule exists exactly once.

use std::collections::HashMap;

use crate::providers::radar::{LineMode, Movement};

/// The line name of a movement, if the movement is in scope.
///
/// In scope means bus lines and U-Bahn trains (name starting with "U").
/// S-Bahn trains are excluded because the radar feed does not report them
/// reliably.
pub fn in_scope_line(movement: &Movement) -> Option<&str> {
    let line = movement.line.as_ref()?;
    let name = line.name.as_deref()?;
    match line.mode? {
        LineMode::Bus => Some(name),
        LineMode::Train if name.starts_with('U') => Some(name),
        _ => None,
    }
}

/// Number of in-scope vehicles per line in one snapshot
pub fn line_counts(movements: &[Movement]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for movement in movements {
        if let Some(name) = in_scope_line(movement) {
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// The line with the most in-scope vehicles; ties go to the line encountered
/// first in the snapshot.
pub fn most_active(movements: &[Movement]) -> Option<String> {
    top_n(movements, 1).into_iter().next().map(|(line, _)| line)
}

/// The `n` most active lines, descending by vehicle count; ties go to the
/// line encountered first in the snapshot.
pub fn top_n(movements: &[Movement], n: usize) -> Vec<(String, usize)> {
    let counts = line_counts(movements);

    let mut seen: Vec<&str> = Vec::new();
    for movement in movements {
        if let Some(name) = in_scope_line(movement) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = seen
        .into_iter()
        .map(|name| (name.to_string(), counts[name]))
        .collect();
    // Stable sort keeps first-encountered order within equal counts
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}
