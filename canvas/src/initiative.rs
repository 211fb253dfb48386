//! Turn order state machine over a scene's `initiative_order`.
//!
//! Each entry is alive-waiting, alive-current, or killed. At most one entry
//! carries `is_current_turn`, and it is never a killed one. Every operation
//! here keeps that invariant; invalid requests (unknown id, empty list, no
//! living entries) are silent no-ops that return `false`.
//!
//! Turn movement only walks the living sub-sequence, in the list's existing
//! order. The list is initiative-sorted after `add_entry`, but a manual
//! `move_entry` may leave it unsorted until the next insertion.

#[cfg(test)]
#[path = "initiative_test.rs"]
mod initiative_test;

use crate::consts::REVIVE_HP;
use crate::doc::InitiativeEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Forward,
    Backward,
}

/// Indices of non-killed entries, in list order.
fn alive_indices(entries: &[InitiativeEntry]) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_killed)
        .map(|(i, _)| i)
        .collect()
}

/// Index (into `entries`) of the entry that would hold the turn after one step.
fn next_turn_index(entries: &[InitiativeEntry], step: Step) -> Option<usize> {
    let alive = alive_indices(entries);
    if alive.is_empty() {
        return None;
    }
    let len = alive.len();
    let current = alive.iter().position(|&i| entries[i].is_current_turn);
    let next = match (current, step) {
        (None, Step::Forward) => 0,
        (None, Step::Backward) => len - 1,
        (Some(pos), Step::Forward) => (pos + 1) % len,
        (Some(pos), Step::Backward) => (pos + len - 1) % len,
    };
    Some(alive[next])
}

/// Give the turn to exactly `index`; everyone else loses it.
fn set_current(entries: &mut [InitiativeEntry], index: usize) {
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.is_current_turn = i == index;
    }
}

fn step(entries: &mut [InitiativeEntry], direction: Step) -> bool {
    let Some(index) = next_turn_index(entries, direction) else {
        return false;
    };
    set_current(entries, index);
    true
}

/// Move the turn pointer to the next living entry, wrapping around.
/// With no current entry the first living entry gets the turn.
pub fn advance(entries: &mut [InitiativeEntry]) -> bool {
    step(entries, Step::Forward)
}

/// Move the turn pointer to the previous living entry, wrapping around.
/// With no current entry the last living entry gets the turn.
pub fn retreat(entries: &mut [InitiativeEntry]) -> bool {
    step(entries, Step::Backward)
}

/// Mark an entry killed, handing the turn on first if it held it.
///
/// The successor is computed while the target is still alive, so the target
/// can only be its own successor when it is the last one standing; in that
/// case nobody holds the turn afterwards. Killing a killed entry is a no-op.
pub fn kill(entries: &mut [InitiativeEntry], id: &str) -> bool {
    let Some(target) = entries.iter().position(|e| e.id == id && !e.is_killed) else {
        return false;
    };
    if entries[target].is_current_turn {
        if let Some(next) = next_turn_index(entries, Step::Forward) {
            set_current(entries, next);
        }
    }
    let entry = &mut entries[target];
    entry.is_killed = true;
    entry.is_current_turn = false;
    true
}

/// Bring a killed entry back with minimal hit points. Does not take the turn.
/// Living entries are left alone.
pub fn revive(entries: &mut [InitiativeEntry], id: &str) -> bool {
    let Some(entry) = entries.iter_mut().find(|e| e.id == id && e.is_killed) else {
        return false;
    };
    entry.is_killed = false;
    entry.hp = Some(REVIVE_HP);
    true
}

/// Apply damage (negative) or healing (positive).
///
/// The stored value is not floored, so overkill shows as negative HP. Any
/// result at or below zero on a living entry goes through [`kill`]. Healing a
/// killed entry leaves it killed; use [`revive`].
pub fn adjust_hp(entries: &mut [InitiativeEntry], id: &str, delta: i64) -> bool {
    let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
        return false;
    };
    let current = entry.hp.or(entry.initial_hp).unwrap_or(0);
    let hp = current.saturating_add(delta);
    entry.hp = Some(hp);
    if hp <= 0 && !entry.is_killed {
        kill(entries, id);
    }
    true
}

/// Overwrite an entry's HP, with the same elimination rule as [`adjust_hp`].
pub fn set_hp(entries: &mut [InitiativeEntry], id: &str, hp: i64) -> bool {
    let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
        return false;
    };
    entry.hp = Some(hp);
    if entry.initial_hp.is_none() {
        entry.initial_hp = Some(hp);
    }
    if hp <= 0 && !entry.is_killed {
        kill(entries, id);
    }
    true
}

/// Insert an entry and re-sort the whole list by descending initiative.
///
/// The sort is stable, so ties keep insertion order. An incoming entry never
/// brings its own turn flag along; the pointer only moves through
/// [`advance`]/[`retreat`]/[`kill`].
pub fn add_entry(entries: &mut Vec<InitiativeEntry>, mut entry: InitiativeEntry) {
    entry.is_current_turn = false;
    entries.push(entry);
    entries.sort_by(|a, b| b.initiative.cmp(&a.initiative));
}

/// Remove an entry outright. If it held the turn, the turn passes on first.
pub fn remove_entry(entries: &mut Vec<InitiativeEntry>, id: &str) -> bool {
    let Some(index) = entries.iter().position(|e| e.id == id) else {
        return false;
    };
    if entries[index].is_current_turn {
        let next = next_turn_index(entries, Step::Forward);
        if let Some(next) = next.filter(|&n| n != index) {
            set_current(entries, next);
        }
    }
    entries.remove(index);
    true
}

/// Drop every killed entry. The turn pointer is untouched, since a killed
/// entry never holds it.
pub fn clear_killed(entries: &mut Vec<InitiativeEntry>) -> usize {
    let before = entries.len();
    entries.retain(|e| !e.is_killed);
    before - entries.len()
}

/// Manual reorder: move the entry at `from` to position `to`, ignoring
/// initiative values.
pub fn move_entry(entries: &mut Vec<InitiativeEntry>, from: usize, to: usize) -> bool {
    if from >= entries.len() || to >= entries.len() {
        return false;
    }
    if from != to {
        let entry = entries.remove(from);
        entries.insert(to, entry);
    }
    true
}

/// The entry currently holding the turn, if any.
#[must_use]
pub fn current(entries: &[InitiativeEntry]) -> Option<&InitiativeEntry> {
    entries.iter().find(|e| e.is_current_turn && !e.is_killed)
}
