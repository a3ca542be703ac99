//! Matching awarded-mark rows to rubric items.
//!
//! Rows carrying an item identifier match that item only. Rows without one
//! come from legacy data and match the first unclaimed item whose stage-1
//! description equals theirs. Anything left over is reported, never matched
//! by position.

use uuid::Uuid;

use crate::model::{AwardedMark, Rubric};

/// An awarded row that matched no rubric item.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedRow {
    /// Position of the row in the awarded sequence.
    pub row_index: usize,
    pub item_id: Option<Uuid>,
    pub description: String,
}

/// Awarded rows aligned to rubric positions.
#[derive(Debug, Clone)]
pub struct Correlation<'a> {
    /// One slot per rubric item, in rubric order.
    pub slots: Vec<Option<&'a AwardedMark>>,
    pub unmatched: Vec<UnmatchedRow>,
    /// How many slots were filled by description text rather than identifier.
    pub legacy_matches: usize,
}

pub fn correlate<'a>(rubric: &Rubric, marks: &'a [AwardedMark]) -> Correlation<'a> {
    let mut slots: Vec<Option<&'a AwardedMark>> = vec![None; rubric.items.len()];
    let mut unmatched = Vec::new();
    let mut legacy_matches = 0;

    let unmatched_row = |row_index: usize, mark: &AwardedMark| UnmatchedRow {
        row_index,
        item_id: mark.item_id,
        description: mark.description.clone(),
    };

    // Identifier matches claim their slots before any text matching happens.
    for (row_index, mark) in marks.iter().enumerate() {
        let Some(item_id) = mark.item_id else {
            continue;
        };
        match rubric.items.iter().position(|item| item.id == Some(item_id)) {
            Some(pos) if slots[pos].is_none() => slots[pos] = Some(mark),
            _ => unmatched.push(unmatched_row(row_index, mark)),
        }
    }

    for (row_index, mark) in marks.iter().enumerate() {
        if mark.item_id.is_some() {
            continue;
        }
        let wanted = mark.description.trim();
        let found = rubric
            .items
            .iter()
            .enumerate()
            .position(|(pos, item)| slots[pos].is_none() && item.description().trim() == wanted);
        match found {
            Some(pos) => {
                slots[pos] = Some(mark);
                legacy_matches += 1;
            }
            None => unmatched.push(unmatched_row(row_index, mark)),
        }
    }

    unmatched.sort_by_key(|row| row.row_index);

    Correlation {
        slots,
        unmatched,
        legacy_matches,
    }
}
