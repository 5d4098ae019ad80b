//! Pure aggregate computations.
//!
//! Every aggregate here is a plain function over already-loaded rows, so the
//! same code path serves the live store and a decoded CSV snapshot; only the
//! row provider differs. Results that enumerate names keep first-seen order,
//! which is deterministic for a given row order.

use std::collections::{HashMap, HashSet};

use chrono::Datelike;

use crate::codec::Dataset;
use crate::error::{FerryError, Result};
use crate::store::EntityRow;

/// Distinct names of entities created in the same calendar month (any year)
/// as the most recently created entity.
///
/// Fails with `EmptyDataset` when there are no entities, since the latest
/// month is undefined.
pub fn latest_cohort_names(entities: &[EntityRow]) -> Result<Vec<String>> {
    let latest = entities
        .iter()
        .map(|e| e.created_at)
        .max()
        .ok_or(FerryError::EmptyDataset)?;
    let month = latest.month();

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for entity in entities {
        if entity.created_at.month() == month && seen.insert(entity.name.clone()) {
            names.push(entity.name.clone());
        }
    }
    Ok(names)
}

/// Names that occur more than once, in first-seen order.
pub fn duplicate_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    for name in names {
        let name = name.as_ref();
        let count = counts.entry(name.to_string()).or_insert(0);
        if *count == 0 {
            order.push(name.to_string());
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter(|name| counts[name] > 1)
        .collect()
}

/// Inner-join cardinality: entities whose secondary reference matches an
/// existing secondary key.
pub fn count_matched_entities(entities: &[EntityRow], secondary_keys: &[i64]) -> usize {
    let keys: HashSet<i64> = secondary_keys.iter().copied().collect();
    entities
        .iter()
        .filter(|e| e.secondary_id.is_some_and(|id| keys.contains(&id)))
        .count()
}

/// Secondary keys no entity references.
pub fn count_unreferenced_secondaries(entities: &[EntityRow], secondary_keys: &[i64]) -> usize {
    let referenced: HashSet<i64> = entities.iter().filter_map(|e| e.secondary_id).collect();
    secondary_keys
        .iter()
        .filter(|key| !referenced.contains(key))
        .count()
}

/// Duplicate names in a decoded dataset, located via the named column.
///
/// Fails with `MissingColumn` when the header does not carry that column.
pub fn csv_name_duplicates(dataset: &Dataset, name_column: &str) -> Result<Vec<String>> {
    let idx = dataset
        .column_index(name_column)
        .ok_or_else(|| FerryError::MissingColumn(name_column.to_string()))?;

    Ok(duplicate_names(
        dataset
            .rows
            .iter()
            .map(|row| row[idx].as_deref().unwrap_or("")),
    ))
}
