//! Journal statistics.
//!
//! # Invariants
//! - `top_tags` holds at most [`TOP_TAGS_LIMIT`] entries, ordered by count
//!   descending then tag ascending.
//! - `per_month` buckets use the UTC calendar month of `created_at`.

use crate::clock::month_key;
use crate::model::registro::Registro;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const TOP_TAGS_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Aggregate counters over all registros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    /// Number of distinct tags in use.
    pub total_tags: usize,
    pub with_photo: usize,
    pub top_tags: Vec<TagCount>,
    /// `YYYY-MM` → registros created that month.
    pub per_month: BTreeMap<String, usize>,
    /// Newest `created_at`, epoch milliseconds.
    pub last_created_at: Option<i64>,
}

/// Computes statistics over the given registros.
pub fn compute_statistics(registros: &[Registro]) -> Statistics {
    let mut tag_counts: HashMap<&str, usize> = HashMap::new();
    let mut distinct = BTreeSet::new();
    let mut per_month = BTreeMap::new();

    for registro in registros {
        for tag in &registro.tags {
            *tag_counts.entry(tag.as_str()).or_default() += 1;
            distinct.insert(tag.as_str());
        }
        *per_month.entry(month_key(registro.created_at)).or_default() += 1;
    }

    let mut top_tags: Vec<TagCount> = tag_counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    top_tags.truncate(TOP_TAGS_LIMIT);

    Statistics {
        total: registros.len(),
        total_tags: distinct.len(),
        with_photo: registros.iter().filter(|r| r.has_photo).count(),
        top_tags,
        per_month,
        last_created_at: registros.iter().map(|r| r.created_at).max(),
    }
}
