//! Depth range ↔ soil layer identifier mapping.
//!
//! Soil grids are published as one coverage per fixed depth slice. Slice `i`
//! of `DEPTH_PARTITION` is served under three coverage identifiers: the
//! estimate (`3i+1`), the 95th percentile (`3i+2`) and the 5th percentile
//! (`3i+3`).

use crate::domain::model::{ConfidenceBand, DepthInterval, LayerIdentifier};
use crate::utils::error::{HarvestError, Result};

pub const DEPTH_PARTITION: [i32; 7] = [0, 5, 15, 30, 60, 100, 200];

pub const DEPTH_LABELS: [&str; 6] = ["0-5cm", "5-15cm", "15-30cm", "30-60cm", "60-100cm", "100-200cm"];

/// 深度區間及其三個 coverage 識別碼
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterval {
    pub index: usize,
    pub interval: DepthInterval,
    pub identifier: LayerIdentifier,
    pub identifier_ci_95pc: LayerIdentifier,
    pub identifier_ci_5pc: LayerIdentifier,
}

impl ResolvedInterval {
    fn at(index: usize) -> Self {
        let base = 3 * index;
        Self {
            index,
            interval: DepthInterval {
                lower_cm: DEPTH_PARTITION[index],
                upper_cm: DEPTH_PARTITION[index + 1],
            },
            identifier: LayerIdentifier::new((base + 1).to_string()),
            identifier_ci_95pc: LayerIdentifier::new((base + 2).to_string()),
            identifier_ci_5pc: LayerIdentifier::new((base + 3).to_string()),
        }
    }

    pub fn identifier_for(&self, band: ConfidenceBand) -> &LayerIdentifier {
        match band {
            ConfidenceBand::Estimate => &self.identifier,
            ConfidenceBand::Percentile5 => &self.identifier_ci_5pc,
            ConfidenceBand::Percentile95 => &self.identifier_ci_95pc,
        }
    }
}

/// Every fixed slice fully contained in `[depth_min, depth_max]` (inclusive).
///
/// An empty result means nothing to fetch; inverted or too-narrow ranges are
/// not errors.
pub fn resolve_depth_intervals(depth_min: i32, depth_max: i32) -> Vec<ResolvedInterval> {
    DEPTH_PARTITION
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| depth_min <= pair[0] && depth_max >= pair[1])
        .map(|(i, _)| ResolvedInterval::at(i))
        .collect()
}

/// 由深度標籤（如 "5-15cm"）計算最小與最大深度
pub fn depth_bounds_from_labels<S: AsRef<str>>(labels: &[S]) -> Result<(i32, i32)> {
    if labels.is_empty() {
        return Err(HarvestError::validation(
            "depth label list is empty; expected one or more of 0-5cm, 5-15cm, 15-30cm, 30-60cm, 60-100cm, 100-200cm",
        ));
    }

    if let Some(bad) = labels.iter().find(|l| !DEPTH_LABELS.contains(&l.as_ref())) {
        return Err(HarvestError::validation(format!(
            "depth label '{}' should be one of {:?}",
            bad.as_ref(),
            DEPTH_LABELS
        )));
    }

    let mut bounds: Option<(i32, i32)> = None;
    let mut matched = 0usize;
    for (i, option) in DEPTH_LABELS.iter().enumerate() {
        if labels.iter().any(|l| l.as_ref() == *option) {
            let lower = bounds.map_or(DEPTH_PARTITION[i], |(lo, _)| lo);
            bounds = Some((lower, DEPTH_PARTITION[i + 1]));
            matched += 1;
        }
    }

    if matched != labels.len() {
        let joined: Vec<&str> = labels.iter().map(AsRef::as_ref).collect();
        return Err(HarvestError::validation(format!(
            "depth labels {:?} contain duplicates ({} distinct of {})",
            joined,
            matched,
            labels.len()
        )));
    }

    bounds.ok_or_else(|| HarvestError::validation("no depth label matched"))
}
