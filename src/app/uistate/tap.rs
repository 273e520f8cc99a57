use tracing::debug;

use super::geometry::{find_clear_point, intersects, parse_bounds_csv};
use super::models::{Bounds, IndexedElement};
use crate::app::error::TapError;

/// Picks a screen point that lands on `target_index` rather than on anything drawn above it.
///
/// Elements with a higher index are drawn later and count as blockers when they overlap
/// the target. Blockers whose own bounds cannot be read are ignored; the target's bounds
/// must parse.
pub fn resolve_tap_point(
    elements: &[IndexedElement],
    target_index: usize,
) -> Result<(i32, i32), TapError> {
    let target = elements
        .iter()
        .find(|element| element.index == target_index)
        .ok_or_else(|| TapError::ElementNotFound {
            index: target_index,
            available: available_indices(elements),
        })?;

    let target_bounds = element_bounds(target).ok_or_else(|| TapError::MissingBounds {
        index: target_index,
        bounds: target.bounds.clone().filter(|raw| !raw.trim().is_empty()),
    })?;

    let blockers: Vec<Bounds> = elements
        .iter()
        .filter(|element| element.index > target_index)
        .filter_map(element_bounds)
        .filter(|bounds| intersects(&target_bounds, bounds))
        .collect();
    debug!(
        index = target_index,
        blockers = blockers.len(),
        "resolving tap point"
    );

    find_clear_point(&target_bounds, &blockers)
        .ok_or(TapError::TargetObscured { index: target_index })
}

fn element_bounds(element: &IndexedElement) -> Option<Bounds> {
    element.bounds.as_deref().and_then(parse_bounds_csv)
}

fn available_indices(elements: &[IndexedElement]) -> Vec<usize> {
    let mut indices: Vec<usize> = elements.iter().map(|element| element.index).collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}
