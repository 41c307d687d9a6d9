//! Deterministic ordering helpers.
//!
//! Bundles are evaluated on a worker pool, so completion order is
//! arbitrary. Everything that reaches a report or the sweep state is put
//! back into bundle id order here, making output independent of scheduling.

use crate::report::model::BundleReport;

/// Sort items by a string id. Stable, so equal ids keep their input order.
pub fn sort_by_id<T>(items: &mut [T], id: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| id(a).cmp(id(b)));
}

/// Sort bundle reports by bundle id.
///
/// This ordering is part of the report schema contract.
pub fn sort_bundle_reports(bundles: &mut [BundleReport]) {
    sort_by_id(bundles, |b| b.bundle.as_str());
}
