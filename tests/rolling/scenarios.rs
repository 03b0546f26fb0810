//! BDD scenarios for rolling updates.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RollingContext, rolling_context};

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "Replace five servers in windows of two"
)]
fn scenario_replace_in_windows(rolling_context: RollingContext) {
    let _ = rolling_context;
}

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "A failed snapshot leaves the server in place"
)]
fn scenario_failed_snapshot(rolling_context: RollingContext) {
    let _ = rolling_context;
}

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "Nothing matches the prefix"
)]
fn scenario_no_match(rolling_context: RollingContext) {
    let _ = rolling_context;
}

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "Replacements keep their flavor and networks"
)]
fn scenario_replacement_attributes(rolling_context: RollingContext) {
    let _ = rolling_context;
}

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "A delete that never finishes stops after the snapshot"
)]
fn scenario_stalled_delete(rolling_context: RollingContext) {
    let _ = rolling_context;
}

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "A failed launch after deletion stops at old_deleted"
)]
fn scenario_failed_launch(rolling_context: RollingContext) {
    let _ = rolling_context;
}

#[scenario(
    path = "tests/features/rolling_update.feature",
    name = "Servers created after the listing are left alone"
)]
fn scenario_late_server(rolling_context: RollingContext) {
    let _ = rolling_context;
}
