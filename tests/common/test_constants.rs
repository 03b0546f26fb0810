//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Flavor seeded servers run with.
pub const SMALL_FLAVOR: &str = "m1.small";

/// Larger seeded flavor used as a resize target.
pub const LARGE_FLAVOR: &str = "m1.large";

/// Seeded image used as a rolling-update target.
pub const TARGET_IMAGE: &str = "ubuntu-22.04";
