//! # Accounting Oracle Test Suite
//!
//! End-to-end report cycles driven through the public API of
//! `accounting-oracle`, with the in-memory protocol standing in for the
//! chain and `oracle-telemetry` providing the metrics scrape.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── e2e_report_cycle.rs   # Frame → snapshot → consensus → commit
//!     └── concurrency.rs        # Fan-out and overlapping cycles
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p oracle-tests
//! cargo test -p oracle-tests integration::e2e_report_cycle::
//! ```

pub mod integration;
