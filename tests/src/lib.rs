//! # TyPoints Test Suite
//!
//! Cross-holder tests that run several `TokenLedgerService` instances over
//! one shared in-memory chain, overlay and relay.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── token_benchmarks.rs   # Script codec and proof costs
//! └── src/
//!     └── integration/
//!         ├── fixtures.rs       # Network, holders, counting collaborators
//!         ├── flows.rs          # Mint / send / receive end to end
//!         └── properties.rs     # Randomised balance invariants
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p tp-tests
//!
//! # By category
//! cargo test -p tp-tests integration::flows::
//! cargo test -p tp-tests integration::properties::
//!
//! # Benchmarks
//! cargo bench -p tp-tests
//! ```

pub mod integration;
