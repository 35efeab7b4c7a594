//! # Hub-Chain Test Suite
//!
//! Scenarios that drive the whole application through its lifecycle entry
//! points, the way a consensus engine would.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/             # Criterion benchmarks of the block pipeline
//! └── src/integration/
//!     ├── harness.rs       # Genesis fixtures, signers, query helpers
//!     ├── lifecycle.rs     # InitChain, block stages, determinism
//!     ├── hooks.rs         # Staking observers
//!     ├── zero_height.rs   # Export and re-import
//!     ├── protocol_switch.rs
//!     └── wiring.rs        # Router and keeper-graph assembly errors
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hub-tests
//! cargo test -p hub-tests integration::protocol_switch::
//! cargo bench -p hub-tests
//! ```

pub mod integration;
