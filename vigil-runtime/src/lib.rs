//! Vigil Runtime
//!
//! Fan-out/fan-in orchestration over the registered source adapters:
//! every adapter collects concurrently, partial failures degrade to empty
//! contributions, and merged results are handed to the indicator
//! repository for deduplicating upsert.

pub mod orchestrator;
pub mod repo;

pub use orchestrator::*;
pub use repo::*;
