// === Shared Protocol Primitives ===
pub mod bloom;
pub mod events;
pub mod identity;

// === Re-exports for broader ecosystem access ===
pub use bloom::BloomFilter;
pub use events::{EventRecord, ExitReason, RunEvent};
pub use identity::{NodeId, RunId};
