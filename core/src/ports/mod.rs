// core/src/ports/mod.rs
//
// The seam between the engine and the warehouse collaborator. A narrow
// trait the application layer depends on, implemented by whatever
// concrete warehouse driver a deployment wires up.

pub mod session;

pub use session::{ChangeHistoryEntry, DeployOutcome, Session};
