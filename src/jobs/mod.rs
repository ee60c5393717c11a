//! Concurrent cull dispatch
//!
//! Decouples "decide visibility" from "submit draw work": the octree
//! walk feeds node-content jobs to worker tasks through a bounded
//! queue, workers classify objects into a bounded output queue, and a
//! single consumer drains results for submission. Producer accounting
//! on the output queue lets the consumer distinguish "no more work is
//! coming" from "queue is merely empty".

pub mod executor;
pub mod queue;

pub use executor::{run_concurrent, CullExecutor, CullQueues};
pub use queue::{JobQueue, OutputQueue};
