//! Dispatch - admission control and the generation gateway
//!
//! Every provider call goes through [`GenerationGateway`], which consults the
//! cache, waits for admission from the [`DispatchScheduler`], retries
//! transient failures and records one trace per attempt.

mod gateway;
mod scheduler;

pub use gateway::*;
pub use scheduler::*;
