//! Scoring module - deterministic scorers, the judge scorer and the harness
//!
//! Every scorer yields exactly one [`ScoreResult`](llm_leaderboard_domain::ScoreResult)
//! per test case. A low score and a scorer that could not do its job are
//! distinguished by the `scoringError` flag.

mod evaluators;
mod harness;
mod judge;

pub use evaluators::*;
pub use harness::*;
pub use judge::*;
