//! The reasoning loop of Stepwise.
//!
//! The engine follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Build context**: system prompt (capabilities + response format) and
//!    the question with every prior step
//! 2. **Ask the model** through the configured [`stepwise_core::Provider`]
//! 3. **Parse** the reply into a final answer, an action, or nothing usable
//! 4. **Act**: invoke the capability and feed the observation back, then
//!    loop to step 1
//!
//! The loop ends on a final answer or when the step budget runs out.

pub mod context;
pub mod engine;
pub mod parser;
pub mod state;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{build_prompt, build_system_prompt};
pub use engine::{EngineError, LoopOutcome, ReactEngine};
pub use parser::{ParsedStep, parse, parse_parameters};
pub use state::LoopState;
pub use summary::ExecutionSummary;
