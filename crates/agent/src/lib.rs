//! The IVAN agent: response grammars plus the bounded reasoning loop.
//!
//! The loop follows a **Think → Act → Observe** cycle:
//!
//! 1. **Prompt** the model with the grammar's system prompt, prior turns
//!    and the current message
//! 2. **Parse** the reply into a thought and zero or more actions
//! 3. **If actions**: dispatch them, fold the results into a new message,
//!    loop back to step 1
//! 4. **If no actions, or only `respond_to_user`**: return the answer
//!
//! The loop stops after a fixed number of model calls, on a caller
//! deadline, or when cancelled.

pub mod grammar;
pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use grammar::ResponseGrammar;
pub use loop_runner::{AgentLoop, AgentReply, LoopResponse, RunControl};
