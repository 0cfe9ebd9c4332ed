//! These models represent the objects passed around by the agent
//!
//! There are two related formats in play:
//! - the internal structs below, used by the agent, systems and session
//! - openai-style chat completion messages/tools, sent to the LLM provider
//!
//! Wire conversion happens in `providers::utils`; everything else works on
//! the internal structs only.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
