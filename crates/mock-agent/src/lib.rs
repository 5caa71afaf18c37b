//! Mock agent implementations for testing.
//!
//! - [`EchoAgent`] - replies with the request text, no external calls
//! - [`ScriptedAgent`] - plays back queued event scripts and records
//!   every request it receives, including which call shape was used
//! - [`FailingAgent`] - every exchange fails with a fixed message
//!
//! All of them implement [`agent_daemon::Agent`], so the orchestrator
//! can be driven end-to-end without a running daemon.

mod echo;
mod failing;
mod scripted;

pub use echo::EchoAgent;
pub use failing::FailingAgent;
pub use scripted::{CallShape, RecordedCall, ScriptedAgent};
