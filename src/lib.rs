//! hai is a terminal chat client for OpenAI-compatible completion APIs.
//!
//! - [`core`] owns the conversation history and the streaming session that
//!   turns a server-sent event stream into [`core::session::SessionEvent`]s.
//! - [`ui`] renders the chat view and runs the interactive event loop.
//! - [`cli`] parses arguments and dispatches to the chat view, the init flow,
//!   or the one-shot `say` command.
//! - [`api`] defines the request and response payloads.

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod ui;
