//! Client runtime for the ClipIt media conversion API: session management,
//! an authenticated HTTP transport, a cancellable job poller, and the
//! artifact download flow, plus the terminal front end on top.

pub mod api;
pub mod cli;
pub mod download;
pub mod model;
pub mod poller;
pub mod session;
