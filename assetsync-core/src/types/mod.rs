//! Wire and state types shared by server and clients

mod commands;
mod context;
mod fs;
mod protocol;

pub use commands::*;
pub use context::*;
pub use fs::*;
pub use protocol::*;
