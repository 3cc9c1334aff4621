//! Socket relays between the browser and the kernel server.

mod execute;
mod terminal;

pub use execute::{ExecuteQuery, execute_ws, resolve_workspace};
pub use terminal::terminal_ws;
