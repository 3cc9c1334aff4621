//! jbridge: relays browser sessions to kernels and terminals on a kernel server.

pub mod api;
pub mod bootstrap;
pub mod kernel;
pub mod transform;
pub mod workspace;
