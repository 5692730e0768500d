//! Port implementations backed by in-process state.

pub mod in_memory;
