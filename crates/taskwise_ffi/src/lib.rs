//! Flutter bridge for the Taskwise core.

pub mod api;
