//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and model calls into use-case level APIs.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod reconcile;
pub mod task_service;
