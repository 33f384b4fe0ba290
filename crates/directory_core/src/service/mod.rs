//! Resident use-case services.
//!
//! # Responsibility
//! - Run every resident mutation through the audited orchestrator.
//! - Keep CLI and other boundary layers decoupled from storage details.

pub mod csv_service;
pub mod resident_service;
