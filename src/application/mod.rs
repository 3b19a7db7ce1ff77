//! Application layer containing the workflow orchestration.
//!
//! `EnrollmentEngine` is the entry point. Every request runs in its own unit
//! of work owned by the `WorkflowOrchestrator`; notifications leave through a
//! background dispatcher once the unit of work has committed.

pub mod engine;
pub mod enrollment;
pub mod locks;
pub mod messages;
pub mod notifications;
pub mod orchestrator;
pub mod review;
