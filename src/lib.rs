//! Discount-policy billing engine for a school administration platform.
//!
//! The wider platform is CRUD plumbing over a relational store and lives
//! elsewhere; this crate owns the one subsystem with real decision logic:
//! deriving automatic fee discounts from configured policies, reconciling
//! them against manual overrides, and keeping per-student entitlement rows
//! synchronized as lifecycle events arrive.
//!
//! The engine is a library invoked in-process. Storage is abstracted behind
//! the traits in [`discounts::store`]; the platform supplies implementations
//! backed by its relational store, and the [`discounts::router`] module
//! offers a thin axum adapter for mounting the facade into the host service.

/// Environment-driven application configuration.
pub mod config;
/// The discount-policy billing engine workflow.
pub mod discounts;
/// Tracing/telemetry bootstrap for embedding hosts.
pub mod telemetry;
