//! Oxide Provider Reconciliation Engine
//!
//! This crate provides the resource-agnostic half of the Oxide provider:
//! the attribute model every managed entity declares, and the machinery
//! that turns Config, Plan and State documents into lifecycle calls.
//!
//! # Components
//!
//! - **Attribute Model**: typed attributes, roles, validators, plan modifiers
//! - **Planner**: derives the Plan and the create/update/replace decision
//! - **Timeout Policy**: per-phase deadlines from the `timeouts` sub-record
//! - **Diff / Sequencer**: add-before-remove convergence of sub-collections
//! - **Driver**: binds a [`Resource`] to the host protocol callbacks
//! - **Data sources**: read-only lookups bound through [`DataSourceDriver`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Host tool                      │
//! │          (plan / apply / refresh / import)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │ JSON over stdio
//! ┌─────────────────▼───────────────────────────────┐
//! │                 oxide-engine                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │            ResourceDriver                 │   │
//! │  │  validate → plan → create/read/update/... │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Schema     │  │  Sequencer   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │ trait Resource
//! ┌───────▼───────┐ ┌───────────────┐
//! │ oxide-provider│→│   oxide-api   │
//! │  (resources)  │ │ (HTTP client) │
//! └───────────────┘ └───────────────┘
//! ```

pub mod data_source;
pub mod diagnostics;
pub mod diff;
pub mod driver;
pub mod error;
pub mod plan;
pub mod resource;
pub mod schema;
pub mod sequencer;
pub mod timeouts;
pub mod validation;
pub mod value;

// Re-exports
pub use data_source::{DataSource, DataSourceDriver};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use diff::{slice_diff, slice_diff_by};
pub use driver::{Outcome, PlanOutcome, ResourceDriver};
pub use error::{EngineError, Result};
pub use plan::{PlannedAction, PlannedChange, plan_resource_change};
pub use resource::{DeleteOutcome, ReadOutcome, Resource};
pub use schema::{
    AttrPath, Attribute, AttributeType, ConfigValidator, Pattern, PlanModifier, Role, Schema,
    Validator,
};
pub use sequencer::{CollectionChanges, CompositeOps, Step, StepFailure, StepKind};
pub use timeouts::{DEFAULT_TIMEOUT, Phase, Timeouts};
pub use value::rfc3339;
