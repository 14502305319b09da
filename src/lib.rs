#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod audit;
mod error;
mod finalization;
mod graph;
#[cfg(feature = "inspector")]
mod inspector;
mod node;
mod parent_set;
mod pending;
mod runtime;
mod staging;
pub mod tracer;
mod types;

pub use audit::{audit, AuditReport, ConsistencyViolation};
pub use error::{Error, Operation, StructuralError};
pub use finalization::Finalization;
pub use graph::Graph;
#[cfg(feature = "inspector")]
pub use inspector::{EventCollector, FlowEvent};
pub use node::{
    ChildFacet, Depth, EvaluableFacet, Inputs, Node, NodeBuilder, NodeId, Observer, OutputFacet,
    ParentFacet, Recompute, TriggerFacet,
};
pub use parent_set::{ParentLayout, ParentSet, ParentSetMut, VariableLayout};
pub use pending::EvalPending;
pub use runtime::{Blackboard, BlackboardBuilder, Round, RoundSummary};
pub use staging::{ParentRef, PendingRef, Staging};
#[cfg(feature = "tracing")]
pub use tracer::TracingTracer;
pub use tracer::{NoopTracer, RoundId, Tracer};
pub use types::{SlotType, TypeTag};
