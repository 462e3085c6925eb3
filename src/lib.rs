#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod _guide;
pub mod campaign;
pub mod codegen;
pub mod context;
pub mod contract;
pub mod error;
pub mod exec;
mod log;
pub mod mutant;
pub mod mutation;
pub mod program;
mod rng;
pub mod telemetry;
pub mod ty;

pub use campaign::{Campaign, Report, Session};
pub use codegen::Artifact;
pub use context::Context;
pub use contract::{BodyMutation, Contract, TypeConfusion};
pub use error::{Error, ErrorKind, ErrorMessage, Result, ResultExt};
pub use exec::{Execution, Outcome, Runner, ThreadRunner};
pub use mutant::{FieldId, InstrId, LocalId, MethodId, Mutant, Op, Signature};
pub use mutation::{Granularity, Mutation, MutationError, MutationKind};
pub use program::{Program, UnitId};
pub use rng::Rng;
pub use telemetry::{Counters, Status, StatusScreen, Telemetry};
pub use ty::Type;
