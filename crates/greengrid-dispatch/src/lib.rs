//! greengrid-dispatch: carbon-aware job placement and savings accounting.
//!
//! A submitted job is evaluated against the live carbon intensity of its
//! requested region:
//!
//! - green enough → run in place
//! - moderately dirty and low priority → delay and retry
//! - otherwise → relocate to the greenest catalog region
//!
//! Relocated jobs then accrue savings on a fixed accounting period until
//! they are stopped.
//!
//! # Architecture
//!
//! ```text
//! SchedulerRuntime (N workers, mpsc queue, per-job locks)
//!   ├── Dispatcher ── DecisionEngine ── Policy + region scan
//!   ├── Accumulator (per-tick credit)
//!   └── JobTimers (retry / tick timers feeding the queue)
//! ```

pub mod accumulator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod policy;
pub mod region_scan;
pub mod runtime;
pub mod timers;

pub use accumulator::{Accumulator, TickOutcome};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::{Assignment, Decision, DecisionEngine};
pub use error::{DispatchError, DispatchResult};
pub use policy::{Placement, Plan, Policy};
pub use runtime::{FollowUp, RequeueMode, SchedulerHandle, SchedulerRuntime, WorkItem};
pub use timers::JobTimers;
