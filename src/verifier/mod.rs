pub mod abstract_stack;
pub mod checker;
pub mod errors;

pub use abstract_stack::{AbstractSlot, AbstractStack};
pub use checker::{verify, CallPlan, PlanKey, Resolution, VerifiedProgram};
pub use errors::{BuildError, BuildResult};
