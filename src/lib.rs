/// Loom - a concatenative language core with verified overload resolution
///
/// This crate implements the Loom core, including:
/// - Tagged object model with shared-ownership heap values
/// - Multi-arity value stack
/// - Word registry with overloaded, refined, and generic signatures
/// - Build-time signature verifier with symbolic execution
/// - Execution engine that replays the verified resolution plans
pub mod engine;
pub mod object;
pub mod registry;
pub mod stack;
pub mod verifier;

pub use engine::{Machine, RuntimeError, WordResult};
pub use object::Object;
pub use registry::{Body, Effect, Instr, Literal, Overload, Refinement, Registry, Slot, SlotType};
pub use stack::Stack;
pub use verifier::{verify, BuildError, VerifiedProgram};
