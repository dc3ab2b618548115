//! Latent - a deferred-placeholder record-and-replay engine.
//!
//! A placeholder stands in for a value that does not exist yet. Operations
//! performed on it while unresolved (member reads, invocation, operators,
//! class derivation) are captured into an ordered ledger instead of executed,
//! each returning a further placeholder so chains keep working. Supplying the
//! real subject replays the ledger in capture order and rebinds every
//! placeholder reached, so existing handles forward transparently to the
//! values they stand for.
//!
//! Two facades create deferred worlds: [`Stasis`] suspends an already-known
//! subject whose effects must be withheld, [`Mimic`] hands out a husk for a
//! subject still to come. Both return an explicit [`WorldTicket`] that is
//! required to trigger resolution.

pub mod deferred;
pub mod error;
pub mod facade;
pub mod ops;
pub mod record;
pub mod values;

pub use deferred::Deferred;
pub use error::{RuntimeError, RuntimeResult};
pub use facade::{Binder, Mimic, Stasis, WorldTicket};
pub use ops::derive_class;
pub use record::{OpKind, OperationRecord, Recorder};
pub use values::{Arity, BoundMethod, CallArgs, Class, Function, Instance, NativeFunction, Op, Value};
