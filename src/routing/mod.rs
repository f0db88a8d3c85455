//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (setup, single-threaded):
//!     pattern + method mask + target
//!     → table.rs (compile regex once, append to filter or handler sequence)
//!
//! Lookup (per request, read-only):
//!     normalized path + method
//!     → walk sequence in registration order
//!     → skip entries whose pattern or method mask does not apply
//! ```
//!
//! # Design Decisions
//! - Registration order is evaluation order
//! - Duplicate patterns are separate entries, never replacements
//! - Target flavor (signal-returning or legacy) is fixed at registration

mod method;
mod table;
mod target;

pub use method::MethodMask;
pub use table::{Phase, RouteEntry, RouteTable};
pub use target::{Continuation, Control, Handler, LegacyHandler};

pub(crate) use target::Target;
