//! C6: ABI lowering (spec.md §4.6) — call-site legalization, stack
//! allocation, frame composition, stack-bias propagation, and the SP
//! SSA fixup that follows once lowering has duplicated the stack pointer
//! across blocks.

pub mod call;
pub mod error;
pub mod frame;
pub mod ssa_fixup;
pub mod stack_alloc;
pub mod stack_bias;

pub use call::{lower_call, legalize_args, ArgAction, ArgAssigner, ArgLoc, CallLowering, SimpleAssigner, ValueConversion};
pub use error::Error;
pub use frame::{compose_frame, Area, FrameLayout, StackGrowth};
pub use ssa_fixup::{fixup_sp, SpChains};
pub use stack_alloc::{lower_stack_alloc, lower_stack_free, AllocLowering};
pub use stack_bias::{biased_offset, propagate, BlockDeltas};
