//! Hooks: persistent per-instance state addressed by call order.
//!
//! Every hook is a method on [`Scope`], the context a component body receives. The
//! storage behind them is the instance's [`HookStash`].

mod effect;
mod memo;
mod scope;
mod stash;
mod state;
mod transition;

pub use effect::Cleanup;
pub(crate) use effect::EffectJob;
pub use memo::Ref;
pub use scope::Scope;
pub use stash::HookStash;
pub use state::{Dispatch, Setter};
pub use transition::StartTransition;
