//! State-change triggers
//!
//! A trigger is built fluently, sealed around an async callback, and then
//! fed `state_changed` events:
//!
//! ```text
//! when("light.kitchen")  ──▶ Builder<Start>
//!     .from("on")        ──▶ Builder<From>
//!     .to("off")         ──▶ Builder<FromTo>
//!     .r#for(5, Seconds) ──▶ Builder<Timed>
//!     .r#do(callback)    ──▶ TriggerHandler
//! ```
//!
//! # Evaluation
//!
//! For each event the handler checks its call rules and, when a debounce
//! window is set, its cancel rules. Qualifying events (re)start the window;
//! cancelling events drop the pending call. An event that does both is a
//! [`TriggerError::Logic`].
//!
//! # Key Types
//!
//! - [`Rule`] - Fingerprinted predicate over a state change
//! - [`Builder`] - Typestate builder returned by [`when`], [`when_any`], [`when_custom`]
//! - [`TriggerHandler`] - Sealed trigger
//! - [`Debouncer`] - Trailing-edge debounce with cancel
//! - [`HandlerSet`] - Ordered fan-out to attached triggers

pub mod builder;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod rule;

pub use builder::{stage, when, when_any, when_custom, Builder, TimeUnit};
pub use debounce::{Debouncer, Delivery, Phase};
pub use dispatch::{DispatchReport, HandlerId, HandlerSet};
pub use error::{TriggerError, TriggerResult};
pub use handler::{callback, Callback, RuleSet, TriggerHandler};
pub use rule::{Field, Operator, Rule, RuleKind, Side};
