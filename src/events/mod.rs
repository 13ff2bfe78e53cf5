//! In-process domain events.
//!
//! Webhook processors translate gateway notifications into [`DomainEvent`]s
//! and publish them on an [`EventDispatcher`], so application code can react
//! to payments without knowing which gateway or webhook produced them.

pub mod dispatcher;
pub mod domain;

pub use dispatcher::{EventDispatcher, Listener, ListenerId};
pub use domain::{DomainEvent, DomainEventKind};
