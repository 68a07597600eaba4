use std::pin::Pin;

use crate::event::Event;

/// A boxed async stream of `Event`s — the return type of
/// `RunCoordinator::run`/`connect`.
pub type EventStream = Pin<Box<dyn futures_core::Stream<Item = Event> + Send>>;
