//! Direct thread for tests of actor consumers.
//!
//! `bind` hands back the implementation itself: calls run in place on the
//! caller's thread, panics reach the caller unchanged.

use crate::actor_ref::{ActorInterface, ActorRef, ActorThread, MessageSender};
use crate::message::Message;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectActorThread;

impl DirectActorThread {
    pub fn new() -> Self {
        Self
    }
}

impl ActorThread for DirectActorThread {
    fn sender_named<T>(&self, actor: Arc<T>, _actor_name: &'static str) -> Arc<dyn MessageSender<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Arc::new(DirectSender { actor })
    }

    fn bind<T: ActorInterface + ?Sized>(&self, actor: Arc<T>) -> ActorRef<T> {
        ActorRef::new(actor)
    }
}

/// Invokes every message immediately
struct DirectSender<T: ?Sized> {
    actor: Arc<T>,
}

impl<T: ?Sized + Send + Sync + 'static> MessageSender<T> for DirectSender<T> {
    fn deliver(&self, mut message: Box<dyn Message<T>>) {
        message.invoke(&self.actor);
    }
}
