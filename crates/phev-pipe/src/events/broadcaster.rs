//! Single-listener event broadcaster

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::PipeEvent;

/// Context handed to the listener alongside each event
#[derive(Clone, Default)]
pub struct PipeContext {
    name: String,
    user: Option<Arc<dyn Any + Send + Sync>>,
}

impl PipeContext {
    /// Create a context with a pipe name and optional user data
    pub fn new(name: impl Into<String>, user: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        Self {
            name: name.into(),
            user,
        }
    }

    /// Name of the pipe that raised the event
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the user data as `T`, if it was supplied and has that type
    pub fn user<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.user.as_deref().and_then(|u| u.downcast_ref::<T>())
    }
}

impl fmt::Debug for PipeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeContext")
            .field("name", &self.name)
            .field("has_user", &self.user.is_some())
            .finish()
    }
}

/// Receives domain events from the pipe
pub trait EventListener: Send + Sync {
    /// Called synchronously for every dispatched event
    fn on_event(&self, ctx: &PipeContext, event: &PipeEvent);
}

impl<F> EventListener for F
where
    F: Fn(&PipeContext, &PipeEvent) + Send + Sync,
{
    fn on_event(&self, ctx: &PipeContext, event: &PipeEvent) {
        self(ctx, event)
    }
}

/// Holds at most one listener and forwards events to it.
///
/// The slot lock is held while the listener runs, so a listener must not
/// register or deregister from inside its own callback.
pub struct EventBroadcaster {
    context: PipeContext,
    listener: Mutex<Option<Box<dyn EventListener>>>,
}

impl EventBroadcaster {
    /// Create a broadcaster with no listener
    pub fn new(context: PipeContext) -> Self {
        Self {
            context,
            listener: Mutex::new(None),
        }
    }

    /// Install a listener, replacing any existing one
    pub fn register(&self, listener: impl EventListener + 'static) {
        *self.slot() = Some(Box::new(listener));
        debug!(pipe = self.context.name(), "event listener registered");
    }

    /// Remove the current listener, if any
    pub fn deregister(&self) {
        let previous = self.slot().take();
        if previous.is_some() {
            debug!(pipe = self.context.name(), "event listener deregistered");
        }
    }

    /// Check whether a listener is installed
    pub fn is_registered(&self) -> bool {
        self.slot().is_some()
    }

    /// Deliver an event to the listener, or drop it if none is registered
    pub fn dispatch(&self, event: &PipeEvent) {
        let slot = self.slot();
        match slot.as_ref() {
            Some(listener) => {
                debug!(?event, "sending event");
                listener.on_event(&self.context, event);
            }
            None => debug!(?event, "no listener registered, not sending event"),
        }
    }

    /// Context passed to listeners
    pub fn context(&self) -> &PipeContext {
        &self.context
    }

    fn slot(&self) -> MutexGuard<'_, Option<Box<dyn EventListener>>> {
        // A panicking listener poisons the lock; the slot itself stays valid
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("context", &self.context)
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl EventListener + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        (count, move |_: &PipeContext, _: &PipeEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_without_listener() {
        let broadcaster = EventBroadcaster::new(PipeContext::default());
        broadcaster.dispatch(&PipeEvent::PairingAcknowledged);
        assert!(!broadcaster.is_registered());
    }

    #[test]
    fn test_register_replaces_listener() {
        let broadcaster = EventBroadcaster::new(PipeContext::default());
        let (first, first_listener) = counter();
        let (second, second_listener) = counter();

        broadcaster.register(first_listener);
        broadcaster.dispatch(&PipeEvent::RegistrationRequested);
        broadcaster.register(second_listener);
        broadcaster.dispatch(&PipeEvent::RegistrationRequested);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deregister_releases_listener() {
        let broadcaster = EventBroadcaster::new(PipeContext::default());
        let (count, listener) = counter();

        broadcaster.register(listener);
        assert_eq!(Arc::strong_count(&count), 2);

        broadcaster.deregister();
        broadcaster.dispatch(&PipeEvent::PairingAcknowledged);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&count), 1);
    }

    #[test]
    fn test_context_user_data() {
        let ctx = PipeContext::new("car", Some(Arc::new(42u32)));
        assert_eq!(ctx.name(), "car");
        assert_eq!(ctx.user::<u32>(), Some(&42));
        assert_eq!(ctx.user::<String>(), None);
    }
}
