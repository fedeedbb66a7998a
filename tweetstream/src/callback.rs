//! Registrable handler closures.

use std::fmt;
use std::sync::Arc;

use crate::session::SessionHandle;

enum Shape<T> {
    Payload(Arc<dyn Fn(T) + Send + Sync>),
    WithSession(Arc<dyn Fn(T, &SessionHandle) + Send + Sync>),
}

/// A handler for one kind of stream event.
///
/// A handler takes either the payload alone or the payload together with the
/// [`SessionHandle`] of the session dispatching it. The shape is fixed when
/// the callback is built:
///
/// ```
/// use tweetstream::{Callback, LimitNotice};
///
/// let quiet = Callback::new(|notice: LimitNotice| println!("{} withheld", notice.track));
/// let stopper = Callback::with_session(|_: LimitNotice, session| session.stop_stream());
/// # let _ = (quiet, stopper);
/// ```
pub struct Callback<T>(Shape<T>);

impl<T> Callback<T> {
    /// A handler that receives the payload only
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self(Shape::Payload(Arc::new(f)))
    }

    /// A handler that also receives the dispatching session
    pub fn with_session<F>(f: F) -> Self
    where
        F: Fn(T, &SessionHandle) + Send + Sync + 'static,
    {
        Self(Shape::WithSession(Arc::new(f)))
    }

    /// Whether the handler takes the session argument
    pub fn wants_session(&self) -> bool {
        matches!(self.0, Shape::WithSession(_))
    }

    pub(crate) fn invoke(&self, payload: T, session: &SessionHandle) {
        match &self.0 {
            Shape::Payload(f) => f(payload),
            Shape::WithSession(f) => f(payload, session),
        }
    }

    /// Invoke without a session; handlers that need one are skipped
    pub(crate) fn invoke_detached(&self, payload: T) -> bool {
        match &self.0 {
            Shape::Payload(f) => {
                f(payload);
                true
            }
            Shape::WithSession(_) => false,
        }
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        match &self.0 {
            Shape::Payload(f) => Self(Shape::Payload(Arc::clone(f))),
            Shape::WithSession(f) => Self(Shape::WithSession(Arc::clone(f))),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = if self.wants_session() {
            "payload+session"
        } else {
            "payload"
        };
        write!(f, "Callback({})", shape)
    }
}
