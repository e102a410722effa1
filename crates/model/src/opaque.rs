use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A provider-native message that the assistant carries around without
/// looking into it.
///
/// Within a tool-call round trip the model turn that requested the calls
/// has to be replayed to the provider verbatim. Providers may attach data
/// the neutral types can't express (function call ids, thought signatures,
/// etc.), so the provider wraps its own representation in an
/// `OpaqueMessage` and later unwraps it when building the next request.
pub struct OpaqueMessage(Arc<dyn OpaqueMessageObject>);

impl OpaqueMessage {
    /// Creates a new `OpaqueMessage`.
    ///
    /// The `id` identifies the message and should be unique within one
    /// request. Two `OpaqueMessage`s are equal iff their ids are equal.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        let id = id.into();
        Self(Arc::new(OpaqueMessageInner { id, value }))
    }

    /// Returns the id of this message.
    #[inline]
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Borrows the provider-native value, if it has the type `T`.
    #[inline]
    pub fn to_raw<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl Clone for OpaqueMessage {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Debug for OpaqueMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueMessage").field(&self.0.id()).finish()
    }
}

impl PartialEq for OpaqueMessage {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for OpaqueMessage {}

impl Hash for OpaqueMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

trait OpaqueMessageObject: Send + Sync {
    fn id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

struct OpaqueMessageInner<T> {
    id: String,
    value: T,
}

impl<T: Send + Sync + 'static> OpaqueMessageObject for OpaqueMessageInner<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}
