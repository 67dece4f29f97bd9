//! Change notifications after successful writes.
//!
//! A [`ChangeHub`] keeps, per record type, the listeners registered with
//! [`ChangeHub::on_change`]. Inserts, updates and upserts fire the hub with
//! the record the database returned; deletes never do.
//!
//! Delivery is synchronous, on the writer's task, in registration order. The
//! first listener that fails stops delivery and its error is returned to
//! the writer as [`Error::Listener`]; the write itself has already happened.

use crate::persisted::Persisted;
use crate::{Error, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Error type listeners may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Arc<dyn Fn(&dyn Any) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Registry of change listeners, keyed by record type.
///
/// Cloning is cheap and clones share listeners.
#[derive(Clone, Default)]
pub struct ChangeHub {
    listeners: Arc<RwLock<HashMap<TypeId, Vec<Listener>>>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for changes to `T`.
    pub fn on_change<T, F>(&self, listener: F)
    where
        T: Persisted,
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let erased: Listener = Arc::new(move |record: &dyn Any| match record.downcast_ref::<T>() {
            Some(record) => listener(record),
            None => Ok(()),
        });
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<T>())
            .or_default()
            .push(erased);
    }

    /// Deliver `record` to every listener registered for exactly `T`.
    pub fn fire<T: Persisted>(&self, record: &T) -> Result<()> {
        // Snapshot so listeners may register more listeners without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_default();

        for (position, listener) in listeners.iter().enumerate() {
            if let Err(source) = (**listener)(record) {
                tracing::warn!(
                    type_name = std::any::type_name::<T>(),
                    position,
                    error = %source,
                    "change listener failed, stopping delivery"
                );
                return Err(Error::Listener {
                    type_name: std::any::type_name::<T>(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Number of listeners registered for `T`.
    pub fn listener_count<T: Persisted>(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ChangeHub").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persisted::{FieldDecl, TypeDecl, Values};
    use crate::value::{Kind, Value};
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    struct Note(i64);

    impl Persisted for Note {
        fn declaration() -> TypeDecl {
            TypeDecl::new("Note").field(FieldDecl::new("id", Kind::Int64).primary_key())
        }

        fn to_values(&self) -> Vec<Value> {
            vec![self.0.into()]
        }

        fn from_values(mut values: Values<'_>) -> Result<Self> {
            Ok(Note(values.take()?))
        }
    }

    struct Other;

    impl Persisted for Other {
        fn declaration() -> TypeDecl {
            TypeDecl::new("Other")
        }

        fn to_values(&self) -> Vec<Value> {
            Vec::new()
        }

        fn from_values(_values: Values<'_>) -> Result<Self> {
            Ok(Other)
        }
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let hub = ChangeHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            hub.on_change(move |note: &Note| {
                seen.lock().unwrap().push(format!("{tag}:{}", note.0));
                Ok(())
            });
        }

        hub.fire(&Note(5)).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:5", "second:5", "third:5"]
        );
    }

    #[test]
    fn test_failure_stops_delivery() {
        let hub = ChangeHub::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        hub.on_change(move |_: &Note| {
            c.lock().unwrap().push(1);
            Ok(())
        });
        hub.on_change(|_: &Note| Err("listener exploded".into()));
        let c = calls.clone();
        hub.on_change(move |_: &Note| {
            c.lock().unwrap().push(3);
            Ok(())
        });

        let err = hub.fire(&Note(1)).unwrap_err();
        assert!(matches!(err, Error::Listener { .. }));
        assert!(err.to_string().contains("listener exploded"));
        assert_eq!(*calls.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_listeners_are_per_type() {
        let hub = ChangeHub::new();
        hub.on_change(|_: &Other| Err("wrong type".into()));
        assert_eq!(hub.listener_count::<Note>(), 0);
        assert_eq!(hub.listener_count::<Other>(), 1);
        hub.fire(&Note(1)).unwrap();
    }

    #[test]
    fn test_listener_may_register_listeners() {
        let hub = ChangeHub::new();
        let inner = hub.clone();
        hub.on_change(move |_: &Note| {
            inner.on_change(|_: &Note| Ok(()));
            Ok(())
        });

        hub.fire(&Note(1)).unwrap();
        assert_eq!(hub.listener_count::<Note>(), 2);
    }
}
