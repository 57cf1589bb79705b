//! # Process-wide event type registry.
//!
//! Every distinct event type gets a stable [`EventTypeId`] the first time any
//! emitter in the process touches it. Ids are dense, assigned in first-use
//! order, and never reused or freed for the remaining lifetime of the process.
//!
//! ## Rules
//! - Same type, same id: repeated [`event_type::<E>()`](event_type) calls for
//!   one `E` always return the same value.
//! - The registry is shared by every loop in the process. Two distinct types
//!   first observed concurrently from different threads can never be handed
//!   the same id: assignment happens under one lock, and the next id is the
//!   current map size.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Opaque identifier of one event type.
///
/// Assigned lazily on first use, stable for the rest of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTypeId(usize);

impl EventTypeId {
    /// Dense index backing this id.
    pub fn index(self) -> usize {
        self.0
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<TypeId, EventTypeId>>> = OnceLock::new();

/// Returns the process-wide id of event type `E`, assigning one on first use.
pub fn event_type<E: 'static>() -> EventTypeId {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut types = match registry.lock() {
        Ok(guard) => guard,
        // Registration never panics mid-update, so a poisoned map is intact.
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(id) = types.get(&TypeId::of::<E>()) {
        return *id;
    }
    let id = EventTypeId(types.len());
    types.insert(TypeId::of::<E>(), id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_same_type_same_id() {
        assert_eq!(event_type::<Alpha>(), event_type::<Alpha>());
    }

    #[test]
    fn test_distinct_types_distinct_ids() {
        assert_ne!(
            event_type::<Alpha>(),
            event_type::<Beta>(),
            "two distinct event types must never share an id"
        );
    }

    #[test]
    fn test_concurrent_first_use_yields_unique_ids() {
        struct T0;
        struct T1;
        struct T2;
        struct T3;

        let handles = vec![
            std::thread::spawn(|| event_type::<T0>()),
            std::thread::spawn(|| event_type::<T1>()),
            std::thread::spawn(|| event_type::<T2>()),
            std::thread::spawn(|| event_type::<T3>()),
        ];
        let mut ids: Vec<usize> = handles
            .into_iter()
            .map(|h| h.join().expect("registry thread panicked").index())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4, "concurrent first use must assign unique ids");
    }
}
