use crate::actor::Actor;
use crate::error::ConfigError;
use crate::id::{ActorId, SlotId, WorkerId, FIRST_DYNAMIC_SLOT};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

/// A per-worker singleton actor, identified by a static tag type.
///
/// At most one instance of a given `Tag` can live on each worker
/// (enforced at configuration time). Each tag owns a stable slot id from
/// the reserved low range, so [`service_id`] can compute the address of a
/// service on any worker without discovery.
pub trait Service: Actor {
    /// Unique marker type for this service. Usually the actor type itself.
    type Tag: 'static;
}

struct ServiceRegistry {
    by_tag: HashMap<TypeId, SlotId>,
    next: SlotId,
}

fn registry() -> &'static Mutex<ServiceRegistry> {
    static REGISTRY: OnceLock<Mutex<ServiceRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        Mutex::new(ServiceRegistry {
            by_tag: HashMap::new(),
            next: 1, // slot 0 stays invalid
        })
    })
}

/// Slot assigned to a service tag, allocating one on first use.
pub(crate) fn slot_for_tag(tag: TypeId) -> Result<SlotId, ConfigError> {
    let mut reg = registry().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = reg.by_tag.get(&tag) {
        return Ok(*slot);
    }
    if reg.next >= FIRST_DYNAMIC_SLOT {
        return Err(ConfigError::ServiceSlotsExhausted(FIRST_DYNAMIC_SLOT - 1));
    }
    let slot = reg.next;
    reg.next += 1;
    reg.by_tag.insert(tag, slot);
    Ok(slot)
}

/// Address of service `S` on `worker`.
///
/// Stable for the lifetime of the process; valid to compute before the
/// service is added (the slot is reserved on first use of the tag).
///
/// # Panics
///
/// Panics if more than 255 distinct service tags exist in the process.
pub fn service_id<S: Service>(worker: WorkerId) -> ActorId {
    match slot_for_tag(TypeId::of::<S::Tag>()) {
        Ok(slot) => ActorId::new(worker, slot),
        Err(e) => panic!("{e}"),
    }
}
