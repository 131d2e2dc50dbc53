use crate::devices::{Actuation, Device, DeviceId};
use heapless::Vec;
use static_assertions::const_assert;
use thiserror::Error;
use tracing::debug;

pub const MAX_DEVICES: usize = 16;

const_assert!(MAX_DEVICES > 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("device id {0} is already registered")]
    DuplicateId(DeviceId),
    #[error("registry is full ({} devices)", MAX_DEVICES)]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Invalid device id: {0}")]
    UnknownDevice(DeviceId),
}

struct Entry {
    id: DeviceId,
    device: Box<dyn Device>,
}

/// Insertion-ordered, fixed-capacity map from [`DeviceId`] to device.
///
/// Built once at start-up; devices live here for the life of the process.
pub struct DeviceRegistry {
    entries: Vec<Entry, MAX_DEVICES>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, id: DeviceId, device: Box<dyn Device>) -> Result<(), RegistryError> {
        if self.contains(id) {
            return Err(RegistryError::DuplicateId(id));
        }
        let name = device.name().to_string();
        self.entries
            .push(Entry { id, device })
            .map_err(|_| RegistryError::Full)?;
        debug!(%id, device = %name, "registered device");
        Ok(())
    }

    /// Looks up `id` and applies `value`. Range checks belong to the device.
    pub fn dispatch(&mut self, id: DeviceId, value: u32) -> Result<Actuation, DispatchError> {
        let device = self.get_mut(id).ok_or(DispatchError::UnknownDevice(id))?;
        let actuation = device.set_value(value);
        debug!(%id, value, ?actuation, "dispatched");
        Ok(actuation)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&dyn Device> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.device.as_ref())
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut (dyn Device + 'static)> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| e.device.as_mut())
    }

    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut (dyn Device + 'static)> + '_ {
        self.entries.iter_mut().map(|e| e.device.as_mut())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (e.id, e.device.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Relay;
    use crate::hal::{DigitalPin, SimulatedPin};

    fn relay(pin: u16) -> Box<dyn Device> {
        Box::new(Relay::new("relay", SimulatedPin::new(pin)))
    }

    #[test]
    fn test_registry_preserves_insertion_order() {
        let mut registry = DeviceRegistry::new();
        for id in [11u16, 4, 5, 6] {
            registry.register(DeviceId(id), relay(id)).unwrap();
        }

        let ids: alloc::vec::Vec<u16> = registry.ids().map(|id| id.0).collect();
        assert_eq!(ids, vec![11, 4, 5, 6]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = DeviceRegistry::new();
        registry.register(DeviceId(4), relay(4)).unwrap();

        assert_eq!(
            registry.register(DeviceId(4), relay(4)),
            Err(RegistryError::DuplicateId(DeviceId(4)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut registry = DeviceRegistry::new();
        for id in 0..MAX_DEVICES as u16 {
            registry.register(DeviceId(id), relay(id)).unwrap();
        }
        assert_eq!(
            registry.register(DeviceId(999), relay(999)),
            Err(RegistryError::Full)
        );
    }

    #[test]
    fn test_dispatch_to_known_device() {
        let pin = SimulatedPin::new(5);
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceId(5), Box::new(Relay::new("camera_0", pin.clone())))
            .unwrap();

        assert_eq!(registry.dispatch(DeviceId(5), 1), Ok(Actuation::Applied));
        assert!(pin.read());
    }

    #[test]
    fn test_dispatch_to_unknown_device() {
        let mut registry = DeviceRegistry::new();
        registry.register(DeviceId(5), relay(5)).unwrap();

        let err = registry.dispatch(DeviceId(7), 1).unwrap_err();
        assert_eq!(err, DispatchError::UnknownDevice(DeviceId(7)));
        assert_eq!(err.to_string(), "Invalid device id: 7");
    }
}
