use std::any::Any;

use crate::variables::network_variable::Variable;

/// A behaviour attached to a replicated object. Implementors list their
/// variables in a fixed order, the same on every peer.
pub trait Replicate: Any {
    fn variables(&self) -> Vec<&dyn Variable>;
    fn variables_mut(&mut self) -> Vec<&mut dyn Variable>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called when the local peer becomes the owner of the object
    fn on_gained_ownership(&mut self) {}
    /// Called when the local peer stops owning the object
    fn on_lost_ownership(&mut self) {}
}

impl dyn Replicate {
    pub fn downcast_ref<T: Replicate>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Replicate>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}
