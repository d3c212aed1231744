//! Opaque renderer handles and the registry that owns the renderers.

use loom_platform::Window;
use tracing::{error, warn};

use crate::renderer::Renderer;

/// Bits of the handle holding the slot index; the rest hold the generation.
const INDEX_BITS: u32 = 24;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << (32 - INDEX_BITS)) - 1;

/// Opaque handle identifying a renderer in a [`RendererRegistry`].
///
/// Handles are stable for the lifetime of the renderer they name, including
/// across registry growth. A slot's generation is bumped when its renderer
/// is destroyed, so a stale handle can never alias a renderer later created
/// in the same slot. [`RendererHandle::INVALID`] never refers to a live
/// renderer and every registry operation accepts it as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererHandle(u32);

impl RendererHandle {
    /// Sentinel handle that never refers to a live renderer.
    pub const INVALID: Self = Self(u32::MAX);

    /// Returns true unless this is the invalid sentinel.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    #[inline]
    fn new(index: usize, generation: u32) -> Self {
        Self(((generation & GENERATION_MASK) << INDEX_BITS) | (index as u32 & INDEX_MASK))
    }

    #[inline]
    fn index(&self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    #[inline]
    fn generation(&self) -> u32 {
        self.0 >> INDEX_BITS
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot table mapping generational handles to owned values.
///
/// Freed slots are reused before the table grows, and growth never moves
/// live entries, so outstanding handles stay valid. Removal bumps the
/// slot's generation; handles from before the removal then fail the
/// generation check and resolve to nothing.
struct HandleRegistry<T> {
    slots: Vec<Slot<T>>,
}

impl<T> HandleRegistry<T> {
    fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn insert(&mut self, value: T) -> RendererHandle {
        if let Some(index) = self.slots.iter().position(|slot| slot.value.is_none()) {
            let slot = &mut self.slots[index];
            slot.value = Some(value);
            return RendererHandle::new(index, slot.generation);
        }

        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        RendererHandle::new(index, 0)
    }

    fn get_mut(&mut self, handle: RendererHandle) -> Option<&mut T> {
        if !handle.is_valid() {
            return None;
        }
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    fn remove(&mut self, handle: RendererHandle) -> Option<T> {
        if !handle.is_valid() {
            return None;
        }
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        // Invalidates every outstanding handle to this slot
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        Some(value)
    }
}

/// Owns every live [`Renderer`] and hands out opaque handles.
///
/// All operations are safe on invalid or stale handles: they log and do
/// nothing rather than panic.
pub struct RendererRegistry {
    renderers: HandleRegistry<Renderer>,
}

impl RendererRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            renderers: HandleRegistry::new(),
        }
    }

    /// Creates a renderer for `window` and returns its handle.
    ///
    /// On failure the error is logged and [`RendererHandle::INVALID`] is
    /// returned; the caller can keep running without a renderer.
    pub fn create(
        &mut self,
        window: &Window,
        vert_spirv: &[u8],
        frag_spirv: &[u8],
    ) -> RendererHandle {
        match Renderer::new(window, vert_spirv, frag_spirv) {
            Ok(renderer) => self.renderers.insert(renderer),
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                RendererHandle::INVALID
            }
        }
    }

    /// Rebuilds the swapchain of the renderer behind `handle`.
    ///
    /// No-op for invalid or stale handles.
    pub fn reload(&mut self, handle: RendererHandle) {
        let Some(renderer) = self.renderers.get_mut(handle) else {
            return;
        };
        if let Err(e) = renderer.recreate_swapchain() {
            error!("Failed to rebuild swapchain: {}", e);
        }
    }

    /// Draws one frame with the renderer behind `handle`.
    ///
    /// No-op for invalid or stale handles. A fatal frame error is logged
    /// once; the renderer then refuses further frames on its own.
    pub fn draw_frame(&mut self, handle: RendererHandle) {
        let Some(renderer) = self.renderers.get_mut(handle) else {
            return;
        };
        if let Err(e) = renderer.draw_frame() {
            error!("Frame failed, stopping renderer: {}", e);
        }
    }

    /// Destroys the renderer behind `handle` and frees its slot.
    ///
    /// No-op for invalid or stale handles; destroying the same handle twice
    /// logs and does nothing the second time.
    pub fn destroy(&mut self, handle: RendererHandle) {
        if !handle.is_valid() {
            return;
        }
        if self.renderers.remove(handle).is_none() {
            warn!("destroy called on stale renderer handle {:?}", handle);
        }
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handle_sentinel() {
        assert!(!RendererHandle::INVALID.is_valid());
        assert!(RendererHandle::new(0, 0).is_valid());
        assert!(RendererHandle::new(7, 3).is_valid());
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry: HandleRegistry<String> = HandleRegistry::new();
        let a = registry.insert("a".to_string());
        let b = registry.insert("b".to_string());
        assert_ne!(a, b);
        assert_eq!(registry.get_mut(a).map(|s| s.as_str()), Some("a"));
        assert_eq!(registry.get_mut(b).map(|s| s.as_str()), Some("b"));
    }

    #[test]
    fn test_handles_stable_across_growth() {
        let mut registry: HandleRegistry<usize> = HandleRegistry::new();
        let first = registry.insert(0);
        // Force repeated reallocation of the slot table
        for value in 1..100 {
            registry.insert(value);
        }
        assert_eq!(registry.get_mut(first).copied(), Some(0));
    }

    #[test]
    fn test_freed_slot_reused_under_new_generation() {
        let mut registry: HandleRegistry<&str> = HandleRegistry::new();
        let a = registry.insert("a");
        let _b = registry.insert("b");
        assert_eq!(registry.remove(a), Some("a"));

        // Same slot, different generation: the handles must not be equal
        let c = registry.insert("c");
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert_eq!(registry.get_mut(c).copied(), Some("c"));
    }

    #[test]
    fn test_stale_handle_never_aliases_new_entry() {
        let mut registry: HandleRegistry<&str> = HandleRegistry::new();
        let stale = registry.insert("first renderer");
        assert_eq!(registry.remove(stale), Some("first renderer"));

        let fresh = registry.insert("second renderer");
        assert_eq!(registry.get_mut(stale), None);
        assert_eq!(registry.remove(stale), None);
        // The new occupant is untouched by operations on the stale handle
        assert_eq!(registry.get_mut(fresh).copied(), Some("second renderer"));
    }

    #[test]
    fn test_operations_on_invalid_handle_are_noops() {
        let mut registry: HandleRegistry<&str> = HandleRegistry::new();
        assert!(registry.get_mut(RendererHandle::INVALID).is_none());
        assert!(registry.remove(RendererHandle::INVALID).is_none());
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let mut registry: HandleRegistry<&str> = HandleRegistry::new();
        let a = registry.insert("a");
        assert_eq!(registry.remove(a), Some("a"));
        assert_eq!(registry.remove(a), None);
        assert!(registry.get_mut(a).is_none());
    }

    #[test]
    fn test_out_of_range_handle_is_safe() {
        let mut registry: HandleRegistry<&str> = HandleRegistry::new();
        assert!(registry.get_mut(RendererHandle::new(42, 0)).is_none());
        assert!(registry.remove(RendererHandle::new(42, 0)).is_none());
    }

    #[test]
    fn test_generation_wraps_without_collision() {
        let mut registry: HandleRegistry<u32> = HandleRegistry::new();
        let mut handle = registry.insert(0);
        // Cycle the slot through a full generation wrap
        for round in 1..=(GENERATION_MASK + 1) {
            assert_eq!(registry.remove(handle), Some(round - 1));
            assert_eq!(registry.remove(handle), None);
            handle = registry.insert(round);
        }
        assert_eq!(registry.get_mut(handle).copied(), Some(GENERATION_MASK + 1));
    }
}
