use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smallvec::SmallVec;

use crate::foundation::core::Resolution;
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::filter::base::{Filter, FilterState};
use crate::gpu::device::{Framebuffer, GpuDevice, QuadGeometry, TextureId};

/// A filter shared between the group's chain snapshots.
pub type SharedFilter = Arc<Mutex<Box<dyn Filter>>>;

fn lock_filter(filter: &SharedFilter) -> MutexGuard<'_, Box<dyn Filter>> {
    filter.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Immutable draw descriptor: the filters present at snapshot time, in
/// insertion order.
///
/// Group mutation replaces the descriptor rather than editing it, so a
/// snapshot captured before a `push`/`pop` keeps describing the old chain.
#[derive(Clone)]
pub struct FilterChain {
    filters: Arc<[SharedFilter]>,
}

impl FilterChain {
    fn empty() -> Self {
        Self {
            filters: Arc::from(Vec::new()),
        }
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// The filters in insertion (draw) order.
    pub fn filters(&self) -> &[SharedFilter] {
        &self.filters
    }
}

/// An ordered composite of filters forming a processing chain.
///
/// Children draw in insertion order, each consuming the previous child's
/// output texture through a pair of ping-pong framebuffers. The group's own
/// output size propagates to every child on resize.
pub struct FilterGroup {
    chain: FilterChain,
    passthrough: FilterState,
    fbos: Option<[Framebuffer; 2]>,
    output_size: Option<Resolution>,
    initialized: bool,
}

impl FilterGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self {
            chain: FilterChain::empty(),
            passthrough: FilterState::passthrough(),
            fbos: None,
            output_size: None,
            initialized: false,
        }
    }

    /// Capture the current immutable draw descriptor.
    pub fn snapshot(&self) -> FilterChain {
        self.chain.clone()
    }

    /// Append a filter to the end of the chain.
    ///
    /// The filter is initialized and sized immediately when the group
    /// already is, and the draw descriptor is rebuilt.
    pub fn push(
        &mut self,
        device: &mut dyn GpuDevice,
        filter: Box<dyn Filter>,
    ) -> KinettaResult<()> {
        let shared: SharedFilter = Arc::new(Mutex::new(filter));
        if self.initialized {
            let mut guard = lock_filter(&shared);
            guard.init(device)?;
            if let Some(size) = self.output_size {
                guard.output_size_changed(device, size)?;
            }
        }
        let mut filters: Vec<SharedFilter> = self.chain.filters.to_vec();
        filters.push(shared);
        self.chain = FilterChain {
            filters: Arc::from(filters),
        };
        Ok(())
    }

    /// Remove and destroy the last filter in the chain. No-op on an empty
    /// group. The draw descriptor is rebuilt.
    pub fn pop(&mut self, device: &mut dyn GpuDevice) {
        let mut filters: Vec<SharedFilter> = self.chain.filters.to_vec();
        let Some(removed) = filters.pop() else {
            return;
        };
        lock_filter(&removed).destroy(device);
        self.chain = FilterChain {
            filters: Arc::from(filters),
        };
    }

    fn ensure_fbos(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<[Framebuffer; 2]> {
        if let Some(fbos) = self.fbos {
            return Ok(fbos);
        }
        let size = self
            .output_size
            .ok_or_else(|| KinettaError::validation("filter group has no output size"))?;
        let fbos = [
            device.create_framebuffer(size)?,
            device.create_framebuffer(size)?,
        ];
        self.fbos = Some(fbos);
        Ok(fbos)
    }

    fn drop_fbos(&mut self, device: &mut dyn GpuDevice) {
        if let Some(fbos) = self.fbos.take() {
            for fb in fbos {
                device.delete_framebuffer(fb.id);
            }
        }
    }

    /// Draw the chain offscreen and return the final output texture.
    ///
    /// An empty chain returns the input unchanged. The previously bound
    /// framebuffer binding is not preserved; the device is left with no
    /// framebuffer bound.
    pub fn draw_offscreen(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
    ) -> KinettaResult<TextureId> {
        let chain = self.snapshot();
        if chain.is_empty() {
            return Ok(input);
        }

        let fbos = self.ensure_fbos(device)?;
        let mut current = input;
        let geometry = QuadGeometry::upright();
        let filters: SmallVec<[SharedFilter; 8]> = chain.filters().iter().cloned().collect();
        for (i, filter) in filters.iter().enumerate() {
            let target = fbos[i % 2];
            device.bind_framebuffer(Some(target.id))?;
            lock_filter(filter).draw(device, current, &geometry)?;
            current = target.texture;
        }
        device.bind_framebuffer(None)?;
        Ok(current)
    }
}

impl Default for FilterGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FilterGroup {
    fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.passthrough.init(device)?;
        for filter in self.snapshot().filters() {
            lock_filter(filter).init(device)?;
        }
        self.initialized = true;
        Ok(())
    }

    fn output_size_changed(
        &mut self,
        device: &mut dyn GpuDevice,
        size: Resolution,
    ) -> KinettaResult<()> {
        self.output_size = Some(size);
        self.passthrough.set_output_size(size);
        self.drop_fbos(device);
        for filter in self.snapshot().filters() {
            lock_filter(filter).output_size_changed(device, size)?;
        }
        Ok(())
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()> {
        if !self.initialized {
            return Ok(());
        }
        let output = self.draw_offscreen(device, input)?;
        self.passthrough.draw(device, output, geometry)?;
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for filter in self.snapshot().filters() {
            lock_filter(filter).destroy(device);
        }
        self.drop_fbos(device);
        self.passthrough.destroy(device);
        self.initialized = false;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filter/group.rs"]
mod tests;
