use crate::config::AllocatorConfig;
use crate::error::AllocError;
use crate::frame::{CallSite, FrameRecord, FrameStack};
use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

const REGION_ALIGN: usize = 16;

/// A bump allocator over a fixed region, growing downwards, with frames that
/// restore the pointer on pop.
///
/// The allocator is confined to the thread that created it.
pub struct ScopedAllocator {
    region: NonNull<u8>,
    layout: Layout,
    pointer: usize,
    frames: FrameStack,
    debug: bool,
    asymmetric_pops: usize,
    _not_send: PhantomData<*mut u8>,
}

impl ScopedAllocator {
    pub fn new(config: AllocatorConfig) -> Result<Self, AllocError> {
        let size = config.region_size.max(REGION_ALIGN);
        let layout =
            Layout::from_size_align(size, REGION_ALIGN).map_err(|_| AllocError::Region { size: config.region_size })?;
        // SAFETY: the layout has a non-zero size.
        let region = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(AllocError::Region { size })?;
        log::debug!("scoped allocator reserved {} bytes at {:p}", size, region);
        Ok(ScopedAllocator {
            region,
            layout,
            pointer: region.as_ptr() as usize + size,
            frames: FrameStack::with_capacity(config.initial_frame_capacity),
            debug: config.debug,
            asymmetric_pops: 0,
            _not_send: PhantomData,
        })
    }

    /// Lowest address of the region.
    pub fn base(&self) -> usize {
        self.region.as_ptr() as usize
    }

    /// One past the highest address of the region.
    pub fn top(&self) -> usize {
        self.base() + self.layout.size()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Current allocation pointer.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn remaining(&self) -> usize {
        self.pointer - self.base()
    }

    pub fn depth(&self) -> usize {
        self.frames.depth()
    }

    pub fn frame_capacity(&self) -> usize {
        self.frames.capacity()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Pops whose site did not match the push, counted in debug mode.
    pub fn asymmetric_pops(&self) -> usize {
        self.asymmetric_pops
    }

    /// Saves the current pointer. Returns the new depth.
    #[track_caller]
    pub fn push(&mut self) -> usize {
        self.push_at(CallSite::caller())
    }

    pub fn push_at(&mut self, site: CallSite) -> usize {
        let site = self.debug.then_some(site);
        self.frames.push(FrameRecord { pointer: self.pointer, site });
        log::trace!("push frame {} at {:#x}", self.frames.depth(), self.pointer);
        self.frames.depth()
    }

    /// Restores the pointer saved by the matching push.
    #[track_caller]
    pub fn pop(&mut self) -> Result<(), AllocError> {
        self.pop_checked(CallSite::caller(), CallSite::same_file)
    }

    /// Pops a frame that must have been pushed at exactly `site`.
    pub fn pop_at(&mut self, site: CallSite) -> Result<(), AllocError> {
        self.pop_checked(site, CallSite::eq)
    }

    fn pop_checked(&mut self, site: CallSite, matches: fn(&CallSite, &CallSite) -> bool) -> Result<(), AllocError> {
        let depth = self.frames.depth();
        let record = self.frames.pop().ok_or(AllocError::FrameUnderflow)?;
        if let Some(pushed) = record.site {
            if !matches(&pushed, &site) {
                self.asymmetric_pops += 1;
                log::warn!("asymmetric frame pop: frame {} pushed at {} but popped at {}", depth, pushed, site);
            }
        }
        log::trace!("pop frame {} back to {:#x}", depth, record.pointer);
        self.pointer = record.pointer;
        Ok(())
    }

    /// Reserves `size` bytes aligned to `align` inside the current frame.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { align });
        }
        let out_of_memory = AllocError::OutOfMemory { requested: size, available: self.remaining() };
        let start = self.pointer.checked_sub(size).ok_or_else(|| out_of_memory.clone())? & !(align - 1);
        if start < self.base() {
            return Err(out_of_memory);
        }
        self.pointer = start;
        // SAFETY: `start` lies inside the region, which is non-null.
        Ok(unsafe { NonNull::new_unchecked(start as *mut u8) })
    }

    /// Like [`alloc`](Self::alloc) but zero-filled.
    pub fn calloc(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(size, align)?;
        // SAFETY: `size` bytes from `ptr` were just reserved.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(ptr)
    }

    /// Copies `bytes` into a fresh allocation.
    pub fn alloc_bytes(&mut self, bytes: &[u8], align: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(bytes.len(), align)?;
        // SAFETY: the destination was just reserved and cannot overlap `bytes`.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        Ok(ptr)
    }

    /// Pushes a frame that is popped when the guard drops.
    #[track_caller]
    pub fn frame(&mut self) -> Frame<'_> {
        let site = CallSite::caller();
        self.push_at(site);
        Frame { allocator: self, site }
    }
}

impl Drop for ScopedAllocator {
    fn drop(&mut self) {
        if self.frames.depth() > 0 {
            log::warn!("scoped allocator dropped with {} active frame(s)", self.frames.depth());
        }
        // SAFETY: allocated in `new` with this layout.
        unsafe { alloc::dealloc(self.region.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for ScopedAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedAllocator")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("size", &self.size())
            .field("pointer", &format_args!("{:#x}", self.pointer))
            .field("depth", &self.depth())
            .finish()
    }
}

/// An active frame of a [`ScopedAllocator`]; pops exactly once on drop.
pub struct Frame<'a> {
    allocator: &'a mut ScopedAllocator,
    site: CallSite,
}

impl Deref for Frame<'_> {
    type Target = ScopedAllocator;

    fn deref(&self) -> &ScopedAllocator {
        self.allocator
    }
}

impl DerefMut for Frame<'_> {
    fn deref_mut(&mut self) -> &mut ScopedAllocator {
        self.allocator
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.allocator.pop_at(self.site) {
            log::error!("frame guard: {}", err);
        }
    }
}
