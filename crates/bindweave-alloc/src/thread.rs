//! The per-thread allocator instance, created on first use.

use crate::config::AllocatorConfig;
use crate::error::AllocError;
use crate::frame::CallSite;
use crate::stack::ScopedAllocator;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

thread_local! {
    static STACK: RefCell<Option<ScopedAllocator>> = const { RefCell::new(None) };
    static CONFIG: Cell<Option<AllocatorConfig>> = const { Cell::new(None) };
}

/// Runs `f` with this thread's allocator, creating it on first use.
///
/// `f` must not call back into this module.
pub fn with_stack<R>(f: impl FnOnce(&mut ScopedAllocator) -> R) -> Result<R, AllocError> {
    STACK.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| AllocError::Reentrant)?;
        let stack = match &mut *slot {
            Some(stack) => stack,
            empty => empty.insert(ScopedAllocator::new(CONFIG.with(Cell::get).unwrap_or_default())?),
        };
        Ok(f(stack))
    })
}

/// Replaces this thread's allocator configuration. An existing allocator is
/// dropped and recreated lazily, which is only allowed with no active frames.
pub fn configure(config: AllocatorConfig) -> Result<(), AllocError> {
    STACK.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| AllocError::Reentrant)?;
        if let Some(stack) = slot.as_ref() {
            if stack.depth() > 0 {
                return Err(AllocError::Busy { depth: stack.depth() });
            }
        }
        *slot = None;
        CONFIG.with(|c| c.set(Some(config)));
        Ok(())
    })
}

/// A frame of this thread's allocator, popped when dropped.
///
/// Not `Send`: the frame belongs to the thread's allocator.
#[derive(Debug)]
pub struct ThreadFrame {
    site: CallSite,
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl ThreadFrame {
    /// Depth of the allocator right after this frame was pushed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Reserves `size` bytes inside this thread's current frame.
    pub fn alloc(&self, size: usize, align: usize) -> Result<usize, AllocError> {
        with_stack(|stack| stack.alloc(size, align))?.map(|ptr| ptr.as_ptr() as usize)
    }

    pub fn calloc(&self, size: usize, align: usize) -> Result<usize, AllocError> {
        with_stack(|stack| stack.calloc(size, align))?.map(|ptr| ptr.as_ptr() as usize)
    }

    pub fn alloc_bytes(&self, bytes: &[u8], align: usize) -> Result<usize, AllocError> {
        with_stack(|stack| stack.alloc_bytes(bytes, align))?.map(|ptr| ptr.as_ptr() as usize)
    }
}

impl Drop for ThreadFrame {
    fn drop(&mut self) {
        let site = self.site;
        match with_stack(|stack| stack.pop_at(site)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) | Err(err) => log::error!("thread frame {}: {}", self.depth, err),
        }
    }
}

/// Pushes a frame on this thread's allocator.
#[track_caller]
pub fn push_frame() -> Result<ThreadFrame, AllocError> {
    let site = CallSite::caller();
    let depth = with_stack(|stack| stack.push_at(site))?;
    Ok(ThreadFrame { site, depth, _not_send: PhantomData })
}

/// Depth of this thread's allocator, zero if it was never used.
pub fn depth() -> usize {
    STACK.with(|cell| cell.try_borrow().ok().and_then(|slot| slot.as_ref().map(ScopedAllocator::depth)).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_nest_and_unwind() {
        configure(AllocatorConfig::default().with_region_size(1024)).unwrap();
        let start = with_stack(|s| s.pointer()).unwrap();
        {
            let outer = push_frame().unwrap();
            outer.alloc(100, 8).unwrap();
            {
                let inner = push_frame().unwrap();
                assert_eq!(inner.depth(), 2);
                inner.calloc(32, 16).unwrap();
            }
            assert_eq!(depth(), 1);
        }
        assert_eq!(depth(), 0);
        assert_eq!(with_stack(|s| s.pointer()).unwrap(), start);
    }

    #[test]
    fn reconfigure_is_refused_inside_a_frame() {
        let frame = push_frame().unwrap();
        assert_eq!(configure(AllocatorConfig::default()), Err(AllocError::Busy { depth: 1 }));
        drop(frame);
        assert!(configure(AllocatorConfig::default()).is_ok());
    }

    #[test]
    fn each_thread_has_its_own_allocator() {
        let here = with_stack(|s| s.base()).unwrap();
        let there = std::thread::spawn(|| with_stack(|s| s.base()).unwrap()).join().unwrap();
        assert_ne!(here, there);
    }
}
