mod common;

use bindweave_alloc::{AllocError, AllocatorConfig, ScopedAllocator};

fn allocator() -> ScopedAllocator {
    ScopedAllocator::new(AllocatorConfig::default().with_region_size(4096).with_debug(true)).unwrap()
}

#[test]
fn every_pop_restores_its_push() {
    common::init_logging();
    let mut stack = allocator();
    // Push/alloc/pop script: positive = push then allocate n bytes, 0 = pop
    let script = [16, 3, 0, 40, 7, 1, 0, 0, 0, 100, 0, 0];
    let mut saved = Vec::new();
    for step in script {
        if step == 0 {
            let expected = saved.pop().unwrap();
            stack.pop().unwrap();
            assert_eq!(stack.pointer(), expected);
        } else {
            saved.push(stack.pointer());
            stack.push();
            stack.alloc(step, 8).unwrap();
        }
    }
    assert_eq!(stack.depth(), 0);
    assert_eq!(stack.pointer(), stack.top());
    assert_eq!(stack.pop(), Err(AllocError::FrameUnderflow));
}

#[test]
fn asymmetric_pop_only_warns() {
    common::init_logging();
    let mut stack = allocator();
    let before = stack.pointer();
    stack.push();
    stack.alloc(64, 16).unwrap();
    common::pop_elsewhere(&mut stack).unwrap();
    assert_eq!(stack.pointer(), before);
    assert_eq!(stack.asymmetric_pops(), 1);

    stack.push();
    stack.pop().unwrap();
    assert_eq!(stack.asymmetric_pops(), 1);
}

#[test]
fn guards_detect_stray_pushes_in_the_same_file() {
    common::init_logging();
    let mut stack = allocator();
    let before = stack.pointer();
    {
        let mut frame = stack.frame();
        frame.alloc(32, 8).unwrap();
        // Left unpopped, so the guard pops this frame instead.
        frame.push();
    }
    assert_eq!(stack.asymmetric_pops(), 1);
    assert_eq!(stack.depth(), 1);
    stack.pop_at(bindweave_alloc::CallSite::caller()).unwrap();
    assert_eq!(stack.pointer(), before);
    assert_eq!(stack.asymmetric_pops(), 2);
}

#[test]
fn deep_nesting_grows_the_frame_stack() {
    let mut stack = ScopedAllocator::new(AllocatorConfig { initial_frame_capacity: 2, ..Default::default() }).unwrap();
    let mut pointers = Vec::new();
    for _ in 0..50 {
        pointers.push(stack.pointer());
        stack.push();
        stack.alloc(8, 8).unwrap();
    }
    assert!(stack.frame_capacity() >= 50);
    while let Some(expected) = pointers.pop() {
        stack.pop().unwrap();
        assert_eq!(stack.pointer(), expected);
    }
}

#[test]
fn allocations_never_leave_the_region() {
    let mut stack = allocator();
    let mut total = 0;
    loop {
        match stack.alloc(24, 8) {
            Ok(ptr) => {
                let addr = ptr.as_ptr() as usize;
                assert!(addr >= stack.base() && addr + 24 <= stack.top());
                total += 1;
            }
            Err(AllocError::OutOfMemory { requested: 24, available }) => {
                assert!(available < 24 + 8);
                break;
            }
            Err(other) => panic!("unexpected {other}"),
        }
    }
    assert!(total >= 4096 / 32);
}
