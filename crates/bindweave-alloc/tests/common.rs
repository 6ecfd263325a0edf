// Helpers living in a different source file than the tests, so frames they
// pop count as popped from another call site.

use bindweave_alloc::{AllocError, ScopedAllocator};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pop_elsewhere(stack: &mut ScopedAllocator) -> Result<(), AllocError> {
    stack.pop()
}
