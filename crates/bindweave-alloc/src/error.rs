use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("scoped allocator out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("frame pop without a matching push")]
    FrameUnderflow,

    #[error("alignment {align} is not a power of two")]
    InvalidAlignment { align: usize },

    #[error("could not reserve a backing region of {size} bytes")]
    Region { size: usize },

    #[error("the thread's allocator is already borrowed")]
    Reentrant,

    #[error("cannot reconfigure the thread's allocator while {depth} frame(s) are active")]
    Busy { depth: usize },
}
