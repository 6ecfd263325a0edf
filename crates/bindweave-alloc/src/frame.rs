use std::fmt;
use std::panic::Location;

/// Identity of the code that pushed or popped a frame.
///
/// Sites are equal when they share file, line and column. Frame guards pop
/// with the site that pushed them, so any other site is a mismatch.
#[derive(Clone, Copy)]
pub struct CallSite(&'static Location<'static>);

impl CallSite {
    #[track_caller]
    pub fn caller() -> Self {
        CallSite(Location::caller())
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.0
    }

    /// Manual push/pop pairs sit on different lines, so they only share a file.
    pub fn same_file(&self, other: &CallSite) -> bool {
        self.0.file() == other.0.file()
    }
}

impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.0.file() == other.0.file() && self.0.line() == other.0.line() && self.0.column() == other.0.column()
    }
}

impl Eq for CallSite {}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.file(), self.0.line())
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameRecord {
    pub pointer: usize,
    pub site: Option<CallSite>,
}

/// Saved pointers of the active frames.
///
/// Capacity grows by half again whenever a push would exceed it. Records are
/// addressed by depth, so growth never invalidates a pushed frame.
#[derive(Debug)]
pub(crate) struct FrameStack {
    records: Vec<FrameRecord>,
}

impl FrameStack {
    pub fn with_capacity(capacity: usize) -> Self {
        FrameStack { records: Vec::with_capacity(capacity.max(1)) }
    }

    pub fn depth(&self) -> usize {
        self.records.len()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    pub fn push(&mut self, record: FrameRecord) {
        let capacity = self.records.capacity();
        if self.records.len() == capacity {
            let grown = (capacity + capacity / 2).max(capacity + 1);
            self.records.reserve_exact(grown - self.records.len());
            log::trace!("frame stack grown to {} records", self.records.capacity());
        }
        self.records.push(record);
    }

    pub fn pop(&mut self) -> Option<FrameRecord> {
        self.records.pop()
    }
}
