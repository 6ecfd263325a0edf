use crate::error::CallError;
use crate::interp::{Interpreter, MethodPlan};
use crate::runtime::Shared;
use crate::value::Value;
use bindweave_ir::SynthesizedStruct;
use bindweave_layout::{Carrier, NativeValue, StructLayout};
use bindweave_meta::QualifiedName;
use rustc_hash::FxHashMap;
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

struct AccessorPlans {
    getter: MethodPlan,
    setter: Option<MethodPlan>,
}

/// Layout and executable accessors of one declared struct.
pub(crate) struct StructType {
    pub layout: Arc<StructLayout>,
    pub synthesized: SynthesizedStruct,
    accessors: FxHashMap<String, AccessorPlans>,
}

impl StructType {
    pub fn new(layout: Arc<StructLayout>, synthesized: SynthesizedStruct) -> Self {
        let accessors = synthesized
            .accessors
            .iter()
            .map(|a| {
                let plans = AccessorPlans {
                    getter: MethodPlan::new(a.getter.clone()),
                    setter: a.setter.clone().map(MethodPlan::new),
                };
                (a.qualified_name.clone(), plans)
            })
            .collect();
        StructType { layout, synthesized, accessors }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.layout.name
    }

    pub fn plans(&self) -> impl Iterator<Item = &MethodPlan> {
        self.accessors.values().flat_map(|a| std::iter::once(&a.getter).chain(a.setter.as_ref()))
    }

    fn accessor(&self, field: &str) -> Result<&AccessorPlans, CallError> {
        self.accessors
            .get(field)
            .ok_or_else(|| CallError::UnknownType { kind: "field", name: format!("{}.{}", self.name(), field) })
    }
}

/// Zeroed host-owned memory backing allocated struct values.
pub(crate) struct Region {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the region is plain bytes, and access goes through raw addresses.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    fn zeroed(size: usize, align: usize) -> Result<Region, CallError> {
        let layout = Layout::from_size_align(size.max(1), align.max(1)).map_err(|e| CallError::custom(e.to_string()))?;
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Region { ptr, layout }),
            None => alloc::handle_alloc_error(layout),
        }
    }

    fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// A view of one struct, or of a contiguous array of them, in native memory.
///
/// Views returned by native code alias that memory. Values from
/// [`Runtime::alloc_struct`](crate::Runtime::alloc_struct) or decoded from
/// bytes own their memory, shared between clones and slices.
#[derive(Clone)]
pub struct StructValue {
    shared: Arc<Shared>,
    ty: Arc<StructType>,
    base: usize,
    count: Option<usize>,
    owner: Option<Arc<Region>>,
}

impl StructValue {
    pub(crate) fn alloc(shared: &Arc<Shared>, ty: &Arc<StructType>, count: usize) -> Result<Self, CallError> {
        let region = Region::zeroed(ty.layout.stride() * count, ty.layout.align)?;
        Ok(StructValue {
            shared: Arc::clone(shared),
            ty: Arc::clone(ty),
            base: region.address(),
            count: Some(count),
            owner: Some(Arc::new(region)),
        })
    }

    /// # Safety
    ///
    /// `base` must point to `count` instances of the struct (one when
    /// `None`) that stay valid while the view is used.
    pub(crate) unsafe fn view(shared: &Arc<Shared>, ty: &Arc<StructType>, base: usize, count: Option<usize>) -> Self {
        StructValue { shared: Arc::clone(shared), ty: Arc::clone(ty), base, count, owner: None }
    }

    pub(crate) fn from_bytes(shared: &Arc<Shared>, ty: &Arc<StructType>, bytes: &[u8]) -> Result<Self, CallError> {
        if bytes.len() != ty.layout.size {
            return Err(CallError::mismatch(format!("{} bytes", ty.layout.size), format!("{} bytes", bytes.len())));
        }
        let value = Self::alloc(shared, ty, 1)?;
        // SAFETY: the fresh region holds exactly `bytes.len()` bytes.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), value.base as *mut u8, bytes.len()) };
        Ok(value)
    }

    pub fn type_name(&self) -> &QualifiedName {
        self.ty.name()
    }

    pub fn address(&self) -> usize {
        self.base
    }

    /// Number of structs this view covers, when known.
    pub fn len(&self) -> Option<usize> {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == Some(0)
    }

    pub fn size(&self) -> usize {
        self.ty.layout.size
    }

    pub fn stride(&self) -> usize {
        self.ty.layout.stride()
    }

    /// True when the memory is host-owned rather than borrowed from native code.
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Dotted names of every field accessor.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.ty.synthesized.accessors.iter().map(|a| a.qualified_name.as_str())
    }

    /// The struct at `index` of this array, addressed in place.
    pub fn slice(&self, index: usize) -> Result<StructValue, CallError> {
        if let Some(count) = self.count {
            if index >= count {
                return Err(self.out_of_bounds(index, count));
            }
        }
        Ok(StructValue {
            shared: Arc::clone(&self.shared),
            ty: Arc::clone(&self.ty),
            base: self.base + index * self.stride(),
            count: self.count.map(|count| count - index),
            owner: self.owner.clone(),
        })
    }

    pub fn get(&self, field: &str) -> Result<Value, CallError> {
        self.get_indexed(field, &[])
    }

    /// Reads a field nested in inline arrays, one index per array level.
    pub fn get_indexed(&self, field: &str, indices: &[usize]) -> Result<Value, CallError> {
        let plan = &self.ty.accessor(field)?.getter;
        self.check_first()?;
        Interpreter::new(&self.shared, None).run(plan, self.accessor_args(indices))
    }

    /// `field` of the struct at `index`.
    pub fn get_at(&self, index: usize, field: &str) -> Result<Value, CallError> {
        self.slice(index)?.get(field)
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), CallError> {
        self.set_indexed(field, &[], value)
    }

    pub fn set_indexed(&self, field: &str, indices: &[usize], value: impl Into<Value>) -> Result<(), CallError> {
        let accessor = self.ty.accessor(field)?;
        let plan = accessor.setter.as_ref().ok_or_else(|| CallError::NotAccessible {
            method: format!("set_{}", accessor.getter.name()),
            access: "read-only".to_string(),
        })?;
        self.check_first()?;
        let mut args = self.accessor_args(indices);
        args.push(value.into());
        Interpreter::new(&self.shared, None).run(plan, args)?;
        Ok(())
    }

    /// Reads a raw carrier at a byte offset from the start of this view.
    pub fn load(&self, offset: usize, carrier: &Carrier) -> Result<NativeValue, CallError> {
        let extent = self.count.unwrap_or(1) * self.stride();
        if offset + carrier.size() > extent {
            return Err(self.out_of_bounds(offset, extent));
        }
        // SAFETY: bounds-checked against the memory this view covers.
        Ok(unsafe { NativeValue::read(carrier, self.base + offset) })
    }

    /// Copy of the bytes of the first struct in this view.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CallError> {
        self.check_first()?;
        let mut bytes = vec![0u8; self.size()];
        // SAFETY: the view covers at least one struct.
        unsafe { std::ptr::copy_nonoverlapping(self.base as *const u8, bytes.as_mut_ptr(), bytes.len()) };
        Ok(bytes)
    }

    /// Empty arrays have no first struct to read or write.
    fn check_first(&self) -> Result<(), CallError> {
        if self.is_empty() {
            return Err(self.out_of_bounds(0, 0));
        }
        Ok(())
    }

    fn accessor_args(&self, indices: &[usize]) -> Vec<Value> {
        let mut args = Vec::with_capacity(indices.len() + 2);
        args.push(Value::Struct(self.clone()));
        args.extend(indices.iter().map(|&i| Value::Native(NativeValue::I32(i as i32))));
        args
    }

    fn out_of_bounds(&self, index: usize, length: usize) -> CallError {
        CallError::IndexOutOfBounds { target: self.type_name().to_string(), index: index as i64, length }
    }
}

impl fmt::Debug for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructValue")
            .field("ty", &self.type_name().to_string())
            .field("base", &format_args!("{:#x}", self.base))
            .field("count", &self.count)
            .field("owned", &self.is_owned())
            .finish()
    }
}
