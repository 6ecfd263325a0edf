use crate::error::NativeError;
use cranelift_codegen::ir::{Function, Signature, UserFuncName};
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module};
use std::sync::Arc;

/// One JIT module that accumulates glue functions for the lifetime of the
/// process. Compiled code is never freed.
pub(crate) struct Jit {
    module: JITModule,
    isa: Arc<dyn TargetIsa>,
    ctx: Context,
    compiled: usize,
}

// SAFETY: the module is only reached through the owning mutex, and the code
// it has emitted stays mapped until the process exits.
unsafe impl Send for Jit {}

impl Jit {
    pub fn new() -> Result<Self, NativeError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false")?;
        flag_builder.set("is_pic", "false")?;
        #[cfg(debug_assertions)]
        flag_builder.set("enable_verifier", "true")?;
        flag_builder.set("opt_level", "speed")?;
        let flags = settings::Flags::new(flag_builder);

        let isa_builder = cranelift_native::builder()
            .map_err(|e| NativeError::IsaSetupError(format!("Host target lookup failed: {}", e)))?;
        let isa = isa_builder
            .finish(flags)
            .map_err(|e| NativeError::IsaSetupError(format!("ISA construction failed: {}", e)))?;

        let builder = JITBuilder::with_isa(isa.clone(), default_libcall_names());
        let module = JITModule::new(builder);
        let ctx = module.make_context();
        log::debug!("native call JIT ready for {}", isa.triple());
        Ok(Jit { module, isa, ctx, compiled: 0 })
    }

    pub fn isa(&self) -> &dyn TargetIsa {
        self.isa.as_ref()
    }

    /// Number of functions compiled so far.
    pub fn compiled(&self) -> usize {
        self.compiled
    }

    /// Declares an anonymous function with `signature`, lets `build` fill in
    /// its body and returns the address of the finalized code.
    pub fn compile<F>(&mut self, signature: Signature, build: F) -> Result<*const u8, NativeError>
    where
        F: FnOnce(&mut FunctionBuilder<'_>, &dyn TargetIsa) -> Result<(), NativeError>,
    {
        let func_id = self.module.declare_anonymous_function(&signature)?;
        let mut func = Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), signature);
        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut func, &mut builder_ctx);
            build(&mut builder, self.isa.as_ref())?;
            builder.seal_all_blocks();
            builder.finalize();
        }
        log::trace!("glue function {}:\n{}", func_id, func);

        self.ctx.func = func;
        let defined = self.module.define_function(func_id, &mut self.ctx);
        self.module.clear_context(&mut self.ctx);
        defined?;
        self.module.finalize_definitions()?;
        self.compiled += 1;
        Ok(self.module.get_finalized_function(func_id))
    }
}
