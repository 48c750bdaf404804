// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! One module's trip through the pipeline.

use kiln_ast::Module;
use kiln_hir::ModuleInterface;
use kiln_ir::IrProgram;

use crate::error::CompileError;
use crate::options::CompileOptions;

/// Owns all state for compiling one module. Nothing is shared with other
/// sessions except the read-only interfaces handed in as imports.
pub struct Session {
    module: Module,
    imports: Vec<ModuleInterface>,
    options: CompileOptions,
}

#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub ir: IrProgram,
    /// Exported signatures, for modules that import this one.
    pub interface: ModuleInterface,
}

impl CompiledModule {
    pub fn name(&self) -> &str {
        &self.interface.module
    }
}

impl Session {
    pub fn new(module: Module, imports: Vec<ModuleInterface>, options: CompileOptions) -> Self {
        Self { module, imports, options }
    }

    pub fn compile(self) -> Result<CompiledModule, CompileError> {
        let _span = tracing::debug_span!("compile", module = %self.module.name).entered();

        let program = kiln_dispatch::resolve_module(&self.module, &self.imports)?;
        let report = kiln_borrow::check_program(&program)?;
        let program = kiln_lift::lift_program(program, &report)?;
        let inlined = kiln_inline::inline_program(program, self.options.liberal)?;
        // Specialized copies take new borrow parameters.
        let report = kiln_borrow::check_program(&inlined.program)?;
        let ir = kiln_ir::lower_program(&inlined.program, &report)?;

        let interface = ModuleInterface::of(&inlined.program);
        tracing::debug!(
            functions = ir.functions.len(),
            exports = interface.functions.len(),
            indirect = ir.indirect.len(),
            "compiled"
        );
        Ok(CompiledModule { ir, interface })
    }
}
