// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Multi-module builds.
//!
//! Modules are grouped into levels: a module's imports all sit in earlier
//! levels. Each level compiles in parallel, and a module only sees the
//! interfaces of the modules it imports.

use std::collections::{BTreeSet, HashMap};

use kiln_ast::{ItemKind, Module};
use kiln_hir::ModuleInterface;
use rayon::prelude::*;

use crate::error::BuildError;
use crate::options::CompileOptions;
use crate::session::{CompiledModule, Session};

/// Compiles every module of a build. Results come back in input order.
pub fn compile_build(modules: Vec<Module>, options: CompileOptions) -> Result<Vec<CompiledModule>, BuildError> {
    let _span = tracing::debug_span!("build", modules = modules.len()).entered();

    let mut index = HashMap::new();
    for (i, m) in modules.iter().enumerate() {
        if index.insert(m.name.clone(), i).is_some() {
            return Err(BuildError::DuplicateModule(m.name.clone()));
        }
    }
    let deps = modules
        .iter()
        .map(|m| {
            imports_of(m)
                .into_iter()
                .map(|import| {
                    index.get(&import).copied().ok_or_else(|| BuildError::UnknownImport {
                        module: m.name.clone(),
                        import,
                    })
                })
                .collect::<Result<BTreeSet<usize>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let levels = levels(&deps).map_err(|stuck| BuildError::ImportCycle {
        modules: stuck.iter().map(|&i| modules[i].name.clone()).collect(),
    })?;

    let mut pending: Vec<Option<Module>> = modules.into_iter().map(Some).collect();
    let mut done: Vec<Option<CompiledModule>> = vec![None; pending.len()];
    for (depth, level) in levels.iter().enumerate() {
        tracing::debug!(depth, modules = level.len(), "level");
        let jobs: Vec<(Module, Vec<ModuleInterface>)> = level
            .iter()
            .filter_map(|&i| {
                let imports =
                    deps[i].iter().filter_map(|&d| done[d].as_ref()).map(|c| c.interface.clone()).collect();
                pending[i].take().map(|m| (m, imports))
            })
            .collect();
        let results: Vec<_> = jobs
            .into_par_iter()
            .map(|(module, imports)| {
                let name = module.name.clone();
                Session::new(module, imports, options).compile().map_err(|source| BuildError::Module {
                    module: name,
                    source,
                })
            })
            .collect();
        for (&i, result) in level.iter().zip(results) {
            done[i] = Some(result?);
        }
    }
    Ok(done.into_iter().flatten().collect())
}

/// Modules named by the import declarations of `module`.
fn imports_of(module: &Module) -> BTreeSet<String> {
    module
        .items
        .iter()
        .filter_map(|item| match &item.kind {
            ItemKind::Import(decl) => Some(decl.module.clone()),
            _ => None,
        })
        .collect()
}

/// Splits module indices into dependency levels, each sorted. On a cycle,
/// returns the modules that could not be placed.
fn levels(deps: &[BTreeSet<usize>]) -> Result<Vec<Vec<usize>>, Vec<usize>> {
    let mut level_of: Vec<Option<usize>> = vec![None; deps.len()];
    let mut levels: Vec<Vec<usize>> = Vec::new();
    loop {
        let ready: Vec<usize> = (0..deps.len())
            .filter(|&i| level_of[i].is_none())
            .filter(|&i| deps[i].iter().all(|&d| level_of[d].is_some()))
            .collect();
        if ready.is_empty() {
            break;
        }
        for &i in &ready {
            level_of[i] = Some(levels.len());
        }
        levels.push(ready);
    }
    let stuck: Vec<usize> = (0..deps.len()).filter(|&i| level_of[i].is_none()).collect();
    if stuck.is_empty() {
        Ok(levels)
    } else {
        Err(stuck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(edges: &[&[usize]]) -> Vec<BTreeSet<usize>> {
        edges.iter().map(|e| e.iter().copied().collect()).collect()
    }

    #[test]
    fn modules_wait_for_their_imports() {
        // 0 <- 1 <- 2, and 3 stands alone.
        let levels = levels(&deps(&[&[], &[0], &[1, 0], &[]])).unwrap();
        assert_eq!(levels, vec![vec![0, 3], vec![1], vec![2]]);
    }

    #[test]
    fn cycles_leave_modules_unplaced() {
        let stuck = levels(&deps(&[&[], &[2], &[1], &[2]])).unwrap_err();
        assert_eq!(stuck, vec![1, 2, 3]);
    }
}
