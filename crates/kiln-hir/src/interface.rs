// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Signatures a module publishes to the rest of a build.

use kiln_types::TypeExpr;
use serde::{Deserialize, Serialize};

use crate::program::HirProgram;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedFunction {
    pub name: String,
    pub params: Vec<TypeExpr>,
    pub ret: TypeExpr,
}

/// Read-only view of a compiled module: name and exported signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInterface {
    pub module: String,
    pub functions: Vec<ExportedFunction>,
}

impl ModuleInterface {
    /// Collects every exported group, lifetimes erased.
    pub fn of(program: &HirProgram) -> Self {
        let functions = program
            .groups()
            .iter()
            .filter(|g| g.is_exported())
            .map(|g| ExportedFunction {
                name: g.name.clone(),
                params: g.params.iter().map(TypeExpr::erase_lifetimes).collect(),
                ret: g.ret.erase_lifetimes(),
            })
            .collect();
        Self { module: program.module.clone(), functions }
    }

    pub fn function(&self, name: &str) -> Option<&ExportedFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_serializes_as_json() {
        let iface = ModuleInterface {
            module: "geometry".into(),
            functions: vec![ExportedFunction {
                name: "area".into(),
                params: vec![TypeExpr::pointer(false, TypeExpr::named("Shape"))],
                ret: TypeExpr::Stack(kiln_types::StackKind::F32),
            }],
        };
        let json = serde_json::to_string(&iface).unwrap();
        let back: ModuleInterface = serde_json::from_str(&json).unwrap();
        assert_eq!(back, iface);
        assert!(back.function("area").is_some());
        assert!(back.function("perimeter").is_none());
    }
}
