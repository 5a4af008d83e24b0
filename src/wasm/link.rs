//! Allocator linking.
//!
//! Non-freestanding builds carry an `mspace`-style allocator. It is
//! bundled as WebAssembly text (`lib/allocator.wat`), assembled with `wat`
//! and read with `wasmparser`; its function bodies are copied into the
//! output module byte-for-byte as raw code entries. The bodies are
//! position independent (no calls, no global references), so no index
//! rewriting is needed; only the type and export sections are decoded.
//!
//! The `mspace_*` entry points are registered under their export names but
//! are never re-exported; the compiler wraps them as `malloc`/`free`.

use anyhow::{Result, bail};
use std::collections::HashMap;
use wasmparser::{CompositeInnerType, ExternalKind, Parser, Payload, TypeRef};

use super::{Body, Function, Module, ValType};

/// WebAssembly text of the bundled allocator.
pub const ALLOCATOR_WAT: &str = include_str!("../../lib/allocator.wat");

pub const MSPACE_INIT: &str = "mspace_init";
pub const MSPACE_MALLOC: &str = "mspace_malloc";
pub const MSPACE_FREE: &str = "mspace_free";

/// Assemble the bundled allocator and add its functions to `module`.
///
/// Functions become defined functions of the output module, named after
/// their allocator exports (helpers without an export would be named
/// `.alloc.N`). Nothing is exported.
pub fn link_allocator(module: &mut Module) -> Result<()> {
    let bytes = wat::parse_str(ALLOCATOR_WAT)?;

    let mut signatures: Vec<(Vec<ValType>, Vec<ValType>)> = Vec::new();
    let mut function_types: Vec<u32> = Vec::new();
    let mut export_names: HashMap<u32, String> = HashMap::new();
    let mut bodies: Vec<Vec<u8>> = Vec::new();

    for payload in Parser::new(0).parse_all(&bytes) {
        match payload? {
            Payload::TypeSection(reader) => {
                for group in reader {
                    for sub in group?.into_types() {
                        match &sub.composite_type.inner {
                            CompositeInnerType::Func(func) => {
                                let params = func
                                    .params()
                                    .iter()
                                    .map(|t| convert_val_type(*t))
                                    .collect::<Result<Vec<_>>>()?;
                                let results = func
                                    .results()
                                    .iter()
                                    .map(|t| convert_val_type(*t))
                                    .collect::<Result<Vec<_>>>()?;
                                signatures.push((params, results));
                            }
                            _ => bail!("allocator module contains a non-function type"),
                        }
                    }
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    // Memory imports are fine (the output module provides
                    // memory index 0); function imports would shift the
                    // index space under the raw bodies.
                    if matches!(import.ty, TypeRef::Func(_)) {
                        bail!("allocator module must not import functions");
                    }
                }
            }
            Payload::FunctionSection(reader) => {
                for ty in reader {
                    function_types.push(ty?);
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    if export.kind == ExternalKind::Func {
                        export_names.insert(export.index, export.name.to_string());
                    }
                }
            }
            Payload::CodeSectionEntry(body) => {
                let range = body.range();
                bodies.push(bytes[range.start..range.end].to_vec());
            }
            _ => {}
        }
    }

    if bodies.len() != function_types.len() {
        bail!("allocator module has a malformed code section");
    }

    for (index, (type_index, body)) in function_types.iter().zip(bodies).enumerate() {
        let (params, results) = signatures
            .get(*type_index as usize)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("allocator function references a missing type"))?;
        let sig = module.add_signature(params, results);
        let name = export_names
            .get(&(index as u32))
            .cloned()
            .unwrap_or_else(|| format!(".alloc.{}", index));
        module.add_function(Function {
            name,
            sig,
            locals: Vec::new(),
            body: Body::Raw(body),
        });
    }

    for required in [MSPACE_INIT, MSPACE_MALLOC, MSPACE_FREE] {
        if module.function(required).is_none() {
            bail!("allocator module does not export '{}'", required);
        }
    }

    Ok(())
}

fn convert_val_type(ty: wasmparser::ValType) -> Result<ValType> {
    Ok(match ty {
        wasmparser::ValType::I32 => ValType::I32,
        wasmparser::ValType::I64 => ValType::I64,
        wasmparser::ValType::F32 => ValType::F32,
        wasmparser::ValType::F64 => ValType::F64,
        other => bail!("allocator module uses unsupported value type {:?}", other),
    })
}
