//! Alignment, flatness and bulk-copy field groups.
//!
//! None of this affects the wire format, which is always packed in declaration order.
//! A type is *flat* when a native struct with natural alignment has exactly the packed
//! wire layout, so it can be copied in one go. Struct fields are split into groups that
//! can each be copied as one block.

use crate::error::ResolutionError;
use crate::external::ExternalRegistry;
use crate::model::{ScalarKind, TypeDef, TypeKind, TypeMap, SIZE_TYPE};
use std::collections::HashMap;

/// Alignment of the `uint32` length prefix.
pub const SIZE_ALIGNMENT: usize = 4;

/// Layout facts of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLayout {
    pub alignment: usize,
    /// Static encoded size, `None` for variable length.
    pub size: Option<usize>,
    pub flat: bool,
}

/// Consecutive struct fields that may be copied as one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldGroup {
    pub fields: Vec<String>,
    /// Sum of the field sizes, `None` if any is variable.
    pub size: Option<usize>,
    pub flat: bool,
}

/// Memoizing layout calculator over a resolved [`TypeMap`].
pub struct LayoutPlanner<'a> {
    types: &'a TypeMap,
    externals: &'a ExternalRegistry,
    memo: HashMap<String, TypeLayout>,
}

impl<'a> LayoutPlanner<'a> {
    /// `types` must be acyclic, as produced by [`TypeMap::resolve`].
    pub fn new(types: &'a TypeMap, externals: &'a ExternalRegistry) -> Self {
        LayoutPlanner { types, externals, memo: HashMap::new() }
    }

    pub fn alignment(&mut self, name: &str) -> Result<usize, ResolutionError> {
        Ok(self.layout(name)?.alignment)
    }

    pub fn is_flat(&mut self, name: &str) -> Result<bool, ResolutionError> {
        Ok(self.layout(name)?.flat)
    }

    pub fn layout(&mut self, name: &str) -> Result<TypeLayout, ResolutionError> {
        let def = self.def(name, name)?;
        self.layout_of(def)
    }

    /// Bulk-copy groups of a struct's fields; empty for other types and for empty structs.
    pub fn field_groups(&mut self, name: &str) -> Result<Vec<FieldGroup>, ResolutionError> {
        let def = self.def(name, name)?;
        let mut groups: Vec<FieldGroup> = Vec::new();
        for field in def.fields() {
            let field_def = self.def(&field.type_name, name)?;
            let layout = self.layout_of(field_def)?;
            let start_new = match groups.last() {
                None => true,
                Some(g) => {
                    !g.flat
                        || !layout.flat
                        || match (g.size, layout.size) {
                            (Some(gs), Some(fs)) => {
                                gs % layout.alignment != 0 || fs % layout.alignment != 0
                            }
                            _ => true,
                        }
                }
            };
            if start_new {
                groups.push(FieldGroup { fields: Vec::new(), size: Some(0), flat: true });
            }
            if let Some(group) = groups.last_mut() {
                group.fields.push(field.name.clone());
                group.size = group.size.zip(layout.size).map(|(a, b)| a + b);
                group.flat &= layout.flat;
            }
        }
        Ok(groups)
    }

    fn def(&self, name: &str, referenced_by: &str) -> Result<&'a TypeDef, ResolutionError> {
        self.types.get(name).ok_or_else(|| ResolutionError {
            missing: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }

    fn layout_of(&mut self, def: &'a TypeDef) -> Result<TypeLayout, ResolutionError> {
        if let Some(layout) = self.memo.get(&def.name) {
            return Ok(*layout);
        }
        let layout = match &def.kind {
            TypeKind::Scalar(k) => fixed(k.size()),
            TypeKind::Enum { base_type, .. } | TypeKind::Bitset { base_type, .. } => fixed(base_type.size()),
            TypeKind::Decimal => fixed(8),
            TypeKind::String | TypeKind::Bytes => variable(size_type_alignment()),
            TypeKind::Vector { element_type } => {
                let elem = self.dep_layout(element_type, &def.name)?;
                variable(size_type_alignment().max(elem.alignment))
            }
            TypeKind::Map { key_type, value_type } => {
                let key = self.dep_layout(key_type, &def.name)?;
                let value = self.dep_layout(value_type, &def.name)?;
                variable(size_type_alignment().max(key.alignment).max(value.alignment))
            }
            TypeKind::Array { element_type, array_size } => {
                let elem = self.dep_layout(element_type, &def.name)?;
                let size = elem.size.map(|s| s * array_size);
                let flat = elem.size.is_some_and(|s| s % elem.alignment == 0);
                TypeLayout { alignment: elem.alignment, size, flat }
            }
            TypeKind::Struct { fields } => {
                let mut alignment = 1;
                for field in fields {
                    alignment = alignment.max(self.dep_layout(&field.type_name, &def.name)?.alignment);
                }
                let groups = self.field_groups(&def.name)?;
                let flat = match groups.as_slice() {
                    [] => true,
                    [only] => only.flat && only.size.is_some(),
                    _ => false,
                };
                TypeLayout { alignment, size: def.size, flat: flat && def.size.is_some() }
            }
            TypeKind::External => TypeLayout {
                alignment: self.externals.alignment(&def.name),
                size: def.size,
                flat: false,
            },
        };
        self.memo.insert(def.name.clone(), layout);
        Ok(layout)
    }

    fn dep_layout(&mut self, name: &str, referenced_by: &str) -> Result<TypeLayout, ResolutionError> {
        let def = self.def(name, referenced_by)?;
        self.layout_of(def)
    }
}

fn fixed(size: usize) -> TypeLayout {
    TypeLayout { alignment: size, size: Some(size), flat: true }
}

fn variable(alignment: usize) -> TypeLayout {
    TypeLayout { alignment, size: None, flat: false }
}

fn size_type_alignment() -> usize {
    ScalarKind::from_name(SIZE_TYPE).map(|k| k.size()).unwrap_or(SIZE_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawField, RawType};
    use std::collections::BTreeMap;

    fn resolve(entries: Vec<(&str, Vec<(&str, &str)>)>) -> TypeMap {
        let raw: BTreeMap<String, RawType> = entries
            .into_iter()
            .map(|(name, fields)| {
                let fields = fields.into_iter().map(|(n, t)| RawField::new(n, t)).collect();
                (name.to_string(), RawType::structure(fields))
            })
            .collect();
        TypeMap::resolve(&raw).unwrap()
    }

    fn group_names(groups: &[FieldGroup]) -> Vec<Vec<&str>> {
        groups.iter().map(|g| g.fields.iter().map(String::as_str).collect()).collect()
    }

    #[test]
    fn scalar_and_container_alignment() {
        let types = resolve(vec![("s", vec![("a", "uint8{int64}"), ("b", "int16[]"), ("c", "string")])]);
        let externals = ExternalRegistry::new();
        let mut planner = LayoutPlanner::new(&types, &externals);
        assert_eq!(planner.alignment("int16").unwrap(), 2);
        assert_eq!(planner.alignment("uint8{int64}").unwrap(), 8);
        assert_eq!(planner.alignment("int16[]").unwrap(), 4);
        assert_eq!(planner.alignment("string").unwrap(), 4);
        assert_eq!(planner.alignment("s").unwrap(), 8);
        assert!(!planner.is_flat("int16[]").unwrap());
        assert!(!planner.is_flat("s").unwrap());
    }

    #[test]
    fn aligned_struct_is_one_flat_group() {
        let types = resolve(vec![("p", vec![("a", "uint64"), ("b", "uint32"), ("c", "uint16"), ("d", "uint8"), ("e", "uint8")])]);
        let externals = ExternalRegistry::new();
        let mut planner = LayoutPlanner::new(&types, &externals);
        let groups = planner.field_groups("p").unwrap();
        assert_eq!(group_names(&groups), vec![vec!["a", "b", "c", "d", "e"]]);
        assert_eq!(groups[0].size, Some(16));
        assert!(planner.is_flat("p").unwrap());
    }

    #[test]
    fn misaligned_field_starts_new_group() {
        let types = resolve(vec![("p", vec![("a", "uint8"), ("b", "uint32"), ("c", "uint8")])]);
        let externals = ExternalRegistry::new();
        let mut planner = LayoutPlanner::new(&types, &externals);
        let groups = planner.field_groups("p").unwrap();
        assert_eq!(group_names(&groups), vec![vec!["a"], vec!["b", "c"]]);
        assert!(!planner.is_flat("p").unwrap());
        assert_eq!(planner.layout("p").unwrap().size, Some(6));
    }

    #[test]
    fn variable_field_isolated() {
        let types = resolve(vec![("v", vec![("f0", "uint64"), ("f1_vec", "int64[]"), ("str", "string"), ("x", "uint32")])]);
        let externals = ExternalRegistry::new();
        let mut planner = LayoutPlanner::new(&types, &externals);
        let groups = planner.field_groups("v").unwrap();
        assert_eq!(group_names(&groups), vec![vec!["f0"], vec!["f1_vec"], vec!["str"], vec!["x"]]);
    }

    #[test]
    fn empty_struct_is_flat() {
        let types = resolve(vec![("empty", vec![])]);
        let externals = ExternalRegistry::new();
        let mut planner = LayoutPlanner::new(&types, &externals);
        assert_eq!(planner.layout("empty").unwrap(), TypeLayout { alignment: 1, size: Some(0), flat: true });
        assert!(planner.field_groups("empty").unwrap().is_empty());
    }

    #[test]
    fn array_flat_when_element_size_is_multiple_of_alignment() {
        let types = resolve(vec![
            ("padded", vec![("a", "uint8"), ("b", "uint32")]),
            ("elem", vec![("a", "uint8"), ("b", "uint32"), ("c", "uint8[3]")]),
            ("holder", vec![("x", "padded[2]"), ("y", "uint16[3]"), ("z", "elem[2]"), ("w", "string[2]")]),
        ]);
        let externals = ExternalRegistry::new();
        let mut planner = LayoutPlanner::new(&types, &externals);
        assert!(!planner.is_flat("padded[2]").unwrap());
        assert!(!planner.is_flat("elem").unwrap());
        assert_eq!(planner.layout("elem[2]").unwrap(), TypeLayout { alignment: 4, size: Some(16), flat: true });
        assert!(!planner.is_flat("string[2]").unwrap());
        assert!(planner.is_flat("uint16[3]").unwrap());
        assert_eq!(planner.layout("uint16[3]").unwrap().size, Some(6));
    }
}
