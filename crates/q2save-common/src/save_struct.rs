// save_struct.rs — struct schemas and the schema registry

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Write as _;

use crate::save_error::SaveError;
use crate::save_type::{IsEmptyFn, SaveKind, SaveType, SaveTypeDeducer};

pub type FieldGet = for<'a> fn(&'a dyn Any) -> Option<&'a dyn Any>;
pub type FieldGetMut = for<'a> fn(&'a mut dyn Any) -> Option<&'a mut dyn Any>;

/// One persisted field: its document name, how to reach it inside an owner
/// value, and how it is stored.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub get: FieldGet,
    pub get_mut: FieldGetMut,
    pub ty: SaveType,
}

impl FieldDescriptor {
    /// Builds a descriptor whose type is deduced from the projection.
    /// Used by `field!`; the projection is never called.
    pub fn deduce<O: Any, F: SaveTypeDeducer>(
        name: &'static str,
        _project: fn(&O) -> &F,
        get: FieldGet,
        get_mut: FieldGetMut,
    ) -> Self {
        FieldDescriptor { name, get, get_mut, ty: F::save_type() }
    }

    pub fn with_is_empty(mut self, is_empty: IsEmptyFn) -> Self {
        self.ty = self.ty.with_is_empty(is_empty);
        self
    }

    pub fn never_empty(mut self) -> Self {
        self.ty = self.ty.never_empty();
        self
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor").field("name", &self.name).field("ty", &self.ty).finish()
    }
}

/// Ordered fields of one persisted struct.
#[derive(Debug)]
pub struct StructDescriptor {
    pub name: &'static str,
    pub fields: Vec<FieldDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl StructDescriptor {
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            index.entry(f.name).or_insert(i);
        }
        StructDescriptor { name, fields, index }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Field names must be unique.
    pub fn validate(&self) -> Result<(), SaveError> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for f in &self.fields {
            if !seen.insert(f.name) {
                return Err(SaveError::registration(format!(
                    "struct {} has more than one field named \"{}\"",
                    self.name, f.name
                )));
            }
        }
        Ok(())
    }

    /// Field listing for diagnostics.
    pub fn debug(&self) -> String {
        let mut out = format!("{}\n", self.name);
        for f in &self.fields {
            let _ = writeln!(out, "  {}: {}", f.name, f.ty.describe());
        }
        out
    }
}

/// A struct with a schema.
pub trait SaveStruct: Any {
    fn save_struct() -> &'static StructDescriptor;
}

/// Declares the schema of a struct.
///
/// ```ignore
/// save_struct!(MoveInfo {
///     field!("start_origin", MoveInfo, start_origin),
///     field!("speed", MoveInfo, speed),
/// });
/// ```
#[macro_export]
macro_rules! save_struct {
    ($ty:ident { $($field:expr),* $(,)? }) => {
        impl $crate::save_struct::SaveStruct for $ty {
            fn save_struct() -> &'static $crate::save_struct::StructDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<$crate::save_struct::StructDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    $crate::save_struct::StructDescriptor::new(stringify!($ty), vec![$($field),*])
                })
            }
        }

        impl $crate::save_type::SaveTypeDeducer for $ty {
            fn save_type() -> $crate::save_type::SaveType {
                $crate::save_type::SaveType::structure(
                    <$ty as $crate::save_struct::SaveStruct>::save_struct,
                )
            }
        }
    };
}

/// Field descriptor for `owner.path`, named `name` in the document.
#[macro_export]
macro_rules! field {
    ($name:literal, $owner:ty, $($path:ident).+) => {
        $crate::save_struct::FieldDescriptor::deduce::<$owner, _>(
            $name,
            |o: &$owner| &o.$($path).+,
            |o| o.downcast_ref::<$owner>().map(|o| &o.$($path).+ as &dyn ::std::any::Any),
            |o| o.downcast_mut::<$owner>().map(|o| &mut o.$($path).+ as &mut dyn ::std::any::Any),
        )
    };
}

// ============================================================
// Registry
// ============================================================

/// Every top-level schema the save system may be asked to walk.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    structs: Vec<&'static StructDescriptor>,
    by_name: HashMap<&'static str, usize>,
    finalized: bool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    pub fn register<T: SaveStruct>(&mut self) -> Result<(), SaveError> {
        if self.finalized {
            return Err(SaveError::registration(format!(
                "attempted to register struct {} after the schema registry was finalized",
                T::save_struct().name
            )));
        }
        self.structs.push(T::save_struct());
        Ok(())
    }

    /// Validates every registered schema and every schema reachable from
    /// it, then freezes the registry.
    pub fn finalize(&mut self) -> Result<(), SaveError> {
        if self.finalized {
            return Err(SaveError::registration("schema registry finalized twice"));
        }

        let mut pending: Vec<&'static StructDescriptor> = self.structs.clone();
        let mut visited = HashSet::new();
        let mut by_name = HashMap::new();
        let mut ordered = Vec::new();

        while let Some(desc) = pending.pop() {
            let key = desc as *const StructDescriptor as usize;
            if !visited.insert(key) {
                continue;
            }
            desc.validate()?;
            if by_name.insert(desc.name, ordered.len()).is_some() {
                return Err(SaveError::registration(format!(
                    "two different schemas are named {}",
                    desc.name
                )));
            }
            ordered.push(desc);
            for f in &desc.fields {
                collect_nested(&f.ty, &mut pending);
            }
        }

        self.structs = ordered;
        self.by_name = by_name;
        self.finalized = true;
        log::debug!("schema registry finalized with {} structs", self.structs.len());
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn get(&self, name: &str) -> Option<&'static StructDescriptor> {
        self.by_name.get(name).map(|&i| self.structs[i])
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static StructDescriptor> + '_ {
        self.structs.iter().copied()
    }
}

fn collect_nested(ty: &SaveType, pending: &mut Vec<&'static StructDescriptor>) {
    match ty.kind {
        SaveKind::Struct(resolver) => pending.push(resolver()),
        SaveKind::FixedArray { element, .. } | SaveKind::DynamicArray { element, .. } => {
            collect_nested(&element(), pending)
        }
        _ => {}
    }
}
