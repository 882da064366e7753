// save_data.rs — named pointer registry
//
// Function and static data pointers are never written as addresses. Each one
// that may end up in a persisted field is registered once under a stable
// name and a tag, and the save document carries the name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::save_error::SaveError;

/// Partitions the pointer namespace. The same address may be registered
/// under different tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SaveDataTag(pub u16);

/// Binds a pointer type to the tag its values are registered under.
pub trait SaveTag: 'static {
    type Ptr: Copy + Send + Sync + 'static;
    const TAG: SaveDataTag;
    const NAME: &'static str;

    /// Identity of a pointer value.
    fn address(ptr: Self::Ptr) -> usize;
}

/// Declares a tag marker type.
///
/// `fn` tags hold function pointers; `data` tags hold `&'static` references.
#[macro_export]
macro_rules! save_tag {
    ($(#[$meta:meta])* $vis:vis $name:ident: fn $ptr:ty = $tag:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::save_data::SaveTag for $name {
            type Ptr = $ptr;
            const TAG: $crate::save_data::SaveDataTag = $tag;
            const NAME: &'static str = $label;

            fn address(ptr: $ptr) -> usize {
                ptr as usize
            }
        }
    };
    ($(#[$meta:meta])* $vis:vis $name:ident: data $ptr:ty = $tag:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::save_data::SaveTag for $name {
            type Ptr = $ptr;
            const TAG: $crate::save_data::SaveDataTag = $tag;
            const NAME: &'static str = $label;

            fn address(ptr: $ptr) -> usize {
                ptr as *const _ as usize
            }
        }
    };
}

// ============================================================
// SaveData slot
// ============================================================

/// A persisted pointer field.
pub struct SaveData<T: SaveTag> {
    ptr: Option<T::Ptr>,
    _tag: PhantomData<T>,
}

impl<T: SaveTag> SaveData<T> {
    pub const fn none() -> Self {
        SaveData { ptr: None, _tag: PhantomData }
    }

    pub const fn new(ptr: T::Ptr) -> Self {
        SaveData { ptr: Some(ptr), _tag: PhantomData }
    }

    pub fn get(&self) -> Option<T::Ptr> {
        self.ptr
    }

    pub fn set(&mut self, ptr: Option<T::Ptr>) {
        self.ptr = ptr;
    }

    pub fn is_some(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn is_none(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn address(&self) -> Option<usize> {
        self.ptr.map(T::address)
    }
}

impl<T: SaveTag> Clone for SaveData<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SaveTag> Copy for SaveData<T> {}

impl<T: SaveTag> Default for SaveData<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T: SaveTag> PartialEq for SaveData<T> {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl<T: SaveTag> fmt::Debug for SaveData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(addr) => write!(f, "{}({:#x})", T::NAME, addr),
            None => write!(f, "{}(null)", T::NAME),
        }
    }
}

/// Type-erased view of a `SaveData` slot used by the read/write engines.
pub trait PointerSlot {
    fn address(&self) -> Option<usize>;
    /// Points the slot at `link`'s value, or clears it. Returns false when
    /// the registered value has a different pointer type.
    fn assign(&mut self, link: Option<&DataLink>) -> bool;
}

impl<T: SaveTag> PointerSlot for SaveData<T> {
    fn address(&self) -> Option<usize> {
        SaveData::address(self)
    }

    fn assign(&mut self, link: Option<&DataLink>) -> bool {
        match link {
            None => {
                self.ptr = None;
                true
            }
            Some(link) => match link.value.downcast_ref::<T::Ptr>() {
                Some(p) => {
                    self.ptr = Some(*p);
                    true
                }
                None => false,
            },
        }
    }
}

// ============================================================
// Registry
// ============================================================

pub struct DataLink {
    pub name: &'static str,
    pub tag: SaveDataTag,
    pub address: usize,
    value: Box<dyn Any + Send + Sync>,
}

impl fmt::Debug for DataLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLink")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}

/// Two-phase registry: entries accumulate until `finalize`, after which the
/// registry is read-only.
#[derive(Default)]
pub struct SaveDataRegistry {
    links: Vec<DataLink>,
    list_names: HashMap<SaveDataTag, &'static str>,
    by_ptr: HashMap<(usize, SaveDataTag), usize>,
    by_name: HashMap<SaveDataTag, HashMap<&'static str, usize>>,
    finalized: bool,
}

impl SaveDataRegistry {
    pub fn new() -> Self {
        SaveDataRegistry::default()
    }

    pub fn register<T: SaveTag>(&mut self, name: &'static str, ptr: T::Ptr) -> Result<(), SaveError> {
        if self.finalized {
            return Err(SaveError::registration(format!(
                "attempted to register save data \"{name}\" after the registry was finalized"
            )));
        }
        self.list_names.entry(T::TAG).or_insert(T::NAME);
        self.links.push(DataLink {
            name,
            tag: T::TAG,
            address: T::address(ptr),
            value: Box::new(ptr),
        });
        Ok(())
    }

    pub fn register_list<T: SaveTag>(
        &mut self,
        entries: &[(&'static str, T::Ptr)],
    ) -> Result<(), SaveError> {
        for &(name, ptr) in entries {
            self.register::<T>(name, ptr)?;
        }
        Ok(())
    }

    /// Builds the lookup indices and freezes the registry. Duplicate names
    /// or (pointer, tag) pairs are errors in strict mode; otherwise they are
    /// returned as messages and the first registration wins.
    pub fn finalize(&mut self, strict: bool) -> Result<Vec<String>, SaveError> {
        if self.finalized {
            return Err(SaveError::registration("save data registry finalized twice"));
        }

        let mut duplicates = Vec::new();
        let mut by_ptr = HashMap::with_capacity(self.links.len());
        let mut by_name: HashMap<SaveDataTag, HashMap<&'static str, usize>> = HashMap::new();

        for (i, link) in self.links.iter().enumerate() {
            let list = self.list_name(link.tag);

            if let Some(&first) = by_ptr.get(&(link.address, link.tag)) {
                let first: &DataLink = &self.links[first];
                duplicates.push(format!(
                    "pointer {:#x} in list {list} registered as both \"{}\" and \"{}\"",
                    link.address, first.name, link.name
                ));
            } else {
                by_ptr.insert((link.address, link.tag), i);
            }

            let names = by_name.entry(link.tag).or_default();
            if names.contains_key(link.name) {
                duplicates.push(format!("name \"{}\" in list {list} registered more than once", link.name));
            } else {
                names.insert(link.name, i);
            }
        }

        if strict && !duplicates.is_empty() {
            return Err(SaveError::registration(duplicates.join("; ")));
        }
        for msg in &duplicates {
            log::warn!("save data: {msg}");
        }

        self.by_ptr = by_ptr;
        self.by_name = by_name;
        self.finalized = true;
        log::debug!("save data registry finalized with {} entries", self.links.len());
        Ok(duplicates)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Display name of a tag's list.
    pub fn list_name(&self, tag: SaveDataTag) -> &'static str {
        self.list_names.get(&tag).copied().unwrap_or("unknown")
    }

    pub fn lookup_by_pointer(&self, address: usize, tag: SaveDataTag) -> Option<&DataLink> {
        self.by_ptr.get(&(address, tag)).map(|&i| &self.links[i])
    }

    pub fn lookup_by_name(&self, name: &str, tag: SaveDataTag) -> Option<&DataLink> {
        self.by_name
            .get(&tag)
            .and_then(|names| names.get(name))
            .map(|&i| &self.links[i])
    }

    pub fn find<T: SaveTag>(&self, name: &str) -> Option<T::Ptr> {
        self.lookup_by_name(name, T::TAG)
            .and_then(|l| l.value.downcast_ref::<T::Ptr>())
            .copied()
    }

    pub fn name_of<T: SaveTag>(&self, ptr: T::Ptr) -> Option<&'static str> {
        self.lookup_by_pointer(T::address(ptr), T::TAG).map(|l| l.name)
    }
}

impl fmt::Debug for SaveDataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveDataRegistry")
            .field("entries", &self.links.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestFn = fn(i32) -> i32;

    crate::save_tag!(TestTag: fn TestFn = SaveDataTag(1), "test");
    crate::save_tag!(OtherTag: data &'static [i32; 4] = SaveDataTag(2), "other");

    fn double(x: i32) -> i32 {
        x * 2
    }

    fn negate(x: i32) -> i32 {
        -x
    }

    static TABLE: [i32; 4] = [1, 2, 3, 4];

    fn registry() -> SaveDataRegistry {
        let mut reg = SaveDataRegistry::new();
        reg.register_list::<TestTag>(&[("double", double as TestFn), ("negate", negate as TestFn)])
            .unwrap();
        reg.register::<OtherTag>("table", &TABLE).unwrap();
        reg
    }

    // ---- lookups ----

    #[test]
    fn test_lookup_both_directions() {
        let mut reg = registry();
        assert!(reg.finalize(true).unwrap().is_empty());

        let f = reg.find::<TestTag>("negate").unwrap();
        assert_eq!(f(3), -3);
        assert_eq!(reg.name_of::<TestTag>(double), Some("double"));
        assert_eq!(reg.name_of::<OtherTag>(&TABLE), Some("table"));
        assert_eq!(reg.list_name(TestTag::TAG), "test");
    }

    #[test]
    fn test_unregistered_pointer_not_found() {
        fn unregistered(x: i32) -> i32 {
            x + 1000
        }
        let mut reg = registry();
        reg.finalize(false).unwrap();
        assert!(reg.name_of::<TestTag>(unregistered).is_none());
        assert!(reg.lookup_by_name("nonexistent_callback", TestTag::TAG).is_none());
    }

    #[test]
    fn test_tag_partitions_names() {
        let mut reg = registry();
        reg.finalize(false).unwrap();
        assert!(reg.lookup_by_name("table", TestTag::TAG).is_none());
        assert!(reg.lookup_by_name("table", OtherTag::TAG).is_some());
    }

    // ---- lifecycle ----

    #[test]
    fn test_register_after_finalize_fails() {
        let mut reg = registry();
        reg.finalize(false).unwrap();
        let err = reg.register::<TestTag>("late", double).unwrap_err();
        assert!(matches!(err, SaveError::Registration(_)));
        assert!(reg.finalize(false).is_err());
    }

    #[test]
    fn test_duplicate_name_strict_is_fatal() {
        let mut reg = registry();
        reg.register::<TestTag>("double", negate).unwrap();
        let err = reg.finalize(true).unwrap_err();
        assert!(err.to_string().contains("\"double\""));
        assert!(!reg.is_finalized());
    }

    #[test]
    fn test_duplicate_pointer_lenient_first_wins() {
        let mut reg = registry();
        reg.register::<TestTag>("double_again", double).unwrap();
        let dups = reg.finalize(false).unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(reg.name_of::<TestTag>(double), Some("double"));
    }

    // ---- slots ----

    #[test]
    fn test_slot_assign_checks_pointer_type() {
        let mut reg = registry();
        reg.finalize(false).unwrap();

        let mut slot = SaveData::<TestTag>::none();
        let table_link = reg.lookup_by_name("table", OtherTag::TAG);
        assert!(!PointerSlot::assign(&mut slot, table_link));
        assert!(slot.is_none());

        assert!(PointerSlot::assign(&mut slot, reg.lookup_by_name("double", TestTag::TAG)));
        assert_eq!(slot.get().map(|f| f(4)), Some(8));

        assert!(PointerSlot::assign(&mut slot, None));
        assert!(slot.is_none());
    }
}
