// save_type.rs — type descriptors for persisted values
//
// A `SaveType` describes how one in-memory value maps to and from a document
// node. Descriptors are deduced from a field's static Rust type through
// `SaveTypeDeducer`; a field whose type has no deducer does not compile.
//
// Values are reached through `&dyn Any`. Generic containers carry small
// accessor tables (`SlotAccess`) monomorphized for the concrete container
// type, so the engines can walk a `[T; N]` or a `TagString<S>` without
// knowing `T` or `S`.

use std::any::Any;
use std::fmt;

use serde_json::Value;

use crate::q_shared::*;
use crate::save_data::{PointerSlot, SaveData, SaveDataTag, SaveTag};
use crate::save_error::SaveError;
use crate::save_read::ReadCtx;
use crate::save_struct::StructDescriptor;
use crate::save_write::WriteCtx;
use crate::tag_arena::{MemoryScope, MemoryTag, TagString, TagVec};

pub type TypeResolver = fn() -> SaveType;
pub type StructResolver = fn() -> &'static StructDescriptor;
pub type IsEmptyFn = fn(&dyn Any) -> bool;
pub type ReadHook = fn(&mut dyn Any, &Value, &str, &mut ReadCtx<'_>) -> Result<(), SaveError>;
pub type WriteHook = fn(&dyn Any, bool, &mut WriteCtx<'_>) -> Result<Option<Value>, SaveError>;

// ============================================================
// Container views
// ============================================================

pub trait TextSlot {
    /// `None` is the null string.
    fn text(&self) -> Option<&[u8]>;
    /// Returns false when the text does not fit.
    fn set_text(&mut self, bytes: Option<&[u8]>) -> bool;
}

impl<const N: usize> TextSlot for FixedString<N> {
    fn text(&self) -> Option<&[u8]> {
        Some(self.as_bytes())
    }

    fn set_text(&mut self, bytes: Option<&[u8]>) -> bool {
        match bytes {
            Some(b) => self.set_bytes(b),
            None => {
                self.clear();
                true
            }
        }
    }
}

impl<S: MemoryScope> TextSlot for TagString<S> {
    fn text(&self) -> Option<&[u8]> {
        self.as_bytes()
    }

    fn set_text(&mut self, bytes: Option<&[u8]>) -> bool {
        self.set(bytes);
        true
    }
}

pub trait ArraySlot {
    fn len(&self) -> usize;
    fn element(&self, index: usize) -> Option<&dyn Any>;
    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Any>;
    fn element_size(&self) -> usize;
    /// Resets to `count` default elements. Fixed arrays only accept their
    /// own length.
    fn reset(&mut self, count: usize) -> bool;
}

impl<T: Any + Default, const N: usize> ArraySlot for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn element(&self, index: usize) -> Option<&dyn Any> {
        self.get(index).map(|e| e as &dyn Any)
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Any> {
        self.get_mut(index).map(|e| e as &mut dyn Any)
    }

    fn element_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn reset(&mut self, count: usize) -> bool {
        count == N
    }
}

impl<T: Any + Default, S: MemoryScope> ArraySlot for TagVec<T, S> {
    fn len(&self) -> usize {
        TagVec::len(self)
    }

    fn element(&self, index: usize) -> Option<&dyn Any> {
        self.as_slice().get(index).map(|e| e as &dyn Any)
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Any> {
        self.as_mut_slice().get_mut(index).map(|e| e as &mut dyn Any)
    }

    fn element_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn reset(&mut self, count: usize) -> bool {
        TagVec::reset(self, count);
        true
    }
}

pub trait BitSlot {
    fn bit_count(&self) -> usize;
    fn bit(&self, index: usize) -> bool;
    fn set_bit(&mut self, index: usize, value: bool);
    fn clear_bits(&mut self);
}

impl<const N: usize> BitSlot for BitSet<N> {
    fn bit_count(&self) -> usize {
        N
    }

    fn bit(&self, index: usize) -> bool {
        self.get(index)
    }

    fn set_bit(&mut self, index: usize, value: bool) {
        self.set(index, value);
    }

    fn clear_bits(&mut self) {
        self.clear();
    }
}

/// Monomorphized casts from `dyn Any` to a container view.
pub struct SlotAccess<V: ?Sized + 'static> {
    pub get: for<'a> fn(&'a dyn Any) -> Option<&'a V>,
    pub get_mut: for<'a> fn(&'a mut dyn Any) -> Option<&'a mut V>,
}

impl<V: ?Sized + 'static> Clone for SlotAccess<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ?Sized + 'static> Copy for SlotAccess<V> {}

macro_rules! slot_access {
    ($view:ident) => {
        impl SlotAccess<dyn $view> {
            pub fn of<T: $view + Any>() -> Self {
                fn get<T: $view + Any>(v: &dyn Any) -> Option<&(dyn $view + 'static)> {
                    v.downcast_ref::<T>().map(|t| t as &(dyn $view + 'static))
                }
                fn get_mut<T: $view + Any>(v: &mut dyn Any) -> Option<&mut (dyn $view + 'static)> {
                    v.downcast_mut::<T>().map(|t| t as &mut (dyn $view + 'static))
                }
                SlotAccess { get: get::<T>, get_mut: get_mut::<T> }
            }
        }
    };
}

slot_access!(TextSlot);
slot_access!(ArraySlot);
slot_access!(BitSlot);
slot_access!(PointerSlot);

// ============================================================
// Enumerations
// ============================================================

/// An enumeration persisted as its underlying integer.
pub trait SaveEnum: Copy + Any {
    /// Width of the underlying integer in bytes.
    const WIDTH: u8;
    const SIGNED: bool;
    fn to_repr(self) -> i64;
    fn from_repr(value: i64) -> Option<Self>;
}

#[derive(Clone, Copy)]
pub struct EnumAccess {
    pub width: u8,
    pub signed: bool,
    pub get: fn(&dyn Any) -> Option<i64>,
    pub set: fn(&mut dyn Any, i64) -> bool,
}

impl EnumAccess {
    pub fn of<T: SaveEnum>() -> Self {
        fn get<T: SaveEnum>(v: &dyn Any) -> Option<i64> {
            v.downcast_ref::<T>().map(|e| e.to_repr())
        }
        fn set<T: SaveEnum>(v: &mut dyn Any, repr: i64) -> bool {
            match (v.downcast_mut::<T>(), T::from_repr(repr)) {
                (Some(slot), Some(value)) => {
                    *slot = value;
                    true
                }
                _ => false,
            }
        }
        EnumAccess { width: T::WIDTH, signed: T::SIGNED, get: get::<T>, set: set::<T> }
    }

    /// Inclusive range of the underlying integer.
    pub fn range(&self) -> (i128, i128) {
        let bits = u32::from(self.width) * 8;
        if self.signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }
}

/// Implements `SaveEnum` and `SaveTypeDeducer` for a fieldless enum with
/// explicit discriminants.
#[macro_export]
macro_rules! impl_save_enum {
    ($ty:ty, $repr:ty, [$($variant:ident),* $(,)?]) => {
        impl $crate::save_type::SaveEnum for $ty {
            const WIDTH: u8 = ::std::mem::size_of::<$repr>() as u8;
            const SIGNED: bool = <$repr>::MIN != 0;

            fn to_repr(self) -> i64 {
                self as $repr as i64
            }

            fn from_repr(value: i64) -> Option<Self> {
                $(
                    if value == <$ty>::$variant as $repr as i64 {
                        return Some(<$ty>::$variant);
                    }
                )*
                None
            }
        }

        impl $crate::save_type::SaveTypeDeducer for $ty {
            fn save_type() -> $crate::save_type::SaveType {
                $crate::save_type::SaveType::enumeration::<$ty>()
            }
        }
    };
}

/// Implements `SaveEnum` and `SaveTypeDeducer` for a `bitflags` type. Unknown
/// bits are retained.
#[macro_export]
macro_rules! impl_save_bitflags {
    ($ty:ty, $repr:ty) => {
        impl $crate::save_type::SaveEnum for $ty {
            const WIDTH: u8 = ::std::mem::size_of::<$repr>() as u8;
            const SIGNED: bool = <$repr>::MIN != 0;

            fn to_repr(self) -> i64 {
                self.bits() as i64
            }

            fn from_repr(value: i64) -> Option<Self> {
                Some(<$ty>::from_bits_retain(value as $repr))
            }
        }

        impl $crate::save_type::SaveTypeDeducer for $ty {
            fn save_type() -> $crate::save_type::SaveType {
                $crate::save_type::SaveType::enumeration::<$ty>()
            }
        }
    };
}

// ============================================================
// Descriptors
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRefMode {
    /// `Option<ItemId>`; null when absent.
    ByPointer,
    /// `ItemId`; `ItemId::NULL` when absent.
    ByIndex,
}

#[derive(Clone, Copy)]
pub enum SaveKind {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Enum(EnumAccess),
    FixedString { max_len: usize, text: SlotAccess<dyn TextSlot> },
    DynamicString { tag: MemoryTag, text: SlotAccess<dyn TextSlot> },
    FixedArray { element: TypeResolver, count: usize, array: SlotAccess<dyn ArraySlot> },
    DynamicArray { element: TypeResolver, tag: MemoryTag, array: SlotAccess<dyn ArraySlot> },
    Struct(StructResolver),
    BitSet { bits: usize, access: SlotAccess<dyn BitSlot> },
    EntityRef,
    ItemRef(ItemRefMode),
    GameTime,
    NamedPointer { tag: SaveDataTag, access: SlotAccess<dyn PointerSlot> },
    Inventory,
    Reinforcements,
}

impl SaveKind {
    pub fn name(&self) -> &'static str {
        match self {
            SaveKind::Boolean => "bool",
            SaveKind::Int8 => "int8",
            SaveKind::Int16 => "int16",
            SaveKind::Int32 => "int32",
            SaveKind::Int64 => "int64",
            SaveKind::UInt8 => "uint8",
            SaveKind::UInt16 => "uint16",
            SaveKind::UInt32 => "uint32",
            SaveKind::UInt64 => "uint64",
            SaveKind::Float => "float",
            SaveKind::Double => "double",
            SaveKind::Enum(_) => "enum",
            SaveKind::FixedString { .. } => "fixed_string",
            SaveKind::DynamicString { .. } => "string",
            SaveKind::FixedArray { .. } => "fixed_array",
            SaveKind::DynamicArray { .. } => "dynamic_array",
            SaveKind::Struct(_) => "struct",
            SaveKind::BitSet { .. } => "bitset",
            SaveKind::EntityRef => "entity",
            SaveKind::ItemRef(ItemRefMode::ByPointer) => "item_pointer",
            SaveKind::ItemRef(ItemRefMode::ByIndex) => "item_index",
            SaveKind::GameTime => "time",
            SaveKind::NamedPointer { .. } => "data",
            SaveKind::Inventory => "inventory",
            SaveKind::Reinforcements => "reinforcements",
        }
    }
}

/// How a value is persisted.
#[derive(Clone, Copy)]
pub struct SaveType {
    pub kind: SaveKind,
    /// Always written, even when the value is its empty default.
    pub never_empty: bool,
    /// Replaces the natural all-zero emptiness check.
    pub is_empty: Option<IsEmptyFn>,
    pub read: Option<ReadHook>,
    pub write: Option<WriteHook>,
}

impl SaveType {
    pub const fn new(kind: SaveKind) -> Self {
        SaveType { kind, never_empty: false, is_empty: None, read: None, write: None }
    }

    pub fn of<T: SaveTypeDeducer>() -> Self {
        T::save_type()
    }

    pub fn enumeration<T: SaveEnum>() -> Self {
        SaveType::new(SaveKind::Enum(EnumAccess::of::<T>()))
    }

    pub fn structure(resolver: StructResolver) -> Self {
        SaveType::new(SaveKind::Struct(resolver))
    }

    pub fn with_is_empty(mut self, is_empty: IsEmptyFn) -> Self {
        self.is_empty = Some(is_empty);
        self
    }

    pub fn never_empty(mut self) -> Self {
        self.never_empty = true;
        self
    }

    pub fn with_hooks(mut self, read: Option<ReadHook>, write: Option<WriteHook>) -> Self {
        self.read = read;
        self.write = write;
        self
    }

    /// Human-readable form, e.g. `fixed_array<float, 3>`.
    pub fn describe(&self) -> String {
        match &self.kind {
            SaveKind::Enum(e) => format!("enum<{}{}>", if e.signed { "int" } else { "uint" }, e.width * 8),
            SaveKind::FixedString { max_len, .. } => format!("fixed_string<{max_len}>"),
            SaveKind::DynamicString { tag, .. } => format!("string<tag {}>", tag.id()),
            SaveKind::FixedArray { element, count, .. } => {
                format!("fixed_array<{}, {count}>", element().describe())
            }
            SaveKind::DynamicArray { element, tag, .. } => {
                format!("dynamic_array<{}, tag {}>", element().describe(), tag.id())
            }
            SaveKind::Struct(resolver) => format!("struct<{}>", resolver().name),
            SaveKind::BitSet { bits, .. } => format!("bitset<{bits}>"),
            SaveKind::NamedPointer { tag, .. } => format!("data<{}>", tag.0),
            other => other.name().to_string(),
        }
    }
}

impl fmt::Debug for SaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())?;
        if self.never_empty {
            f.write_str(" (never empty)")?;
        }
        Ok(())
    }
}

// ============================================================
// Deduction
// ============================================================

/// Maps a Rust type to its descriptor.
pub trait SaveTypeDeducer: Any {
    fn save_type() -> SaveType;
}

macro_rules! deduce_primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl SaveTypeDeducer for $ty {
                fn save_type() -> SaveType {
                    SaveType::new(SaveKind::$kind)
                }
            }
        )*
    };
}

deduce_primitive! {
    bool => Boolean,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    Option<EntityId> => EntityRef,
    GameTime => GameTime,
    Inventory => Inventory,
    ReinforcementList => Reinforcements,
}

impl SaveTypeDeducer for Option<ItemId> {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::ItemRef(ItemRefMode::ByPointer))
    }
}

impl SaveTypeDeducer for ItemId {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::ItemRef(ItemRefMode::ByIndex))
    }
}

impl<const N: usize> SaveTypeDeducer for FixedString<N> {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::FixedString { max_len: N, text: SlotAccess::<dyn TextSlot>::of::<Self>() })
    }
}

impl<S: MemoryScope> SaveTypeDeducer for TagString<S> {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::DynamicString { tag: S::TAG, text: SlotAccess::<dyn TextSlot>::of::<Self>() })
    }
}

impl<T: SaveTypeDeducer + Default, const N: usize> SaveTypeDeducer for [T; N] {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::FixedArray {
            element: T::save_type,
            count: N,
            array: SlotAccess::<dyn ArraySlot>::of::<Self>(),
        })
    }
}

impl<T: SaveTypeDeducer + Default, S: MemoryScope> SaveTypeDeducer for TagVec<T, S> {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::DynamicArray {
            element: T::save_type,
            tag: S::TAG,
            array: SlotAccess::<dyn ArraySlot>::of::<Self>(),
        })
    }
}

impl<const N: usize> SaveTypeDeducer for BitSet<N> {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::BitSet { bits: N, access: SlotAccess::<dyn BitSlot>::of::<Self>() })
    }
}

impl<T: SaveTag> SaveTypeDeducer for SaveData<T> {
    fn save_type() -> SaveType {
        SaveType::new(SaveKind::NamedPointer { tag: T::TAG, access: SlotAccess::<dyn PointerSlot>::of::<Self>() })
    }
}
