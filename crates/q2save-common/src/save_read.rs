// save_read.rs — document → memory
//
// Field-level problems are recovered in place: the field keeps whatever value
// it had, a warning carrying the breadcrumb path is recorded, and the walk
// continues. In strict mode the first such problem aborts the read instead.

use std::any::Any;

use serde_json::{Map, Value};

use crate::q_shared::*;
use crate::save_env::SaveEnv;
use crate::save_error::{breadcrumb, SaveError, SaveWarning, WarningKind};
use crate::save_struct::StructDescriptor;
use crate::save_type::{ItemRefMode, SaveKind, SaveType};
use crate::tag_arena::{MemoryTag, TagArena};

pub struct ReadCtx<'a> {
    pub env: SaveEnv<'a>,
    pub arena: &'a mut TagArena,
    path: Vec<String>,
    warnings: Vec<SaveWarning>,
}

impl<'a> ReadCtx<'a> {
    pub fn new(env: SaveEnv<'a>, arena: &'a mut TagArena) -> Self {
        ReadCtx { env, arena, path: Vec::new(), warnings: Vec::new() }
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.path.push(segment.into());
    }

    pub fn pop(&mut self) {
        self.path.pop();
    }

    /// Runs `f` with `segment` appended to the breadcrumb path.
    pub fn scoped<R>(
        &mut self,
        segment: impl Into<String>,
        f: impl FnOnce(&mut Self) -> Result<R, SaveError>,
    ) -> Result<R, SaveError> {
        self.push(segment);
        let result = f(self);
        self.pop();
        result
    }

    pub fn path_to(&self, field: &str) -> String {
        breadcrumb(&self.path, field)
    }

    /// Records a recoverable problem, or fails in strict mode.
    pub fn report(
        &mut self,
        kind: WarningKind,
        field: &str,
        message: impl Into<String>,
    ) -> Result<(), SaveError> {
        let warning = SaveWarning::new(kind, self.path_to(field), message);
        if self.env.strict {
            return Err(warning.into_error());
        }
        log::warn!("Warning loading save: {warning}");
        self.warnings.push(warning);
        Ok(())
    }

    pub fn warnings(&self) -> &[SaveWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<SaveWarning> {
        self.warnings
    }

    fn mismatch(&self, field: &str, expected: &str) -> SaveError {
        SaveError::registration(format!(
            "{}: schema says {expected} but the value has a different type",
            self.path_to(field)
        ))
    }
}

fn store<T: Any>(data: &mut dyn Any, value: T, field: &str, kind: &str, ctx: &ReadCtx<'_>) -> Result<(), SaveError> {
    match data.downcast_mut::<T>() {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(ctx.mismatch(field, kind)),
    }
}

// ============================================================
// Structs
// ============================================================

/// Reads every field of `desc` present in `json` into `data`. Fields the
/// schema doesn't know are skipped; fields the document lacks keep their
/// current value.
pub fn read_save_struct(
    json: &Value,
    data: &mut dyn Any,
    desc: &StructDescriptor,
    ctx: &mut ReadCtx<'_>,
) -> Result<(), SaveError> {
    let Some(obj) = json.as_object() else {
        return ctx.report(WarningKind::Structural, "", format!("expected object for {}", desc.name));
    };
    read_save_fields(obj, data, desc, ctx)
}

fn read_save_fields(
    obj: &Map<String, Value>,
    data: &mut dyn Any,
    desc: &StructDescriptor,
    ctx: &mut ReadCtx<'_>,
) -> Result<(), SaveError> {
    for (key, value) in obj {
        let Some(field) = desc.field(key) else {
            log::debug!("{}: unknown field skipped", ctx.path_to(key));
            continue;
        };
        let slot = (field.get_mut)(data).ok_or_else(|| ctx.mismatch(key, desc.name))?;
        read_save_type(value, slot, &field.ty, field.name, ctx)?;
    }
    Ok(())
}

// ============================================================
// Values
// ============================================================

pub fn read_save_type(
    json: &Value,
    data: &mut dyn Any,
    ty: &SaveType,
    field: &str,
    ctx: &mut ReadCtx<'_>,
) -> Result<(), SaveError> {
    if let Some(hook) = ty.read {
        return hook(data, json, field, ctx);
    }

    match ty.kind {
        SaveKind::Boolean => match json.as_bool() {
            Some(b) => store(data, b, field, "bool", ctx),
            None => ctx.report(WarningKind::Structural, field, "expected boolean"),
        },
        SaveKind::Int8 => read_int::<i8>(json, data, field, "int8", ctx),
        SaveKind::Int16 => read_int::<i16>(json, data, field, "int16", ctx),
        SaveKind::Int32 => read_int::<i32>(json, data, field, "int32", ctx),
        SaveKind::Int64 => read_int::<i64>(json, data, field, "int64", ctx),
        SaveKind::UInt8 => read_int::<u8>(json, data, field, "uint8", ctx),
        SaveKind::UInt16 => read_int::<u16>(json, data, field, "uint16", ctx),
        SaveKind::UInt32 => read_int::<u32>(json, data, field, "uint32", ctx),
        SaveKind::UInt64 => read_int::<u64>(json, data, field, "uint64", ctx),
        SaveKind::Float => match read_float(json) {
            // only a finite value that narrows to infinity is out of range
            Some(v) if v.is_finite() && (v as f32).is_infinite() => {
                ctx.report(WarningKind::Range, field, "float out of range")
            }
            Some(v) => store(data, v as f32, field, "float", ctx),
            None => ctx.report(WarningKind::Structural, field, "expected number"),
        },
        SaveKind::Double => match read_float(json) {
            Some(v) => store(data, v, field, "double", ctx),
            None => ctx.report(WarningKind::Structural, field, "expected number"),
        },
        SaveKind::Enum(access) => {
            let value = json
                .as_i64()
                .map(i128::from)
                .or_else(|| json.as_u64().map(i128::from));
            let Some(value) = value else {
                return ctx.report(WarningKind::Structural, field, "expected integer");
            };
            let (lo, hi) = access.range();
            if value < lo || value > hi {
                return ctx.report(WarningKind::Range, field, "enum value out of range");
            }
            if (access.get)(data).is_none() {
                return Err(ctx.mismatch(field, "enum"));
            }
            if !(access.set)(data, value as i64) {
                return ctx.report(WarningKind::Range, field, format!("invalid enum value {value}"));
            }
            Ok(())
        }
        SaveKind::FixedString { max_len, text } => {
            let bytes = match text_node(json, field, ctx)? {
                TextNode::Bytes(b) => b,
                TextNode::Null => {
                    return ctx.report(WarningKind::Structural, field, "expected string or array")
                }
                TextNode::Invalid => return Ok(()),
            };
            if bytes.len() >= max_len {
                return ctx.report(WarningKind::Range, field, "fixed length string overrun");
            }
            let slot = (text.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "fixed string"))?;
            if !slot.set_text(Some(&bytes)) {
                return ctx.report(WarningKind::Range, field, "fixed length string overrun");
            }
            Ok(())
        }
        SaveKind::DynamicString { tag, text } => {
            let bytes = match text_node(json, field, ctx)? {
                TextNode::Bytes(b) => Some(b),
                TextNode::Null => None,
                TextNode::Invalid => return Ok(()),
            };
            if let Some(b) = &bytes {
                ctx.arena.alloc(b.len() + 1, tag)?;
            }
            let slot = (text.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "string"))?;
            slot.set_text(bytes.as_deref());
            Ok(())
        }
        SaveKind::FixedArray { element, count, array } => {
            let Some(items) = json.as_array() else {
                return ctx.report(WarningKind::Structural, field, "expected array");
            };
            if items.len() != count {
                return ctx.report(
                    WarningKind::Structural,
                    field,
                    format!("fixed array length mismatch (expected {count}, found {})", items.len()),
                );
            }
            let element_ty = element();
            let slot = (array.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "fixed array"))?;
            ctx.scoped(field, |ctx| {
                for (i, item) in items.iter().enumerate() {
                    let name = format!("[{i}]");
                    let e = slot.element_mut(i).ok_or_else(|| ctx.mismatch(&name, "array element"))?;
                    read_save_type(item, e, &element_ty, &name, ctx)?;
                }
                Ok(())
            })
        }
        SaveKind::DynamicArray { element, tag, array } => {
            let items: &[Value] = match json {
                Value::Null => &[],
                Value::Array(items) => items,
                _ => return ctx.report(WarningKind::Structural, field, "expected array or null"),
            };
            let element_ty = element();
            let slot = (array.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "dynamic array"))?;
            if !items.is_empty() {
                ctx.arena.alloc(items.len() * slot.element_size(), tag)?;
            }
            slot.reset(items.len());
            ctx.scoped(field, |ctx| {
                for (i, item) in items.iter().enumerate() {
                    let name = format!("[{i}]");
                    let e = slot.element_mut(i).ok_or_else(|| ctx.mismatch(&name, "array element"))?;
                    read_save_type(item, e, &element_ty, &name, ctx)?;
                }
                Ok(())
            })
        }
        SaveKind::Struct(resolver) => {
            // null reads as all defaults
            if json.is_null() {
                return Ok(());
            }
            let Some(obj) = json.as_object() else {
                return ctx.report(WarningKind::Structural, field, "expected object");
            };
            ctx.scoped(field, |ctx| read_save_fields(obj, data, resolver(), ctx))
        }
        SaveKind::BitSet { bits, access } => {
            let Some(s) = json.as_str() else {
                return ctx.report(WarningKind::Structural, field, "expected string");
            };
            if s.len() > bits {
                return ctx.report(WarningKind::Range, field, "bitset length overflow");
            }
            let mut parsed = Vec::with_capacity(s.len());
            for c in s.bytes() {
                match c {
                    b'0' => parsed.push(false),
                    b'1' => parsed.push(true),
                    _ => return ctx.report(WarningKind::Structural, field, "bad bitset value"),
                }
            }
            let slot = (access.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "bitset"))?;
            slot.clear_bits();
            for (i, bit) in parsed.into_iter().enumerate() {
                slot.set_bit(i, bit);
            }
            Ok(())
        }
        SaveKind::EntityRef => {
            if json.is_null() {
                return store(data, None::<EntityId>, field, "entity", ctx);
            }
            let Some(index) = json.as_u64() else {
                return ctx.report(WarningKind::Structural, field, "expected null or entity index");
            };
            let entities = ctx.env.entities;
            if index >= entities.max_entities() as u64 {
                return ctx.report(WarningKind::Range, field, format!("entity index {index} out of range"));
            }
            match entities.entity_id(index as usize) {
                Some(id) => store(data, Some(id), field, "entity", ctx),
                None => ctx.report(WarningKind::Range, field, format!("entity index {index} out of range")),
            }
        }
        SaveKind::ItemRef(mode) => {
            let item = match json {
                Value::Null => None,
                Value::String(classname) => match ctx.env.items.find_by_classname(classname) {
                    Some(item) => Some(item),
                    None => {
                        store_item(data, None, mode, field, ctx)?;
                        return ctx.report(WarningKind::Reference, field, format!("item {classname} missing"));
                    }
                },
                _ => return ctx.report(WarningKind::Structural, field, "expected null or item class name"),
            };
            store_item(data, item, mode, field, ctx)
        }
        SaveKind::GameTime => match json.as_i64() {
            Some(ms) => store(data, GameTime::from_ms(ms), field, "time", ctx),
            None => ctx.report(WarningKind::Structural, field, "expected integer milliseconds"),
        },
        SaveKind::NamedPointer { tag, access } => {
            let pointers = ctx.env.pointers;
            let list = pointers.list_name(tag);
            let link = match json {
                Value::Null => None,
                Value::String(name) => match pointers.lookup_by_name(name, tag) {
                    Some(link) => Some(link),
                    None => {
                        let slot = (access.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "data pointer"))?;
                        slot.assign(None);
                        return ctx.report(
                            WarningKind::Reference,
                            field,
                            format!("unknown pointer {name} in list {list}"),
                        );
                    }
                },
                _ => return ctx.report(WarningKind::Structural, field, "expected null or pointer name"),
            };
            let slot = (access.get_mut)(data).ok_or_else(|| ctx.mismatch(field, "data pointer"))?;
            if !slot.assign(link) {
                return ctx.report(
                    WarningKind::Reference,
                    field,
                    format!("pointer {} in list {list} has the wrong type", link.map_or("", |l| l.name)),
                );
            }
            Ok(())
        }
        SaveKind::Inventory => {
            let Some(obj) = json.as_object() else {
                return ctx.report(WarningKind::Structural, field, "expected object");
            };
            let inventory = data.downcast_mut::<Inventory>().ok_or_else(|| ctx.mismatch(field, "inventory"))?;
            ctx.scoped(field, |ctx| {
                for (classname, value) in obj {
                    let Some(count) = value.as_i64().and_then(|v| i32::try_from(v).ok()) else {
                        ctx.report(WarningKind::Range, classname, "expected int32 count")?;
                        continue;
                    };
                    let Some(item) = ctx.env.items.find_by_classname(classname) else {
                        ctx.report(WarningKind::Reference, classname, "can't find item")?;
                        continue;
                    };
                    inventory.set(item, count);
                }
                Ok(())
            })
        }
        SaveKind::Reinforcements => {
            let list = data
                .downcast_mut::<ReinforcementList>()
                .ok_or_else(|| ctx.mismatch(field, "reinforcements"))?;
            read_reinforcements(json, list, field, ctx)
        }
    }
}

fn read_int<T>(json: &Value, data: &mut dyn Any, field: &str, kind: &str, ctx: &mut ReadCtx<'_>) -> Result<(), SaveError>
where
    T: Any + TryFrom<i64> + TryFrom<u64>,
{
    let parsed = if let Some(v) = json.as_i64() {
        <T as TryFrom<i64>>::try_from(v).ok()
    } else if let Some(v) = json.as_u64() {
        <T as TryFrom<u64>>::try_from(v).ok()
    } else {
        return ctx.report(WarningKind::Structural, field, "expected integer");
    };
    match parsed {
        Some(v) => store(data, v, field, kind, ctx),
        None => ctx.report(WarningKind::Range, field, format!("{kind} out of range")),
    }
}

/// Numbers, plus the string forms written for non-finite values.
fn read_float(json: &Value) -> Option<f64> {
    match json {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn store_item(
    data: &mut dyn Any,
    item: Option<ItemId>,
    mode: ItemRefMode,
    field: &str,
    ctx: &ReadCtx<'_>,
) -> Result<(), SaveError> {
    match mode {
        ItemRefMode::ByPointer => store(data, item, field, "item pointer", ctx),
        ItemRefMode::ByIndex => store(data, item.unwrap_or(ItemId::NULL), field, "item index", ctx),
    }
}

enum TextNode {
    Null,
    Bytes(Vec<u8>),
    Invalid,
}

/// A string node, or an array of byte values for text with high bytes.
fn text_node(json: &Value, field: &str, ctx: &mut ReadCtx<'_>) -> Result<TextNode, SaveError> {
    match json {
        Value::Null => Ok(TextNode::Null),
        Value::String(s) => Ok(TextNode::Bytes(s.as_bytes().to_vec())),
        Value::Array(chars) => {
            let mut bytes = Vec::with_capacity(chars.len());
            for c in chars {
                match c.as_u64() {
                    Some(b @ 1..=255) => bytes.push(b as u8),
                    _ => {
                        ctx.report(WarningKind::Range, field, "char out of range")?;
                        return Ok(TextNode::Invalid);
                    }
                }
            }
            Ok(TextNode::Bytes(bytes))
        }
        _ => {
            ctx.report(WarningKind::Structural, field, "expected string, array or null")?;
            Ok(TextNode::Invalid)
        }
    }
}

fn read_vec3(json: Option<&Value>) -> Option<Vec3> {
    let arr = json?.as_array()?;
    if arr.len() != 3 {
        return None;
    }
    let mut out = VEC3_ORIGIN;
    for (o, v) in out.iter_mut().zip(arr) {
        *o = v.as_f64()? as f32;
    }
    Some(out)
}

fn read_reinforcement(json: &Value) -> Result<Reinforcement, &'static str> {
    let obj = json.as_object().ok_or("expected object")?;
    let classname = obj.get("classname").and_then(Value::as_str).ok_or("expected string classname")?;
    let mins = read_vec3(obj.get("mins")).ok_or("expected 3 element mins")?;
    let maxs = read_vec3(obj.get("maxs")).ok_or("expected 3 element maxs")?;
    let strength = obj
        .get("strength")
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or("expected integer strength")?;
    let count = match obj.get("count") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_u64().and_then(|c| u32::try_from(c).ok()).ok_or("expected unsigned count")?,
    };
    Ok(Reinforcement { classname: classname.to_string(), mins, maxs, strength, count })
}

fn read_reinforcements(
    json: &Value,
    list: &mut ReinforcementList,
    field: &str,
    ctx: &mut ReadCtx<'_>,
) -> Result<(), SaveError> {
    let (entries, next) = match json {
        Value::Null => (&[][..], None),
        Value::Array(entries) => (&entries[..], None),
        Value::Object(obj) => match obj.get("entries") {
            Some(Value::Array(entries)) => (&entries[..], obj.get("next")),
            None | Some(Value::Null) => (&[][..], obj.get("next")),
            Some(_) => return ctx.report(WarningKind::Structural, field, "expected entries array"),
        },
        _ => return ctx.report(WarningKind::Structural, field, "expected array or object"),
    };

    let mut parsed = Vec::with_capacity(entries.len());
    ctx.scoped(field, |ctx| {
        for (i, entry) in entries.iter().enumerate() {
            match read_reinforcement(entry) {
                Ok(r) => parsed.push(r),
                Err(msg) => ctx.report(WarningKind::Structural, &format!("[{i}]"), msg)?,
            }
        }
        Ok(())
    })?;

    let bytes: usize = parsed
        .iter()
        .map(|r| std::mem::size_of::<Reinforcement>() + r.classname.len() + 1)
        .sum();
    if bytes > 0 {
        ctx.arena.alloc(bytes, MemoryTag::Level)?;
    }

    let mut cursor = match next {
        None | Some(Value::Null) => 0,
        Some(v) => match v.as_u64() {
            Some(n) => n,
            None => {
                ctx.report(WarningKind::Structural, field, "expected unsigned next")?;
                0
            }
        },
    };
    if !parsed.is_empty() {
        cursor %= parsed.len() as u64;
    } else {
        cursor = 0;
    }

    list.entries = parsed;
    list.next = cursor as u32;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save_data::SaveDataRegistry;
    use crate::save_env::{FixedEntities, NamedItems};
    use crate::tag_arena::LevelString;
    use serde_json::json;

    struct Fixture {
        items: NamedItems,
        entities: FixedEntities,
        pointers: SaveDataRegistry,
        arena: TagArena,
    }

    impl Fixture {
        fn new() -> Self {
            let mut pointers = SaveDataRegistry::new();
            pointers.finalize(false).unwrap();
            Fixture {
                items: NamedItems { classnames: vec!["weapon_shotgun", "ammo_shells", "item_armor_body"] },
                entities: FixedEntities { max_entities: 16 },
                pointers,
                arena: TagArena::new(),
            }
        }

        fn ctx(&mut self, strict: bool) -> ReadCtx<'_> {
            let env = SaveEnv::new(&self.items, &self.entities, &self.pointers, strict);
            ReadCtx::new(env, &mut self.arena)
        }
    }

    fn read<T: crate::save_type::SaveTypeDeducer>(json: Value, value: &mut T, ctx: &mut ReadCtx<'_>) -> Result<(), SaveError> {
        read_save_type(&json, value, &T::save_type(), "value", ctx)
    }

    // ---- scalars ----

    #[test]
    fn test_int_range_keeps_previous_value() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut v: i8 = 7;
        read(json!(300), &mut v, &mut ctx).unwrap();
        assert_eq!(v, 7);
        read(json!(-12), &mut v, &mut ctx).unwrap();
        assert_eq!(v, -12);
        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.warnings()[0].message, "int8 out of range");
        assert_eq!(ctx.warnings()[0].kind, WarningKind::Range);
    }

    #[test]
    fn test_int_rejects_float_node() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut v: i32 = 5;
        read(json!(1.5), &mut v, &mut ctx).unwrap();
        assert_eq!(v, 5);
        assert_eq!(ctx.warnings()[0].kind, WarningKind::Structural);
    }

    #[test]
    fn test_strict_mode_upgrades_warning() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(true);
        let mut v: u16 = 0;
        let err = read(json!(-1), &mut v, &mut ctx).unwrap_err();
        assert!(matches!(err, SaveError::Range { .. }));
    }

    #[test]
    fn test_float_special_values() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut v: f32 = 0.0;
        read(json!("NaN"), &mut v, &mut ctx).unwrap();
        assert!(v.is_nan());
        read(json!("-Infinity"), &mut v, &mut ctx).unwrap();
        assert_eq!(v, f32::NEG_INFINITY);
        read(json!(1e300), &mut v, &mut ctx).unwrap();
        assert_eq!(v, f32::NEG_INFINITY);
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[test]
    fn test_float_extremes_read_back_exactly() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(true);
        // the decimals the writer emits for the f32 limits
        for (node, expected) in [
            (json!(3.4028235e38), f32::MAX),
            (json!(-3.4028235e38), -f32::MAX),
            (json!(1.1754944e-38), f32::MIN_POSITIVE),
            (json!(1e-45), f32::from_bits(1)),
        ] {
            let mut v: f32 = 0.0;
            read(node, &mut v, &mut ctx).unwrap();
            assert_eq!(v, expected);
        }
        let mut v: f32 = 2.0;
        let err = read(json!(3.5e38), &mut v, &mut ctx).unwrap_err();
        assert!(matches!(err, SaveError::Range { .. }));
        assert_eq!(v, 2.0);
    }

    // ---- strings ----

    #[test]
    fn test_fixed_string_overrun() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut s = FixedString::<4>::from_text("ab").unwrap();
        read(json!("abcd"), &mut s, &mut ctx).unwrap();
        assert_eq!(s.as_bytes(), b"ab");
        read(json!("xyz"), &mut s, &mut ctx).unwrap();
        assert_eq!(s.as_bytes(), b"xyz");
        assert_eq!(ctx.warnings()[0].message, "fixed length string overrun");
    }

    #[test]
    fn test_dynamic_string_byte_array_and_null() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut s = LevelString::from("old");
        read(json!([72, 200, 105]), &mut s, &mut ctx).unwrap();
        assert_eq!(s.as_bytes(), Some(&[72u8, 200, 105][..]));
        read(json!(null), &mut s, &mut ctx).unwrap();
        assert!(s.is_null());
        read(json!([72, 256]), &mut s, &mut ctx).unwrap();
        assert!(s.is_null());
        assert_eq!(ctx.warnings()[0].message, "char out of range");
        drop(ctx);
        assert_eq!(fx.arena.stats(MemoryTag::Level).allocations, 1);
    }

    // ---- composites ----

    #[test]
    fn test_fixed_array_length_mismatch() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut v: Vec3 = [1.0, 2.0, 3.0];
        read(json!([4.0, 5.0]), &mut v, &mut ctx).unwrap();
        assert_eq!(v, [1.0, 2.0, 3.0]);
        read(json!([4.0, "x", 6.0]), &mut v, &mut ctx).unwrap();
        assert_eq!(v, [4.0, 2.0, 6.0]);
        assert_eq!(ctx.warnings()[1].path, "value[1]");
    }

    #[test]
    fn test_bitset_overflow_and_bad_char() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut b = BitSet::<4>::new();
        b.set(0, true);
        read(json!("00001"), &mut b, &mut ctx).unwrap();
        assert!(b.get(0));
        read(json!("01x"), &mut b, &mut ctx).unwrap();
        assert!(b.get(0));
        read(json!("0101"), &mut b, &mut ctx).unwrap();
        assert!(!b.get(0) && b.get(1) && b.get(3));
        assert_eq!(ctx.warnings().len(), 2);
    }

    // ---- references ----

    #[test]
    fn test_entity_ref_bounds() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut e: Option<EntityId> = None;
        read(json!(3), &mut e, &mut ctx).unwrap();
        assert_eq!(e.map(EntityId::index), Some(3));
        read(json!(16), &mut e, &mut ctx).unwrap();
        assert_eq!(e.map(EntityId::index), Some(3));
        read(json!(null), &mut e, &mut ctx).unwrap();
        assert!(e.is_none());
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[test]
    fn test_missing_item_clears_reference() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut item: Option<ItemId> = None;
        read(json!("ammo_shells"), &mut item, &mut ctx).unwrap();
        assert_eq!(item, Some(ItemId(2)));
        read(json!("weapon_bfg"), &mut item, &mut ctx).unwrap();
        assert_eq!(item, None);
        assert_eq!(ctx.warnings()[0].message, "item weapon_bfg missing");
    }

    #[test]
    fn test_inventory_skips_unknown_items() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut inv = Inventory::new();
        read(json!({"weapon_shotgun": 1, "item_quad": 1, "ammo_shells": "many"}), &mut inv, &mut ctx).unwrap();
        assert_eq!(inv.get(ItemId(1)), 1);
        assert_eq!(inv.iter().count(), 1);
        let paths: Vec<_> = ctx.warnings().iter().map(|w| w.path.as_str()).collect();
        assert_eq!(paths, ["value.item_quad", "value.ammo_shells"]);
    }

    #[test]
    fn test_reinforcements_object_form() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx(false);
        let mut list = ReinforcementList::default();
        let doc = json!({
            "entries": [
                {"classname": "monster_soldier", "mins": [-16, -16, -24], "maxs": [16, 16, 32], "strength": 1},
                {"classname": "monster_gunner", "mins": [-16, -16, -24], "maxs": [16, 16, 32], "strength": 3, "count": 2},
                {"classname": 7}
            ],
            "next": 5
        });
        read(doc, &mut list, &mut ctx).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries[1].count, 2);
        assert_eq!(list.next, 1);
        assert_eq!(ctx.warnings()[0].path, "value[2]");
    }

    // ---- hooks ----

    fn read_hex(data: &mut dyn Any, json: &Value, field: &str, ctx: &mut ReadCtx<'_>) -> Result<(), SaveError> {
        let parsed = json.as_str().and_then(|s| i32::from_str_radix(s, 16).ok());
        match (parsed, data.downcast_mut::<i32>()) {
            (Some(v), Some(slot)) => {
                *slot = v;
                Ok(())
            }
            _ => ctx.report(WarningKind::Structural, field, "expected hex string"),
        }
    }

    fn write_hex(data: &dyn Any, _null_for_empty: bool, _ctx: &mut crate::save_write::WriteCtx<'_>) -> Result<Option<Value>, SaveError> {
        Ok(data.downcast_ref::<i32>().map(|v| Value::String(format!("{v:x}"))))
    }

    #[test]
    fn test_hooks_replace_default_codec() {
        use crate::save_type::SaveTypeDeducer;
        use crate::save_write::{write_save_type, WriteCtx};

        let ty = i32::save_type().with_hooks(Some(read_hex), Some(write_hex));
        let mut fx = Fixture::new();
        let written = {
            let mut wctx = WriteCtx::new(SaveEnv::new(&fx.items, &fx.entities, &fx.pointers, false));
            write_save_type(&255i32, &ty, true, "value", &mut wctx).unwrap()
        };
        assert_eq!(written, Some(json!("ff")));

        let mut ctx = fx.ctx(false);
        let mut v: i32 = 0;
        read_save_type(&json!("1a"), &mut v, &ty, "value", &mut ctx).unwrap();
        assert_eq!(v, 26);
        read_save_type(&json!(12), &mut v, &ty, "value", &mut ctx).unwrap();
        assert_eq!(v, 26);
        assert_eq!(ctx.warnings()[0].message, "expected hex string");
    }
}
