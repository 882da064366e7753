// save_write.rs — memory → document
//
// Every write function returns `Ok(None)` when `null_for_empty` is set and the
// value is its type's empty default, so the caller can leave the field out.

use std::any::Any;

use serde_json::{Map, Number, Value};

use crate::q_shared::*;
use crate::save_env::SaveEnv;
use crate::save_error::{breadcrumb, SaveError, SaveWarning, WarningKind};
use crate::save_struct::StructDescriptor;
use crate::save_type::{ItemRefMode, SaveKind, SaveType};

pub struct WriteCtx<'a> {
    pub env: SaveEnv<'a>,
    path: Vec<String>,
    warnings: Vec<SaveWarning>,
}

impl<'a> WriteCtx<'a> {
    pub fn new(env: SaveEnv<'a>) -> Self {
        WriteCtx { env, path: Vec::new(), warnings: Vec::new() }
    }

    pub fn scoped<R>(
        &mut self,
        segment: impl Into<String>,
        f: impl FnOnce(&mut Self) -> Result<R, SaveError>,
    ) -> Result<R, SaveError> {
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }

    pub fn path_to(&self, field: &str) -> String {
        breadcrumb(&self.path, field)
    }

    /// Records a recoverable problem, or fails in strict mode.
    pub fn report(&mut self, kind: WarningKind, field: &str, message: impl Into<String>) -> Result<(), SaveError> {
        let warning = SaveWarning::new(kind, self.path_to(field), message);
        if self.env.strict {
            return Err(warning.into_error());
        }
        log::warn!("Warning writing save: {warning}");
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

    fn fail(&self, field: &str, message: impl Into<String>) -> SaveError {
        SaveError::Reference { path: self.path_to(field), message: message.into() }
    }
}

fn view<'v, T: Any>(data: &'v dyn Any, field: &str, kind: &str, ctx: &WriteCtx<'_>) -> Result<&'v T, SaveError> {
    data.downcast_ref::<T>().ok_or_else(|| ctx.mismatch(field, kind))
}

// ============================================================
// Encoding helpers
// ============================================================

/// Finite values as numbers; NaN and the infinities as strings.
pub fn float_value(v: f64) -> Value {
    if v.is_nan() {
        Value::from("NaN")
    } else if v == f64::INFINITY {
        Value::from("Infinity")
    } else if v == f64::NEG_INFINITY {
        Value::from("-Infinity")
    } else {
        Number::from_f64(v).map_or(Value::Null, Value::Number)
    }
}

/// Writes the shortest decimal that reads back as the same `f32`.
fn f32_value(v: f32) -> Value {
    if !v.is_finite() {
        return float_value(v as f64);
    }
    float_value(v.to_string().parse::<f64>().unwrap_or(v as f64))
}

/// ASCII text as a string; anything with high bytes as an array of bytes.
fn text_value(bytes: &[u8]) -> Value {
    if bytes.iter().any(|&b| b >= 128) {
        Value::Array(bytes.iter().map(|&b| Value::from(b)).collect())
    } else {
        Value::String(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn vec3_value(v: &Vec3) -> Value {
    Value::Array(v.iter().map(|&c| f32_value(c)).collect())
}

// ============================================================
// Structs
// ============================================================

/// Writes every non-empty field of `desc`. With `null_for_empty`, a struct
/// with no remaining fields is itself omitted.
pub fn write_save_struct(
    data: &dyn Any,
    desc: &StructDescriptor,
    null_for_empty: bool,
    ctx: &mut WriteCtx<'_>,
) -> Result<Option<Value>, SaveError> {
    let mut obj = Map::new();
    for field in &desc.fields {
        let value = (field.get)(data).ok_or_else(|| ctx.mismatch(field.name, desc.name))?;
        if let Some(v) = write_save_type(value, &field.ty, !field.ty.never_empty, field.name, ctx)? {
            obj.insert(field.name.to_string(), v);
        }
    }
    if null_for_empty && obj.is_empty() {
        return Ok(None);
    }
    Ok(Some(Value::Object(obj)))
}

// ============================================================
// Values
// ============================================================

pub fn write_save_type(
    data: &dyn Any,
    ty: &SaveType,
    null_for_empty: bool,
    field: &str,
    ctx: &mut WriteCtx<'_>,
) -> Result<Option<Value>, SaveError> {
    if let Some(hook) = ty.write {
        return hook(data, null_for_empty, ctx);
    }
    if let Some(is_empty) = ty.is_empty {
        if null_for_empty && is_empty(data) {
            return Ok(None);
        }
    }
    // a custom predicate replaces the natural zero check
    let omit_zero = null_for_empty && ty.is_empty.is_none();
    let emit = |zero: bool, value: Value| -> Result<Option<Value>, SaveError> {
        Ok(if omit_zero && zero { None } else { Some(value) })
    };

    match ty.kind {
        SaveKind::Boolean => {
            let b = *view::<bool>(data, field, "bool", ctx)?;
            emit(!b, Value::Bool(b))
        }
        SaveKind::Int8 => write_int::<i8>(data, field, "int8", omit_zero, ctx),
        SaveKind::Int16 => write_int::<i16>(data, field, "int16", omit_zero, ctx),
        SaveKind::Int32 => write_int::<i32>(data, field, "int32", omit_zero, ctx),
        SaveKind::Int64 => write_int::<i64>(data, field, "int64", omit_zero, ctx),
        SaveKind::UInt8 => write_int::<u8>(data, field, "uint8", omit_zero, ctx),
        SaveKind::UInt16 => write_int::<u16>(data, field, "uint16", omit_zero, ctx),
        SaveKind::UInt32 => write_int::<u32>(data, field, "uint32", omit_zero, ctx),
        SaveKind::UInt64 => write_int::<u64>(data, field, "uint64", omit_zero, ctx),
        SaveKind::Float => {
            let v = *view::<f32>(data, field, "float", ctx)?;
            emit(v == 0.0, f32_value(v))
        }
        SaveKind::Double => {
            let v = *view::<f64>(data, field, "double", ctx)?;
            emit(v == 0.0, float_value(v))
        }
        SaveKind::Enum(access) => {
            let v = (access.get)(data).ok_or_else(|| ctx.mismatch(field, "enum"))?;
            let value = if !access.signed && access.width == 8 {
                Value::from(v as u64)
            } else {
                Value::from(v)
            };
            emit(v == 0, value)
        }
        SaveKind::FixedString { text, .. } => {
            let slot = (text.get)(data).ok_or_else(|| ctx.mismatch(field, "fixed string"))?;
            let bytes = slot.text().unwrap_or_default();
            emit(bytes.is_empty(), text_value(bytes))
        }
        SaveKind::DynamicString { text, .. } => {
            let slot = (text.get)(data).ok_or_else(|| ctx.mismatch(field, "string"))?;
            match slot.text() {
                Some(bytes) => emit(false, text_value(bytes)),
                None => emit(true, Value::Null),
            }
        }
        SaveKind::FixedArray { element, array, .. } | SaveKind::DynamicArray { element, array, .. } => {
            let slot = (array.get)(data).ok_or_else(|| ctx.mismatch(field, "array"))?;
            let element_ty = element();
            ctx.scoped(field, |ctx| {
                let mut written = Vec::with_capacity(slot.len());
                for i in 0..slot.len() {
                    let name = format!("[{i}]");
                    let e = slot.element(i).ok_or_else(|| ctx.mismatch(&name, "array element"))?;
                    written.push(write_save_type(e, &element_ty, !element_ty.never_empty, &name, ctx)?);
                }
                if null_for_empty && written.iter().all(Option::is_none) {
                    return Ok(None);
                }
                // once anything is written, every element is
                let mut out = Vec::with_capacity(written.len());
                for (i, w) in written.into_iter().enumerate() {
                    match w {
                        Some(v) => out.push(v),
                        None => {
                            let name = format!("[{i}]");
                            let e = slot.element(i).ok_or_else(|| ctx.mismatch(&name, "array element"))?;
                            out.push(write_save_type(e, &element_ty, false, &name, ctx)?.unwrap_or(Value::Null));
                        }
                    }
                }
                Ok(Some(Value::Array(out)))
            })
        }
        SaveKind::Struct(resolver) => ctx.scoped(field, |ctx| write_save_struct(data, resolver(), null_for_empty, ctx)),
        SaveKind::BitSet { access, .. } => {
            let slot = (access.get)(data).ok_or_else(|| ctx.mismatch(field, "bitset"))?;
            let highest = (0..slot.bit_count()).rev().find(|&i| slot.bit(i));
            let s: String = match highest {
                Some(h) => (0..=h).map(|i| if slot.bit(i) { '1' } else { '0' }).collect(),
                None => String::new(),
            };
            emit(highest.is_none(), Value::String(s))
        }
        SaveKind::EntityRef => {
            let entity = *view::<Option<EntityId>>(data, field, "entity", ctx)?;
            match entity {
                Some(id) if ctx.env.entities.is_current(id) => emit(false, Value::from(id.index)),
                Some(id) => {
                    log::debug!("{}: entity {} was freed, writing null", ctx.path_to(field), id.index);
                    emit(true, Value::Null)
                }
                None => emit(true, Value::Null),
            }
        }
        SaveKind::ItemRef(mode) => {
            let item = match mode {
                ItemRefMode::ByPointer => *view::<Option<ItemId>>(data, field, "item pointer", ctx)?,
                ItemRefMode::ByIndex => {
                    Some(*view::<ItemId>(data, field, "item index", ctx)?).filter(|id| !id.is_null())
                }
            };
            match item {
                None => emit(true, Value::Null),
                Some(id) => match ctx.env.items.classname(id) {
                    Some(classname) => emit(false, Value::from(classname)),
                    None => Err(ctx.fail(field, format!("attempt to persist invalid item {}", id.0))),
                },
            }
        }
        SaveKind::GameTime => {
            let t = *view::<GameTime>(data, field, "time", ctx)?;
            emit(t.is_zero(), Value::from(t.milliseconds()))
        }
        SaveKind::NamedPointer { tag, access } => {
            let slot = (access.get)(data).ok_or_else(|| ctx.mismatch(field, "data pointer"))?;
            let Some(address) = slot.address() else {
                return emit(true, Value::Null);
            };
            let pointers = ctx.env.pointers;
            match pointers.lookup_by_pointer(address, tag) {
                Some(link) => emit(false, Value::from(link.name)),
                None => {
                    ctx.report(
                        WarningKind::Reference,
                        field,
                        format!("unregistered pointer {address:#x} in list {}", pointers.list_name(tag)),
                    )?;
                    emit(true, Value::Null)
                }
            }
        }
        SaveKind::Inventory => {
            let inventory = view::<Inventory>(data, field, "inventory", ctx)?;
            let mut obj = Map::new();
            for (id, count) in inventory.iter() {
                let classname = ctx
                    .env
                    .items
                    .classname(id)
                    .ok_or_else(|| ctx.fail(field, format!("inventory holds invalid item {}", id.0)))?;
                obj.insert(classname.to_string(), Value::from(count));
            }
            emit(obj.is_empty(), Value::Object(obj))
        }
        SaveKind::Reinforcements => {
            let list = view::<ReinforcementList>(data, field, "reinforcements", ctx)?;
            let entries: Vec<Value> = list
                .entries
                .iter()
                .map(|r| {
                    let mut obj = Map::new();
                    obj.insert("classname".into(), Value::from(r.classname.as_str()));
                    obj.insert("mins".into(), vec3_value(&r.mins));
                    obj.insert("maxs".into(), vec3_value(&r.maxs));
                    obj.insert("strength".into(), Value::from(r.strength));
                    if r.count != 0 {
                        obj.insert("count".into(), Value::from(r.count));
                    }
                    Value::Object(obj)
                })
                .collect();
            let mut obj = Map::new();
            obj.insert("entries".into(), Value::Array(entries));
            obj.insert("next".into(), Value::from(list.next));
            emit(list.is_empty(), Value::Object(obj))
        }
    }
}

fn write_int<T>(data: &dyn Any, field: &str, kind: &str, omit_zero: bool, ctx: &WriteCtx<'_>) -> Result<Option<Value>, SaveError>
where
    T: Any + Copy + Default + PartialEq + Into<Value>,
{
    let v = *view::<T>(data, field, kind, ctx)?;
    if omit_zero && v == T::default() {
        return Ok(None);
    }
    Ok(Some(v.into()))
}
