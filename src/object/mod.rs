/// Runtime object model for Loom
///
/// Tagged values for primitives plus reference-counted heap payloads for
/// strings, symbols, lists, and composite instances. Cloning an Object
/// bumps the strong count of any Rc payload it carries; dropping decrements
/// it; the payload is destroyed exactly when the count reaches zero. No
/// implicit deep copy ever happens.
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::registry::{EnumDef, Instr, Literal, ShapeDef, SlotType};

/// Errors raised while constructing composite instances. Construction is a
/// build-time concern (constructor signatures are checked by the verifier),
/// so these surface inside the build taxonomy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObjectError {
    #[error("shape {shape}: missing field {field}")]
    ShapeFieldMissing { shape: String, field: String },

    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("enum {enum_name} has no variant {variant}")]
    UnknownVariant { enum_name: String, variant: String },
}

/// One instance of a shape: ordered field name/value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeInstance {
    pub shape: String,
    pub fields: Vec<(String, Object)>,
}

impl ShapeInstance {
    pub fn field(&self, name: &str) -> Option<&Object> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// One instance of an enum: the variant tag plus at most one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumInstance {
    pub enum_name: String,
    pub variant: String,
    pub payload: Option<Object>,
}

/// A reference to a callable: either a named word or a block captured from
/// a word body. A captured block remembers where it was captured so the
/// engine can find the verifier's plans for its call sites.
#[derive(Debug, Clone, PartialEq)]
pub enum WordRef {
    Named(Rc<String>),
    Block(BlockRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRef {
    /// Word and overload the block was captured in.
    pub word: Rc<String>,
    pub overload: usize,
    /// Instruction path of the Block instruction within that body.
    pub path: Vec<u32>,
    pub instrs: Rc<Vec<Instr>>,
}

/// A Loom value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Boolean(bool),
    UnsignedInt(u64),
    SignedInt(i64),
    Float(f64),
    String(Rc<String>),
    Symbol(Rc<String>),
    ShapeInstance(Rc<ShapeInstance>),
    EnumInstance(Rc<EnumInstance>),
    WordRef(WordRef),
    List(Rc<Vec<Object>>),
    Optional(Option<Rc<Object>>),
}

impl Object {
    pub fn from_literal(literal: &Literal) -> Object {
        match literal {
            Literal::Boolean(b) => Object::Boolean(*b),
            Literal::UnsignedInt(n) => Object::UnsignedInt(*n),
            Literal::SignedInt(n) => Object::SignedInt(*n),
            Literal::Float(x) => Object::Float(*x),
            Literal::String(s) => Object::String(Rc::new(s.clone())),
            Literal::Symbol(s) => Object::Symbol(Rc::new(s.clone())),
        }
    }

    pub fn slot_type(&self) -> SlotType {
        match self {
            Object::Boolean(_) => SlotType::Boolean,
            Object::UnsignedInt(_) => SlotType::UnsignedInt,
            Object::SignedInt(_) => SlotType::SignedInt,
            Object::Float(_) => SlotType::Float,
            Object::String(_) => SlotType::String,
            Object::Symbol(_) => SlotType::Symbol,
            Object::ShapeInstance(inst) => SlotType::Shape(inst.shape.clone()),
            Object::EnumInstance(inst) => SlotType::Enum(inst.enum_name.clone()),
            Object::WordRef(_) => SlotType::Word,
            Object::List(_) => SlotType::List,
            Object::Optional(_) => SlotType::Optional,
        }
    }

    /// Whether this value inhabits the given slot type. Any admits
    /// everything; shape and enum types match by name.
    pub fn matches_type(&self, ty: &SlotType) -> bool {
        match ty {
            SlotType::Any => true,
            other => self.slot_type() == *other,
        }
    }

    /// Whether this value equals the given literal.
    pub fn matches_literal(&self, literal: &Literal) -> bool {
        match (self, literal) {
            (Object::Boolean(a), Literal::Boolean(b)) => a == b,
            (Object::UnsignedInt(a), Literal::UnsignedInt(b)) => a == b,
            (Object::SignedInt(a), Literal::SignedInt(b)) => a == b,
            (Object::Float(a), Literal::Float(b)) => a == b,
            (Object::String(a), Literal::String(b)) => a.as_str() == b,
            (Object::Symbol(a), Literal::Symbol(b)) => a.as_str() == b,
            _ => false,
        }
    }

    /// Construct a shape instance, validating arity and field types against
    /// the definition. `values` are in declared field order.
    pub fn new_shape(def: &ShapeDef, values: Vec<Object>) -> Result<Object, ObjectError> {
        if values.len() < def.fields.len() {
            let (missing, _) = &def.fields[values.len()];
            return Err(ObjectError::ShapeFieldMissing {
                shape: def.name.clone(),
                field: missing.clone(),
            });
        }
        if values.len() > def.fields.len() {
            return Err(ObjectError::TypeMismatch {
                context: format!("shape {} constructor", def.name),
                expected: format!("{} fields", def.fields.len()),
                actual: format!("{} values", values.len()),
            });
        }
        let mut fields = Vec::with_capacity(def.fields.len());
        for ((name, ty), value) in def.fields.iter().zip(values) {
            if !value.matches_type(ty) {
                return Err(ObjectError::TypeMismatch {
                    context: format!("shape {} field {}", def.name, name),
                    expected: ty.to_string(),
                    actual: value.slot_type().to_string(),
                });
            }
            fields.push((name.clone(), value));
        }
        Ok(Object::ShapeInstance(Rc::new(ShapeInstance {
            shape: def.name.clone(),
            fields,
        })))
    }

    /// Construct an enum instance, validating the variant name and the
    /// payload's presence and type.
    pub fn new_enum(
        def: &EnumDef,
        variant: &str,
        payload: Option<Object>,
    ) -> Result<Object, ObjectError> {
        let variant_def = def
            .variant(variant)
            .ok_or_else(|| ObjectError::UnknownVariant {
                enum_name: def.name.clone(),
                variant: variant.to_string(),
            })?;
        match (&variant_def.payload, &payload) {
            (None, None) => {}
            (Some(ty), Some(value)) => {
                if !value.matches_type(ty) {
                    return Err(ObjectError::TypeMismatch {
                        context: format!("enum {}.{} payload", def.name, variant),
                        expected: ty.to_string(),
                        actual: value.slot_type().to_string(),
                    });
                }
            }
            (Some(ty), None) => {
                return Err(ObjectError::TypeMismatch {
                    context: format!("enum {}.{} payload", def.name, variant),
                    expected: ty.to_string(),
                    actual: "nothing".to_string(),
                });
            }
            (None, Some(value)) => {
                return Err(ObjectError::TypeMismatch {
                    context: format!("enum {}.{} payload", def.name, variant),
                    expected: "nothing".to_string(),
                    actual: value.slot_type().to_string(),
                });
            }
        }
        Ok(Object::EnumInstance(Rc::new(EnumInstance {
            enum_name: def.name.clone(),
            variant: variant.to_string(),
            payload,
        })))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Boolean(b) => write!(f, "{}", b),
            Object::UnsignedInt(n) => write!(f, "{}", n),
            Object::SignedInt(n) => write!(f, "{}", n),
            Object::Float(x) => write!(f, "{}", x),
            Object::String(s) => write!(f, "\"{}\"", s),
            Object::Symbol(s) => write!(f, ":{}", s),
            Object::ShapeInstance(inst) => {
                write!(f, "{}{{", inst.shape)?;
                for (name, value) in &inst.fields {
                    write!(f, " {}: {}", name, value)?;
                }
                write!(f, " }}")
            }
            Object::EnumInstance(inst) => match &inst.payload {
                Some(payload) => write!(f, "{}.{}({})", inst.enum_name, inst.variant, payload),
                None => write!(f, "{}.{}", inst.enum_name, inst.variant),
            },
            Object::WordRef(WordRef::Named(name)) => write!(f, "&{}", name),
            Object::WordRef(WordRef::Block(_)) => write!(f, "(block)"),
            Object::List(items) => {
                write!(f, "[")?;
                for item in items.iter() {
                    write!(f, " {}", item)?;
                }
                write!(f, " ]")
            }
            Object::Optional(Some(inner)) => write!(f, "Some({})", inner),
            Object::Optional(None) => write!(f, "None"),
        }
    }
}
