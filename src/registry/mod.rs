/// Word registry for Loom
///
/// The front end resolves source text into this registry: every word name
/// maps to an ordered overload set, each overload carrying a stack-effect
/// signature and a body. The verifier and the engine consume the registry
/// as-is; nothing in the core ever reads source text.
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::engine::PrimitiveImpl;

/// Default capacity for the word table, sized for a small prelude plus a
/// typical user program.
const DEFAULT_WORDS_CAPACITY: usize = 64;

/// A literal value as it appears in a word body or a refinement pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    UnsignedInt(u64),
    SignedInt(i64),
    Float(f64),
    String(String),
    Symbol(String),
}

impl Literal {
    pub fn slot_type(&self) -> SlotType {
        match self {
            Literal::Boolean(_) => SlotType::Boolean,
            Literal::UnsignedInt(_) => SlotType::UnsignedInt,
            Literal::SignedInt(_) => SlotType::SignedInt,
            Literal::Float(_) => SlotType::Float,
            Literal::String(_) => SlotType::String,
            Literal::Symbol(_) => SlotType::Symbol,
        }
    }

    /// Infer the numeric kind of a literal the way the front end spells it:
    /// an explicit `u`/`i`/`f` suffix forces the kind; otherwise a
    /// fractional or exponent part means Float, a leading minus means
    /// SignedInt, and anything else is UnsignedInt. Underscore separators
    /// are accepted anywhere in the digits.
    pub fn infer_number(text: &str) -> Option<Literal> {
        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        if cleaned.is_empty() {
            return None;
        }
        let (digits, suffix) = match cleaned.chars().last() {
            Some(c @ ('u' | 'i' | 'f')) => (&cleaned[..cleaned.len() - 1], Some(c)),
            _ => (cleaned.as_str(), None),
        };
        match suffix {
            Some('u') => digits.parse().ok().map(Literal::UnsignedInt),
            Some('i') => digits.parse().ok().map(Literal::SignedInt),
            Some('f') => digits.parse().ok().map(Literal::Float),
            _ => {
                if digits.contains(['.', 'e', 'E']) {
                    digits.parse().ok().map(Literal::Float)
                } else if digits.starts_with('-') {
                    digits.parse().ok().map(Literal::SignedInt)
                } else {
                    digits.parse().ok().map(Literal::UnsignedInt)
                }
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::UnsignedInt(n) => write!(f, "{}", n),
            Literal::SignedInt(n) => write!(f, "{}", n),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Symbol(s) => write!(f, ":{}", s),
        }
    }
}

/// The static type of one stack slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotType {
    /// Matches any type; only meaningful together with a generic tag.
    Any,
    Boolean,
    UnsignedInt,
    SignedInt,
    Float,
    String,
    Symbol,
    Shape(String),
    Enum(String),
    Word,
    List,
    Optional,
    /// Placeholder in a contract's required signature for the implementing
    /// shape. Never inhabited by a value.
    SelfShape,
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Any => write!(f, "_"),
            SlotType::Boolean => write!(f, "Boolean"),
            SlotType::UnsignedInt => write!(f, "UnsignedInt"),
            SlotType::SignedInt => write!(f, "SignedInt"),
            SlotType::Float => write!(f, "Float"),
            SlotType::String => write!(f, "String"),
            SlotType::Symbol => write!(f, "Symbol"),
            SlotType::Shape(name) => write!(f, "{}", name),
            SlotType::Enum(name) => write!(f, "{}", name),
            SlotType::Word => write!(f, "Word"),
            SlotType::List => write!(f, "List"),
            SlotType::Optional => write!(f, "Optional"),
            SlotType::SelfShape => write!(f, "Self"),
        }
    }
}

/// A refinement pattern narrowing which values a slot accepts.
///
/// An overload with at least one refined input slot is a bounded candidate;
/// one with none is the unbounded fallback for its set.
#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    /// The slot only accepts this exact literal.
    Literal(Literal),
    /// The slot only accepts this variant of its enum type.
    Variant(String),
    /// The slot only accepts shape instances whose named fields carry these
    /// exact literals.
    Fields(Vec<(String, Literal)>),
    /// The slot only accepts values for which this block, with effect
    /// `( value -- Boolean )`, yields true. Folded at verification time.
    Predicate(Rc<Vec<Instr>>),
}

/// One input or output position of a stack effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub ty: SlotType,
    /// Generic tag; slots sharing a tag within one overload must agree on
    /// the concrete type, and a tag carried input-to-output means the same
    /// value survives the call.
    pub generic: Option<String>,
    /// Explicit affine requirement: exactly this many live occurrences of
    /// the tag's binding must be present at the call site.
    pub affine: Option<usize>,
    pub refinement: Option<Refinement>,
    /// Required effect for Word-typed slots fed by captured blocks.
    pub block_effect: Option<Box<Effect>>,
}

impl Slot {
    pub fn typed(ty: SlotType) -> Self {
        Slot {
            ty,
            generic: None,
            affine: None,
            refinement: None,
            block_effect: None,
        }
    }

    pub fn generic(tag: &str) -> Self {
        Slot {
            ty: SlotType::Any,
            generic: Some(tag.to_string()),
            affine: None,
            refinement: None,
            block_effect: None,
        }
    }

    pub fn refined(ty: SlotType, refinement: Refinement) -> Self {
        Slot {
            ty,
            generic: None,
            affine: None,
            refinement: Some(refinement),
            block_effect: None,
        }
    }

    pub fn block(effect: Effect) -> Self {
        Slot {
            ty: SlotType::Word,
            generic: None,
            affine: None,
            refinement: None,
            block_effect: Some(Box::new(effect)),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.generic = Some(tag.to_string());
        self
    }

    pub fn with_affine(mut self, count: usize) -> Self {
        self.affine = Some(count);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.refinement.is_some()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.generic {
            Some(tag) if self.ty == SlotType::Any => write!(f, "{}", tag)?,
            Some(tag) => write!(f, "{}:{}", tag, self.ty)?,
            None => write!(f, "{}", self.ty)?,
        }
        if let Some(r) = &self.refinement {
            match r {
                Refinement::Literal(l) => write!(f, "={}", l)?,
                Refinement::Variant(v) => write!(f, "::{}", v)?,
                Refinement::Fields(_) => write!(f, "{{..}}")?,
                Refinement::Predicate(_) => write!(f, "?")?,
            }
        }
        Ok(())
    }
}

/// A declared stack effect: inputs and outputs, each listed bottom to top,
/// so the last slot is the one nearest the top of the stack.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Effect {
    pub inputs: Vec<Slot>,
    pub outputs: Vec<Slot>,
}

impl Effect {
    pub fn new(inputs: Vec<Slot>, outputs: Vec<Slot>) -> Self {
        Effect { inputs, outputs }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for slot in &self.inputs {
            write!(f, " {}", slot)?;
        }
        write!(f, " --")?;
        for slot in &self.outputs {
            write!(f, " {}", slot)?;
        }
        write!(f, " )")
    }
}

/// One instruction in a word body.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Push a literal value.
    Push(Literal),
    /// Invoke a word by name; the verifier resolves the overload.
    Call(String),
    /// Capture an anonymous block. Blocks execute inline in the caller's
    /// activation and never escape it.
    Block(Rc<Vec<Instr>>),
}

/// The body of one overload.
#[derive(Debug, Clone)]
pub enum Body {
    /// Implemented by the host in Rust; trusted to honor its signature.
    Native(PrimitiveImpl),
    /// A sequence of instructions verified against the signature.
    Composed(Vec<Instr>),
    /// Constructor for the named shape: pops the fields in declared order,
    /// pushes one instance.
    ShapeCtor(String),
    /// Constructor for one variant of the named enum.
    EnumCtor { enum_name: String, variant: String },
}

/// One definition in a word's overload set.
#[derive(Debug, Clone)]
pub struct Overload {
    pub effect: Effect,
    pub body: Body,
}

impl Overload {
    pub fn new(effect: Effect, body: Body) -> Self {
        Overload { effect, body }
    }

    /// A definition is bounded when any input slot carries a refinement.
    pub fn is_bounded(&self) -> bool {
        self.effect.inputs.iter().any(Slot::is_bounded)
    }
}

/// A named product type. A shape may claim capability contracts; each claim
/// is checked at verification against the words the registry provides.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDef {
    pub name: String,
    pub fields: Vec<(String, SlotType)>,
    pub contracts: Vec<String>,
}

/// A capability contract: a shape satisfies it by providing a word of the
/// required signature, with `SelfShape` slots standing for the shape itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDef {
    pub name: String,
    /// Name of the word an implementing shape must provide.
    pub word: String,
    pub effect: Effect,
}

impl ContractDef {
    /// The required effect with Self slots instantiated to a concrete shape.
    pub fn instantiate(&self, shape: &str) -> Effect {
        let subst = |slots: &[Slot]| {
            slots
                .iter()
                .map(|slot| {
                    let mut slot = slot.clone();
                    if slot.ty == SlotType::SelfShape {
                        slot.ty = SlotType::Shape(shape.to_string());
                    }
                    slot
                })
                .collect()
        };
        Effect::new(subst(&self.effect.inputs), subst(&self.effect.outputs))
    }
}

/// Positional type equality between a provided overload's effect and a
/// contract's required one. Refined overloads are narrower than the contract
/// and do not count.
fn signature_matches(provided: &Effect, required: &Effect) -> bool {
    provided.inputs.len() == required.inputs.len()
        && provided.outputs.len() == required.outputs.len()
        && provided.inputs.iter().all(|s| s.refinement.is_none())
        && provided
            .inputs
            .iter()
            .zip(&required.inputs)
            .all(|(a, b)| a.ty == b.ty)
        && provided
            .outputs
            .iter()
            .zip(&required.outputs)
            .all(|(a, b)| a.ty == b.ty)
}

/// One variant of a sum type, payload-free or carrying one typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDef {
    pub name: String,
    pub payload: Option<SlotType>,
}

/// A named sum type over fixed variants.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<VariantDef>,
}

impl EnumDef {
    pub fn variant(&self, name: &str) -> Option<&VariantDef> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// The fully resolved program the front end hands to the core.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub shapes: HashMap<String, ShapeDef>,
    pub enums: HashMap<String, EnumDef>,
    pub contracts: HashMap<String, ContractDef>,
    words: HashMap<String, Vec<Overload>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            shapes: HashMap::new(),
            enums: HashMap::new(),
            contracts: HashMap::new(),
            words: HashMap::with_capacity(DEFAULT_WORDS_CAPACITY),
        }
    }

    /// An empty registry plus the native prelude words.
    pub fn with_prelude() -> Self {
        let mut registry = Registry::new();
        crate::engine::install_prelude(&mut registry);
        registry
    }

    /// Append one overload to a word's set. Overloads are tried in the
    /// order they were defined.
    pub fn define_word(&mut self, name: &str, overload: Overload) {
        self.words.entry(name.to_string()).or_default().push(overload);
    }

    /// Register a shape and its constructor word. The constructor consumes
    /// the fields in declared order (first field deepest) and produces one
    /// instance.
    pub fn define_shape(&mut self, shape: ShapeDef) {
        let inputs: Vec<Slot> = shape
            .fields
            .iter()
            .map(|(_, ty)| Slot::typed(ty.clone()))
            .collect();
        let effect = Effect::new(inputs, vec![Slot::typed(SlotType::Shape(shape.name.clone()))]);
        self.define_word(
            &shape.name.clone(),
            Overload::new(effect, Body::ShapeCtor(shape.name.clone())),
        );
        self.shapes.insert(shape.name.clone(), shape);
    }

    /// Register an enum and one constructor word per variant, named
    /// `Enum.Variant`. Each constructor's output slot is refined to its
    /// variant, so the verifier knows the variant statically.
    pub fn define_enum(&mut self, def: EnumDef) {
        for variant in &def.variants {
            let inputs = match &variant.payload {
                Some(ty) => vec![Slot::typed(ty.clone())],
                None => vec![],
            };
            let out = Slot::refined(
                SlotType::Enum(def.name.clone()),
                Refinement::Variant(variant.name.clone()),
            );
            let effect = Effect::new(inputs, vec![out]);
            let ctor_name = format!("{}.{}", def.name, variant.name);
            self.define_word(
                &ctor_name,
                Overload::new(
                    effect,
                    Body::EnumCtor {
                        enum_name: def.name.clone(),
                        variant: variant.name.clone(),
                    },
                ),
            );
        }
        self.enums.insert(def.name.clone(), def);
    }

    pub fn define_contract(&mut self, def: ContractDef) {
        self.contracts.insert(def.name.clone(), def);
    }

    /// Whether a shape provides a word matching the contract's required
    /// signature. Explicit claims are checked at verification; this query
    /// also answers implicit satisfaction for hosts.
    pub fn shape_satisfies(&self, shape: &str, contract: &ContractDef) -> bool {
        let required = contract.instantiate(shape);
        self.overloads(&contract.word)
            .is_some_and(|set| set.iter().any(|o| signature_matches(&o.effect, &required)))
    }

    pub fn overloads(&self, name: &str) -> Option<&[Overload]> {
        self.words.get(name).map(Vec::as_slice)
    }

    pub fn word_names(&self) -> impl Iterator<Item = &String> {
        self.words.keys()
    }
}
