/**
Execution engine for Loom

The machine mirrors the verified effect exactly: it pops the arity the
verifier computed, invokes the native operation or composed body, and
pushes the declared outputs. Checked mode follows the verifier's call
plans; any stack-depth delta that disagrees with a plan is an engine fault
and always fatal. Unchecked mode resolves overloads against concrete
values and exists for build-time predicate folding and for tests.
*/
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::engine::errors::{RuntimeError, WordResult};
use crate::object::{BlockRef, Object, WordRef};
use crate::registry::{Body, Instr, Overload, Refinement, Registry, Slot, SlotType};
use crate::stack::Stack;
use crate::verifier::{CallPlan, PlanKey, Resolution, VerifiedProgram};

/// Signature of a native word implementation.
pub type PrimitiveImpl = fn(&mut Machine) -> WordResult;

pub struct Machine<'a> {
    registry: &'a Registry,
    plans: Option<&'a HashMap<PlanKey, CallPlan>>,
    pub stack: Stack,
}

impl<'a> Machine<'a> {
    /// A machine bound to a verified program; the only mode a host should
    /// run words in.
    pub fn checked(program: &'a VerifiedProgram<'a>) -> Self {
        Machine {
            registry: program.registry,
            plans: Some(program.plans()),
            stack: Stack::new(),
        }
    }

    /// A plan-less machine resolving calls against concrete values. Used by
    /// the verifier to fold refinement predicates, never for verified
    /// execution.
    pub fn unchecked(registry: &'a Registry) -> Self {
        Machine {
            registry,
            plans: None,
            stack: Stack::new(),
        }
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }

    /// Execute an entry word with an empty input signature.
    pub fn run_entry(&mut self, name: &str) -> WordResult {
        let registry = self.registry;
        let overloads = registry
            .overloads(name)
            .ok_or_else(|| RuntimeError::UndefinedEntry {
                name: name.to_string(),
            })?;
        let (idx, overload) = overloads
            .iter()
            .enumerate()
            .find(|(_, o)| o.effect.inputs.is_empty())
            .ok_or_else(|| RuntimeError::UndefinedEntry {
                name: name.to_string(),
            })?;
        self.invoke(name, idx, overload)
    }

    /// Execute a bare instruction sequence with dynamic resolution.
    pub fn eval_unchecked(&mut self, instrs: &[Instr]) -> WordResult {
        self.exec_instrs("(unchecked)", 0, &[], instrs)
    }

    fn invoke(&mut self, name: &str, overload: usize, def: &Overload) -> WordResult {
        trace!(word = name, overload, "invoke");
        match &def.body {
            Body::Native(f) => f(self),
            Body::Composed(instrs) => self.exec_instrs(name, overload, &[], instrs),
            Body::ShapeCtor(shape) => self.construct_shape(shape),
            Body::EnumCtor { enum_name, variant } => self.construct_enum(enum_name, variant),
        }
    }

    pub(crate) fn exec_instrs(
        &mut self,
        word: &str,
        overload: usize,
        base: &[u32],
        instrs: &[Instr],
    ) -> WordResult {
        for (i, instr) in instrs.iter().enumerate() {
            match instr {
                Instr::Push(literal) => self.stack.push(Object::from_literal(literal))?,
                Instr::Block(block) => {
                    let mut path = base.to_vec();
                    path.push(i as u32);
                    self.stack.push(Object::WordRef(WordRef::Block(BlockRef {
                        word: Rc::new(word.to_string()),
                        overload,
                        path,
                        instrs: block.clone(),
                    })))?;
                }
                Instr::Call(callee) => {
                    let mut path = base.to_vec();
                    path.push(i as u32);
                    self.exec_call(word, overload, &path, callee)?;
                }
            }
        }
        Ok(())
    }

    fn exec_call(&mut self, word: &str, overload: usize, path: &[u32], callee: &str) -> WordResult {
        let registry = self.registry;
        let overloads = registry
            .overloads(callee)
            .ok_or_else(|| RuntimeError::fault(word, format!("unknown word {}", callee)))?;

        match self.plans {
            Some(plans) => {
                let key = (word.to_string(), overload, path.to_vec());
                let plan = plans.get(&key).ok_or_else(|| {
                    RuntimeError::fault(word, format!("no plan for call to {} at {:?}", callee, path))
                })?;
                let idx = match &plan.resolution {
                    Resolution::Static(idx) => *idx,
                    Resolution::ByVariant(table) => self.dispatch_variant(word, callee, table)?,
                };
                let def = overloads.get(idx).ok_or_else(|| {
                    RuntimeError::fault(word, format!("plan names overload {}#{}", callee, idx))
                })?;
                let consumed = plan.consumed;
                let produced = plan.produced;
                let depth_before = self.stack.len();
                self.invoke(callee, idx, def)?;
                // Defensive only: the verifier is assumed sound, and any
                // disagreement here is fatal, never corrected.
                let expected = depth_before
                    .checked_sub(consumed)
                    .map(|d| d + produced)
                    .ok_or_else(|| {
                        RuntimeError::fault(
                            word,
                            format!("plan for {} consumed more than was present", callee),
                        )
                    })?;
                if self.stack.len() != expected {
                    return Err(RuntimeError::fault(
                        word,
                        format!(
                            "{} changed stack depth {} -> {}, plan said {}",
                            callee,
                            depth_before,
                            self.stack.len(),
                            expected
                        ),
                    ));
                }
                Ok(())
            }
            None => {
                let idx = self.resolve_dynamic(callee, overloads)?;
                let def = &overloads[idx];
                self.invoke(callee, idx, def)
            }
        }
    }

    fn dispatch_variant(
        &self,
        word: &str,
        callee: &str,
        table: &HashMap<String, usize>,
    ) -> Result<usize, RuntimeError> {
        let near = self
            .stack
            .peek()
            .ok_or_else(|| RuntimeError::fault(word, "variant dispatch on empty stack"))?;
        let Object::EnumInstance(instance) = near else {
            return Err(RuntimeError::fault(
                word,
                format!("variant dispatch of {} on non-enum {}", callee, near),
            ));
        };
        table.get(&instance.variant).copied().ok_or_else(|| {
            RuntimeError::fault(
                word,
                format!("variant {} missing from {} dispatch", instance.variant, callee),
            )
        })
    }

    /// First declared overload whose input window matches the concrete
    /// stack. Only reachable in unchecked mode.
    fn resolve_dynamic(&mut self, callee: &str, overloads: &[Overload]) -> Result<usize, RuntimeError> {
        'candidate: for (idx, candidate) in overloads.iter().enumerate() {
            let arity = candidate.effect.inputs.len();
            if self.stack.len() < arity {
                continue;
            }
            let mut tags: HashMap<String, SlotType> = HashMap::new();
            for (j, slot) in candidate.effect.inputs.iter().enumerate() {
                let value = self.stack.peek_at(arity - 1 - j).unwrap().clone();
                if !self.matches_concrete(slot, &value, &mut tags)? {
                    continue 'candidate;
                }
            }
            return Ok(idx);
        }
        Err(RuntimeError::fault(
            callee,
            "no overload matches the concrete stack",
        ))
    }

    fn matches_concrete(
        &self,
        slot: &Slot,
        value: &Object,
        tags: &mut HashMap<String, SlotType>,
    ) -> Result<bool, RuntimeError> {
        if !value.matches_type(&slot.ty) {
            return Ok(false);
        }
        if let Some(tag) = &slot.generic {
            let actual = value.slot_type();
            match tags.get(tag) {
                Some(bound) => {
                    if *bound != actual {
                        return Ok(false);
                    }
                }
                None => {
                    tags.insert(tag.clone(), actual);
                }
            }
        }
        match &slot.refinement {
            None => {}
            Some(Refinement::Literal(literal)) => {
                if !value.matches_literal(literal) {
                    return Ok(false);
                }
            }
            Some(Refinement::Variant(variant)) => {
                let Object::EnumInstance(instance) = value else {
                    return Ok(false);
                };
                if instance.variant != *variant {
                    return Ok(false);
                }
            }
            Some(Refinement::Fields(fields)) => {
                let Object::ShapeInstance(instance) = value else {
                    return Ok(false);
                };
                for (field, literal) in fields {
                    match instance.field(field) {
                        Some(actual) if actual.matches_literal(literal) => {}
                        _ => return Ok(false),
                    }
                }
            }
            Some(Refinement::Predicate(block)) => {
                let mut sub = Machine::unchecked(self.registry);
                sub.stack.push(value.clone())?;
                sub.eval_unchecked(block)?;
                match sub.stack.pop()? {
                    Object::Boolean(b) => {
                        if !b {
                            return Ok(false);
                        }
                    }
                    other => {
                        return Err(RuntimeError::fault(
                            "predicate",
                            format!("predicate yielded {}", other),
                        ));
                    }
                }
            }
        }
        // Block-effect slots: any callable is structurally acceptable here;
        // conformance is the verifier's job.
        Ok(true)
    }

    fn construct_shape(&mut self, name: &str) -> WordResult {
        let registry = self.registry;
        let def = registry
            .shapes
            .get(name)
            .ok_or_else(|| RuntimeError::fault(name, "constructor for unregistered shape"))?;
        let mut values = Vec::with_capacity(def.fields.len());
        for _ in 0..def.fields.len() {
            values.push(self.stack.pop()?);
        }
        values.reverse();
        let instance = Object::new_shape(def, values)
            .map_err(|e| RuntimeError::fault(name, e.to_string()))?;
        self.stack.push(instance)
    }

    fn construct_enum(&mut self, enum_name: &str, variant: &str) -> WordResult {
        let registry = self.registry;
        let def = registry
            .enums
            .get(enum_name)
            .ok_or_else(|| RuntimeError::fault(enum_name, "constructor for unregistered enum"))?;
        let payload = match def.variant(variant).and_then(|v| v.payload.as_ref()) {
            Some(_) => Some(self.stack.pop()?),
            None => None,
        };
        let instance = Object::new_enum(def, variant, payload)
            .map_err(|e| RuntimeError::fault(enum_name, e.to_string()))?;
        self.stack.push(instance)
    }

    /// Run a captured block inline in this activation.
    pub(crate) fn apply_block(&mut self, block: &BlockRef) -> WordResult {
        let word = block.word.to_string();
        self.exec_instrs(&word, block.overload, &block.path, &block.instrs)
    }

    /// Invoke a named word by dynamic resolution. Only the unchecked mode
    /// can reach this; verified programs admit blocks, not named refs, at
    /// apply sites.
    pub(crate) fn apply_named(&mut self, name: &str) -> WordResult {
        let registry = self.registry;
        let overloads = registry
            .overloads(name)
            .ok_or_else(|| RuntimeError::fault(name, "applied unknown word"))?;
        let idx = self.resolve_dynamic(name, overloads)?;
        let def = &overloads[idx];
        self.invoke(name, idx, def)
    }
}
