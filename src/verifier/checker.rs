/**
Signature verifier for Loom

A symbolic executor over the abstract stack. For every composed overload it
walks the body's call sequence, resolves each call against the callee's
overload set in declaration order, tracks generic bindings and affine
liveness, and proves the final stack matches the declared outputs. Nothing
executes at runtime that was not proved here first: the verifier records a
call plan per call site and the engine follows those plans exactly.
*/
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::engine::Machine;
use crate::engine::errors::RuntimeError;
use crate::object::Object;
use crate::registry::{Body, Effect, Instr, Overload, Refinement, Registry, Slot, SlotType};
use crate::stack::Stack;
use crate::verifier::abstract_stack::{AbstractSlot, AbstractStack, BlockInfo};
use crate::verifier::errors::{BuildError, BuildResult};

/// Identifies one call site: enclosing word, overload index, and the
/// instruction path (nested block indices included) of the Call.
pub type PlanKey = (String, usize, Vec<u32>);

/// How a call site resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// One overload, chosen statically.
    Static(usize),
    /// Closed-set dispatch over an enum of statically-unknown variant:
    /// variant name to overload index, every variant covered.
    ByVariant(HashMap<String, usize>),
}

/// The verifier's decision for one call site. The engine's stack-depth
/// delta must agree with consumed/produced or execution faults.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub callee: String,
    pub resolution: Resolution,
    pub consumed: usize,
    pub produced: usize,
}

/// Proof that a registry verified. Owning one is the only way to run.
pub struct VerifiedProgram<'r> {
    pub registry: &'r Registry,
    plans: HashMap<PlanKey, CallPlan>,
}

impl<'r> VerifiedProgram<'r> {
    pub fn plan(&self, word: &str, overload: usize, path: &[u32]) -> Option<&CallPlan> {
        self.plans
            .get(&(word.to_string(), overload, path.to_vec()))
    }

    pub(crate) fn plans(&self) -> &HashMap<PlanKey, CallPlan> {
        &self.plans
    }

    /// Execute the entry word (which must have an empty input signature) on
    /// a fresh stack and hand the final stack back to the host.
    pub fn run(&self, entry: &str) -> Result<Stack, RuntimeError> {
        let mut machine = Machine::checked(self);
        machine.run_entry(entry)?;
        Ok(machine.into_stack())
    }
}

/// Verify every composed overload in the registry. All errors are reported;
/// execution is impossible unless this returns the proof.
pub fn verify(registry: &Registry) -> Result<VerifiedProgram<'_>, Vec<BuildError>> {
    let mut checker = Checker {
        registry,
        plans: HashMap::new(),
    };
    let mut errors = check_contracts(registry);

    let mut names: Vec<&String> = registry.word_names().collect();
    names.sort();

    for name in names {
        let overloads = registry.overloads(name).unwrap();
        errors.extend(check_set_ambiguity(name, overloads));
        for (idx, overload) in overloads.iter().enumerate() {
            if let Body::Composed(body) = &overload.body {
                if let Err(e) = checker.check_overload(name, idx, overload, body) {
                    errors.push(e);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(VerifiedProgram {
            registry,
            plans: checker.plans,
        })
    } else {
        Err(errors)
    }
}

/// Two definitions whose input types and refinements are indistinguishable
/// can never both be reachable; declaration order is not allowed to paper
/// over that.
fn check_set_ambiguity(name: &str, overloads: &[Overload]) -> Vec<BuildError> {
    let mut errors = Vec::new();
    for i in 0..overloads.len() {
        for j in i + 1..overloads.len() {
            let a = &overloads[i].effect.inputs;
            let b = &overloads[j].effect.inputs;
            if a.len() != b.len() {
                continue;
            }
            let same = a.iter().zip(b).all(|(x, y)| {
                x.ty == y.ty && x.refinement == y.refinement
            });
            if same {
                let reason = if overloads[i].is_bounded() {
                    "carry identical refinements".to_string()
                } else {
                    "are both unbounded over identical inputs".to_string()
                };
                errors.push(BuildError::AmbiguousOverload {
                    word: name.to_string(),
                    first: i,
                    second: j,
                    reason,
                });
            }
        }
    }
    errors
}

/// Explicit contract claims: every contract a shape names must exist and be
/// satisfied by a provided word of the required signature.
fn check_contracts(registry: &Registry) -> Vec<BuildError> {
    let mut errors = Vec::new();
    let mut shapes: Vec<&String> = registry.shapes.keys().collect();
    shapes.sort();
    for name in shapes {
        let shape = &registry.shapes[name];
        for claim in &shape.contracts {
            match registry.contracts.get(claim) {
                None => errors.push(BuildError::UnknownContract {
                    shape: name.clone(),
                    contract: claim.clone(),
                }),
                Some(contract) => {
                    if !registry.shape_satisfies(name, contract) {
                        errors.push(BuildError::ContractUnsatisfied {
                            shape: name.clone(),
                            contract: contract.name.clone(),
                            word: contract.word.clone(),
                            required: contract.instantiate(name).to_string(),
                        });
                    }
                }
            }
        }
    }
    errors
}

/// For each output slot, the input window position whose generic tag it
/// reasserts, if any.
fn surviving_inputs(effect: &Effect) -> Vec<Option<usize>> {
    effect
        .outputs
        .iter()
        .map(|out| {
            out.generic.as_ref().and_then(|tag| {
                effect
                    .inputs
                    .iter()
                    .position(|inp| inp.generic.as_deref() == Some(tag.as_str()))
            })
        })
        .collect()
}

#[derive(Clone, Copy)]
struct Site<'a> {
    word: &'a str,
    overload: usize,
}

enum MatchOutcome {
    /// Candidate matches; tag name to the matched abstract slot.
    Match(HashMap<String, AbstractSlot>),
    NoMatch,
    Underflow { required: usize },
}

struct Checker<'r> {
    registry: &'r Registry,
    plans: HashMap<PlanKey, CallPlan>,
}

impl<'r> Checker<'r> {
    fn check_overload(
        &mut self,
        word: &str,
        overload: usize,
        def: &Overload,
        body: &[Instr],
    ) -> BuildResult<()> {
        let site = Site { word, overload };
        let mut stack = AbstractStack::new();
        let mut binding_tags: Vec<String> = Vec::new();
        let mut input_bindings: HashMap<String, usize> = HashMap::new();

        for slot in &def.effect.inputs {
            let mut abs = AbstractSlot::of_type(slot.ty.clone());
            match &slot.refinement {
                Some(Refinement::Literal(l)) => abs.literal = Some(l.clone()),
                Some(Refinement::Variant(v)) => abs.variant = Some(v.clone()),
                Some(Refinement::Fields(fields)) => {
                    abs.fields = Some(fields.iter().cloned().collect());
                }
                Some(Refinement::Predicate(_)) | None => {}
            }
            if let Some(tag) = &slot.generic {
                let binding = *input_bindings.entry(tag.clone()).or_insert_with(|| {
                    binding_tags.push(tag.clone());
                    binding_tags.len() - 1
                });
                abs.binding = Some(binding);
            }
            stack.push(abs);
        }

        self.simulate_body(site, &[], true, body, &mut stack, &mut binding_tags)?;

        // Affine accounting first: a surplus live occurrence is a leak even
        // when the overall shape also disagrees.
        for (tag, binding) in &input_bindings {
            let live = stack.live_count(*binding);
            let declared = def
                .effect
                .outputs
                .iter()
                .filter(|s| s.generic.as_deref() == Some(tag))
                .count();
            if live > declared {
                return Err(BuildError::AffineLeak {
                    word: word.to_string(),
                    overload,
                    tag: tag.clone(),
                    live,
                    declared,
                });
            }
        }

        if stack.len() != def.effect.outputs.len() {
            return Err(BuildError::TypeMismatch {
                word: word.to_string(),
                overload,
                context: "declared outputs".to_string(),
                expected: def.effect.to_string(),
                actual: stack.to_string(),
            });
        }
        for (out_slot, abs) in def.effect.outputs.iter().zip(stack.slots()) {
            if out_slot.ty != SlotType::Any && out_slot.ty != abs.ty {
                return Err(BuildError::TypeMismatch {
                    word: word.to_string(),
                    overload,
                    context: "declared outputs".to_string(),
                    expected: out_slot.ty.to_string(),
                    actual: abs.ty.to_string(),
                });
            }
            // A tag declared on input and reasserted on output means the
            // same value must survive, not merely one of the same type.
            if let Some(tag) = &out_slot.generic {
                if let Some(binding) = input_bindings.get(tag) {
                    if abs.binding != Some(*binding) {
                        return Err(BuildError::TypeMismatch {
                            word: word.to_string(),
                            overload,
                            context: format!("output binding '{}'", tag),
                            expected: "the input value to survive".to_string(),
                            actual: "a different value".to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn simulate_body(
        &mut self,
        site: Site<'_>,
        base: &[u32],
        record: bool,
        instrs: &[Instr],
        stack: &mut AbstractStack,
        binding_tags: &mut Vec<String>,
    ) -> BuildResult<()> {
        for (i, instr) in instrs.iter().enumerate() {
            match instr {
                Instr::Push(literal) => {
                    stack.push(AbstractSlot::known_literal(literal.clone()));
                }
                Instr::Block(block) => {
                    let mut path = base.to_vec();
                    path.push(i as u32);
                    let mut slot = AbstractSlot::of_type(SlotType::Word);
                    slot.block = Some(BlockInfo {
                        instrs: block.clone(),
                        path,
                    });
                    stack.push(slot);
                }
                Instr::Call(callee) => {
                    let mut path = base.to_vec();
                    path.push(i as u32);
                    self.resolve_call(site, &path, record, callee, stack, binding_tags)?;
                }
            }
        }
        Ok(())
    }

    /// Steps 1-6 of the resolution algorithm for one call site.
    fn resolve_call(
        &mut self,
        site: Site<'_>,
        path: &[u32],
        record: bool,
        callee: &str,
        stack: &mut AbstractStack,
        binding_tags: &mut Vec<String>,
    ) -> BuildResult<()> {
        let registry = self.registry;
        let overloads = registry
            .overloads(callee)
            .filter(|set| !set.is_empty())
            .ok_or_else(|| BuildError::UnknownWord {
                word: site.word.to_string(),
                overload: site.overload,
                callee: callee.to_string(),
                stack: stack.to_string(),
            })?;

        let mut selected: Option<(usize, HashMap<String, AbstractSlot>)> = None;
        let mut min_required: Option<usize> = None;
        let mut saw_non_underflow = false;
        for (idx, candidate) in overloads.iter().enumerate() {
            match self.match_candidate(site, candidate, stack, binding_tags)? {
                MatchOutcome::Match(local) => {
                    selected = Some((idx, local));
                    break;
                }
                MatchOutcome::NoMatch => saw_non_underflow = true,
                MatchOutcome::Underflow { required } => {
                    min_required =
                        Some(min_required.map_or(required, |m: usize| m.min(required)));
                }
            }
        }

        let (idx, local) = match selected {
            Some(found) => found,
            None => {
                if !saw_non_underflow {
                    return Err(BuildError::StackUnderflow {
                        word: site.word.to_string(),
                        overload: site.overload,
                        callee: callee.to_string(),
                        required: min_required.unwrap_or(0),
                        available: stack.len(),
                    });
                }
                return self.resolve_by_variant(
                    site,
                    path,
                    record,
                    callee,
                    overloads,
                    stack,
                    binding_tags,
                );
            }
        };

        let candidate = &overloads[idx];
        debug!(
            word = site.word,
            callee, overload = idx, "resolved call site statically"
        );

        // Affine enforcement happens after selection, against the stack as
        // it stands at the call.
        self.check_affine(site, callee, candidate, stack)?;

        // Conformance was probed without recording during matching; now
        // that the candidate is selected, record plans for any statically
        // known blocks it consumes.
        if record {
            let arity = candidate.effect.inputs.len();
            let window = stack.top_window(arity).unwrap().to_vec();
            let mut local_rerun = local.clone();
            for (slot, abs) in candidate.effect.inputs.iter().zip(&window) {
                if let (Some(effect), Some(info)) = (&slot.block_effect, &abs.block) {
                    self.check_block_conforms(
                        site,
                        true,
                        effect,
                        info,
                        &mut local_rerun,
                        binding_tags,
                    )?;
                }
            }
        }

        let window = stack.pop_window(candidate.effect.inputs.len());
        let ctor_fields = self.ctor_field_knowledge(candidate, &window);
        self.push_outputs(candidate, &local, ctor_fields, stack, binding_tags);

        if record {
            self.record_plan(
                site,
                path,
                CallPlan {
                    callee: callee.to_string(),
                    resolution: Resolution::Static(idx),
                    consumed: candidate.effect.inputs.len(),
                    produced: candidate.effect.outputs.len(),
                },
            )?;
        }
        Ok(())
    }

    /// No candidate matched outright. When the near slot is an enum of
    /// statically-unknown variant, the set may still be sound if every
    /// variant is individually covered.
    #[allow(clippy::too_many_arguments)]
    fn resolve_by_variant(
        &mut self,
        site: Site<'_>,
        path: &[u32],
        record: bool,
        callee: &str,
        overloads: &[Overload],
        stack: &mut AbstractStack,
        binding_tags: &mut Vec<String>,
    ) -> BuildResult<()> {
        let non_exhaustive = |missing: Vec<String>| BuildError::NonExhaustiveMatch {
            word: site.word.to_string(),
            overload: site.overload,
            callee: callee.to_string(),
            stack: stack.to_string(),
            missing,
        };

        let enum_name = match stack.slots().last() {
            Some(AbstractSlot {
                ty: SlotType::Enum(name),
                variant: None,
                ..
            }) => name.clone(),
            _ => return Err(non_exhaustive(vec![])),
        };
        let def = match self.registry.enums.get(&enum_name) {
            Some(def) => def,
            None => return Err(non_exhaustive(vec![])),
        };

        let mut table: HashMap<String, usize> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for variant in &def.variants {
            let mut probe = stack.clone();
            let mut near = probe.pop().unwrap();
            near.variant = Some(variant.name.clone());
            probe.push(near);

            let mut covered = None;
            for (idx, candidate) in overloads.iter().enumerate() {
                if let MatchOutcome::Match(_) =
                    self.match_candidate(site, candidate, &probe, binding_tags)?
                {
                    covered = Some(idx);
                    break;
                }
            }
            match covered {
                Some(idx) => {
                    table.insert(variant.name.clone(), idx);
                }
                None => missing.push(variant.name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(non_exhaustive(missing));
        }

        // Every branch must agree on arity, output types, and which input
        // slots survive to which outputs, or a single propagated abstract
        // stack cannot exist.
        let mut chosen: Vec<usize> = table.values().copied().collect();
        chosen.sort_unstable();
        chosen.dedup();
        let first = &overloads[chosen[0]].effect;
        let survivors = surviving_inputs(first);
        for idx in &chosen[1..] {
            let other = &overloads[*idx].effect;
            let outputs_agree = first.outputs.len() == other.outputs.len()
                && first
                    .outputs
                    .iter()
                    .zip(&other.outputs)
                    .all(|(a, b)| a.ty == b.ty);
            if first.inputs.len() != other.inputs.len()
                || !outputs_agree
                || surviving_inputs(other) != survivors
            {
                return Err(BuildError::TypeMismatch {
                    word: site.word.to_string(),
                    overload: site.overload,
                    context: format!("variant dispatch branches of {}", callee),
                    expected: first.to_string(),
                    actual: other.to_string(),
                });
            }
        }

        debug!(
            word = site.word,
            callee,
            enum_name = %enum_name,
            branches = table.len(),
            "resolved call site by variant dispatch"
        );

        let consumed = first.inputs.len();
        let produced = first.outputs.len();
        let window = stack.pop_window(consumed);
        for (out_slot, survivor) in first.outputs.iter().zip(&survivors) {
            if let Some(j) = survivor {
                // a tag carried input to output by every branch means the
                // caller's value survives, binding included
                stack.push(window[*j].clone());
                continue;
            }
            let mut abs = AbstractSlot::of_type(out_slot.ty.clone());
            if let Some(tag) = &out_slot.generic {
                binding_tags.push(tag.clone());
                abs.binding = Some(binding_tags.len() - 1);
            }
            stack.push(abs);
        }

        if record {
            self.record_plan(
                site,
                path,
                CallPlan {
                    callee: callee.to_string(),
                    resolution: Resolution::ByVariant(table),
                    consumed,
                    produced,
                },
            )?;
        }
        Ok(())
    }

    /// Structural match of a candidate's input window against the abstract
    /// stack top. Errors are reserved for defects in the candidate itself
    /// (a misfit predicate, a non-conforming block); everything else is
    /// NoMatch so the next candidate gets its turn.
    fn match_candidate(
        &mut self,
        site: Site<'_>,
        candidate: &Overload,
        stack: &AbstractStack,
        binding_tags: &mut Vec<String>,
    ) -> BuildResult<MatchOutcome> {
        let arity = candidate.effect.inputs.len();
        let window = match stack.top_window(arity) {
            Some(window) => window.to_vec(),
            None => return Ok(MatchOutcome::Underflow { required: arity }),
        };

        let mut local: HashMap<String, AbstractSlot> = HashMap::new();
        for (slot, abs) in candidate.effect.inputs.iter().zip(&window) {
            if slot.ty != SlotType::Any && slot.ty != abs.ty {
                return Ok(MatchOutcome::NoMatch);
            }
            if let Some(tag) = &slot.generic {
                match local.get(tag).map(|previous| previous.ty.clone()) {
                    Some(previous_ty) => {
                        if previous_ty != abs.ty {
                            return Ok(MatchOutcome::NoMatch);
                        }
                    }
                    None => {
                        local.insert(tag.clone(), abs.clone());
                    }
                }
            }
            match &slot.refinement {
                None => {}
                Some(Refinement::Literal(expected)) => {
                    if abs.literal.as_ref() != Some(expected) {
                        return Ok(MatchOutcome::NoMatch);
                    }
                }
                Some(Refinement::Variant(expected)) => {
                    if abs.variant.as_deref() != Some(expected.as_str()) {
                        return Ok(MatchOutcome::NoMatch);
                    }
                }
                Some(Refinement::Fields(expected)) => {
                    let Some(known) = &abs.fields else {
                        return Ok(MatchOutcome::NoMatch);
                    };
                    for (field, literal) in expected {
                        if known.get(field) != Some(literal) {
                            return Ok(MatchOutcome::NoMatch);
                        }
                    }
                }
                Some(Refinement::Predicate(block)) => {
                    // Only a statically-known value can satisfy a predicate;
                    // anything else falls through to the unbounded fallback.
                    let Some(literal) = abs.literal.clone() else {
                        return Ok(MatchOutcome::NoMatch);
                    };
                    let fit = Effect::new(
                        vec![Slot::typed(abs.ty.clone())],
                        vec![Slot::typed(SlotType::Boolean)],
                    );
                    let info = BlockInfo {
                        instrs: block.clone(),
                        path: Vec::new(),
                    };
                    let mut scratch = HashMap::new();
                    self.check_block_conforms(site, false, &fit, &info, &mut scratch, binding_tags)?;
                    if !self.eval_predicate(site, &literal, block)? {
                        return Ok(MatchOutcome::NoMatch);
                    }
                }
            }
            if let Some(effect) = &slot.block_effect {
                let Some(info) = abs.block.clone() else {
                    return Ok(MatchOutcome::NoMatch);
                };
                self.check_block_conforms(site, false, effect, &info, &mut local, binding_tags)?;
            }
        }
        Ok(MatchOutcome::Match(local))
    }

    /// A slot with an explicit requirement of exactly N live occurrences
    /// must find at least N on the abstract stack; the leak side of
    /// "exactly" is enforced at the end of the enclosing body.
    fn check_affine(
        &self,
        site: Site<'_>,
        callee: &str,
        candidate: &Overload,
        stack: &AbstractStack,
    ) -> BuildResult<()> {
        let arity = candidate.effect.inputs.len();
        let window = stack.top_window(arity).unwrap();
        for (slot, abs) in candidate.effect.inputs.iter().zip(window) {
            let Some(required) = slot.affine else {
                continue;
            };
            let found = match abs.binding {
                Some(binding) => stack.live_count(binding),
                None => 1,
            };
            if found < required {
                return Err(BuildError::AffineUnderflow {
                    word: site.word.to_string(),
                    overload: site.overload,
                    callee: callee.to_string(),
                    tag: slot.generic.clone().unwrap_or_else(|| "_".to_string()),
                    required,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Simulate a statically-known block against a required effect. Inputs
    /// bound to outer tags reuse the outer knowledge; output tags not yet
    /// bound capture the block's actual results so the consuming word's
    /// outputs inherit them.
    fn check_block_conforms(
        &mut self,
        site: Site<'_>,
        record: bool,
        effect: &Effect,
        info: &BlockInfo,
        local: &mut HashMap<String, AbstractSlot>,
        binding_tags: &mut Vec<String>,
    ) -> BuildResult<()> {
        let mut sim = AbstractStack::new();
        for slot in &effect.inputs {
            match slot.generic.as_ref().and_then(|tag| local.get(tag)) {
                Some(bound) => sim.push(bound.clone()),
                None => sim.push(AbstractSlot::of_type(slot.ty.clone())),
            }
        }
        self.simulate_body(site, &info.path, record, &info.instrs, &mut sim, binding_tags)?;

        let mismatch = |expected: String, actual: String| BuildError::TypeMismatch {
            word: site.word.to_string(),
            overload: site.overload,
            context: "block effect".to_string(),
            expected,
            actual,
        };
        if sim.len() != effect.outputs.len() {
            return Err(mismatch(effect.to_string(), sim.to_string()));
        }
        for (out_slot, abs) in effect.outputs.iter().zip(sim.slots()) {
            if out_slot.ty != SlotType::Any && out_slot.ty != abs.ty {
                return Err(mismatch(out_slot.ty.to_string(), abs.ty.to_string()));
            }
            if let Some(tag) = &out_slot.generic {
                local.entry(tag.clone()).or_insert_with(|| abs.clone());
            }
        }
        Ok(())
    }

    /// Constant-fold a refinement predicate against a known literal using
    /// the engine's unchecked evaluator.
    fn eval_predicate(
        &self,
        site: Site<'_>,
        literal: &crate::registry::Literal,
        block: &[Instr],
    ) -> BuildResult<bool> {
        let fold_error = |detail: String| BuildError::TypeMismatch {
            word: site.word.to_string(),
            overload: site.overload,
            context: "refinement predicate".to_string(),
            expected: "( value -- Boolean )".to_string(),
            actual: detail,
        };
        let mut machine = Machine::unchecked(self.registry);
        machine
            .stack
            .push(Object::from_literal(literal))
            .map_err(|e: RuntimeError| fold_error(e.to_string()))?;
        machine
            .eval_unchecked(block)
            .map_err(|e| fold_error(e.to_string()))?;
        if machine.stack.len() != 1 {
            return Err(fold_error(format!(
                "{} values left on the stack",
                machine.stack.len()
            )));
        }
        match machine.stack.pop() {
            Ok(Object::Boolean(b)) => Ok(b),
            Ok(other) => Err(fold_error(other.slot_type().to_string())),
            Err(e) => Err(fold_error(e.to_string())),
        }
    }

    /// A shape constructor's output remembers any field values that were
    /// statically known at the call, so field-refined overloads can match
    /// downstream.
    fn ctor_field_knowledge(
        &self,
        candidate: &Overload,
        window: &[AbstractSlot],
    ) -> Option<BTreeMap<String, crate::registry::Literal>> {
        let Body::ShapeCtor(name) = &candidate.body else {
            return None;
        };
        let def = self.registry.shapes.get(name)?;
        let mut fields = BTreeMap::new();
        for ((field, _), abs) in def.fields.iter().zip(window) {
            if let Some(literal) = &abs.literal {
                fields.insert(field.clone(), literal.clone());
            }
        }
        Some(fields)
    }

    fn push_outputs(
        &self,
        candidate: &Overload,
        local: &HashMap<String, AbstractSlot>,
        ctor_fields: Option<BTreeMap<String, crate::registry::Literal>>,
        stack: &mut AbstractStack,
        binding_tags: &mut Vec<String>,
    ) {
        let mut ctor_fields = ctor_fields;
        for out_slot in &candidate.effect.outputs {
            if let Some(bound) = out_slot.generic.as_ref().and_then(|tag| local.get(tag)) {
                // The tagged input value survives, carrying everything the
                // verifier knew about it.
                stack.push(bound.clone());
                continue;
            }
            let mut abs = AbstractSlot::of_type(out_slot.ty.clone());
            match &out_slot.refinement {
                Some(Refinement::Literal(l)) => abs.literal = Some(l.clone()),
                Some(Refinement::Variant(v)) => abs.variant = Some(v.clone()),
                _ => {}
            }
            if let Some(fields) = ctor_fields.take() {
                abs.fields = Some(fields);
            }
            if let Some(tag) = &out_slot.generic {
                binding_tags.push(tag.clone());
                abs.binding = Some(binding_tags.len() - 1);
            }
            stack.push(abs);
        }
    }

    /// A block reused under conflicting effects would leave two different
    /// plans for one site; refuse rather than let the engine pick.
    fn record_plan(&mut self, site: Site<'_>, path: &[u32], plan: CallPlan) -> BuildResult<()> {
        let key = (site.word.to_string(), site.overload, path.to_vec());
        if let Some(existing) = self.plans.get(&key) {
            if *existing != plan {
                return Err(BuildError::TypeMismatch {
                    word: site.word.to_string(),
                    overload: site.overload,
                    context: format!("call site {:?}", path),
                    expected: format!("a single resolution for {}", plan.callee),
                    actual: "conflicting resolutions for a reused block".to_string(),
                });
            }
            return Ok(());
        }
        self.plans.insert(key, plan);
        Ok(())
    }
}
