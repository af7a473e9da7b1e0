/**
Native prelude words

Stack shuffles, arithmetic, comparisons, and block application, each
registered with the signature the verifier checks against. Arithmetic is
overloaded per numeric kind; the overloads are unbounded but type-distinct,
so declaration order settles nothing and ambiguity checks stay quiet.
*/
use crate::engine::errors::{RuntimeError, WordResult};
use crate::engine::machine::Machine;
use crate::object::{Object, WordRef};
use crate::registry::{Body, Effect, Overload, Registry, Slot, SlotType};

/// Register the prelude into a registry.
pub fn install_prelude(registry: &mut Registry) {
    let native = |inputs: Vec<Slot>, outputs: Vec<Slot>, f: fn(&mut Machine) -> WordResult| {
        Overload::new(Effect::new(inputs, outputs), Body::Native(f))
    };

    // stack shuffles
    registry.define_word(
        "dup",
        native(
            vec![Slot::generic("a")],
            vec![Slot::generic("a"), Slot::generic("a")],
            prim_word_dup,
        ),
    );
    registry.define_word("drop", native(vec![Slot::generic("a")], vec![], prim_word_drop));
    registry.define_word(
        "swap",
        native(
            vec![Slot::generic("a"), Slot::generic("b")],
            vec![Slot::generic("b"), Slot::generic("a")],
            prim_word_swap,
        ),
    );
    registry.define_word(
        "rot",
        native(
            vec![Slot::generic("a"), Slot::generic("b"), Slot::generic("c")],
            vec![Slot::generic("b"), Slot::generic("c"), Slot::generic("a")],
            prim_word_rot,
        ),
    );

    // arithmetic, one overload per numeric kind
    for ty in [SlotType::UnsignedInt, SlotType::SignedInt, SlotType::Float] {
        let binary = |f| {
            native(
                vec![Slot::typed(ty.clone()), Slot::typed(ty.clone())],
                vec![Slot::typed(ty.clone())],
                f,
            )
        };
        registry.define_word("+", binary(prim_word_add));
        registry.define_word("-", binary(prim_word_sub));
        registry.define_word("*", binary(prim_word_mul));
        registry.define_word("/", binary(prim_word_div));

        let compare = |f| {
            native(
                vec![Slot::typed(ty.clone()), Slot::typed(ty.clone())],
                vec![Slot::typed(SlotType::Boolean)],
                f,
            )
        };
        registry.define_word("<", compare(prim_word_lt));
        registry.define_word(">", compare(prim_word_gt));
    }

    registry.define_word(
        "=",
        native(
            vec![Slot::generic("a"), Slot::generic("a")],
            vec![Slot::typed(SlotType::Boolean)],
            prim_word_eq,
        ),
    );

    // apply ( a block(a -- b) -- b ): run a captured block inline in the
    // caller's own activation.
    registry.define_word(
        "apply",
        native(
            vec![
                Slot::generic("a"),
                Slot::block(Effect::new(
                    vec![Slot::generic("a")],
                    vec![Slot::generic("b")],
                )),
            ],
            vec![Slot::generic("b")],
            prim_word_apply,
        ),
    );
}

fn prim_word_dup(machine: &mut Machine) -> WordResult {
    // dup always shares heap payloads; values are never deep-copied
    let near = machine.stack.pop()?;
    machine.stack.push(near.clone())?;
    machine.stack.push(near)
}

fn prim_word_drop(machine: &mut Machine) -> WordResult {
    machine.stack.pop().map(|_| ())
}

fn prim_word_swap(machine: &mut Machine) -> WordResult {
    let (near, far) = machine.stack.pop_pair()?;
    machine.stack.push(near)?;
    machine.stack.push(far)
}

fn prim_word_rot(machine: &mut Machine) -> WordResult {
    let (near, far, farther) = machine.stack.pop_trio()?;
    machine.stack.push(far)?;
    machine.stack.push(near)?;
    machine.stack.push(farther)
}

fn prim_word_add(machine: &mut Machine) -> WordResult {
    let (near, far) = machine.stack.pop_pair()?;
    machine.stack.push(match (&far, &near) {
        (Object::UnsignedInt(l), Object::UnsignedInt(r)) => Object::UnsignedInt(l.wrapping_add(*r)),
        (Object::SignedInt(l), Object::SignedInt(r)) => Object::SignedInt(l.wrapping_add(*r)),
        (Object::Float(l), Object::Float(r)) => Object::Float(l + r),
        (_, _) => return Err(incompatible("+", &far, &near)),
    })
}

fn prim_word_sub(machine: &mut Machine) -> WordResult {
    let (to_subtract, subtract_from) = machine.stack.pop_pair()?;
    machine.stack.push(match (&subtract_from, &to_subtract) {
        (Object::UnsignedInt(sf), Object::UnsignedInt(ts)) => {
            Object::UnsignedInt(sf.wrapping_sub(*ts))
        }
        (Object::SignedInt(sf), Object::SignedInt(ts)) => Object::SignedInt(sf.wrapping_sub(*ts)),
        (Object::Float(sf), Object::Float(ts)) => Object::Float(sf - ts),
        (_, _) => return Err(incompatible("-", &subtract_from, &to_subtract)),
    })
}

fn prim_word_mul(machine: &mut Machine) -> WordResult {
    let (near, far) = machine.stack.pop_pair()?;
    machine.stack.push(match (&far, &near) {
        (Object::UnsignedInt(l), Object::UnsignedInt(r)) => Object::UnsignedInt(l.wrapping_mul(*r)),
        (Object::SignedInt(l), Object::SignedInt(r)) => Object::SignedInt(l.wrapping_mul(*r)),
        (Object::Float(l), Object::Float(r)) => Object::Float(l * r),
        (_, _) => return Err(incompatible("*", &far, &near)),
    })
}

fn prim_word_div(machine: &mut Machine) -> WordResult {
    let (divisor, dividend) = machine.stack.pop_pair()?;
    machine.stack.push(match (&dividend, &divisor) {
        // division by zero is excluded by the word's contract; reaching it
        // means the caller's refinements were unsound
        (_, Object::UnsignedInt(0)) | (_, Object::SignedInt(0)) => {
            return Err(RuntimeError::fault("/", "division by zero reached the engine"));
        }
        (_, Object::Float(x)) if *x == 0.0 => {
            return Err(RuntimeError::fault("/", "division by zero reached the engine"));
        }
        (Object::UnsignedInt(dend), Object::UnsignedInt(dsor)) => Object::UnsignedInt(dend / dsor),
        (Object::SignedInt(dend), Object::SignedInt(dsor)) => Object::SignedInt(dend / dsor),
        (Object::Float(dend), Object::Float(dsor)) => Object::Float(dend / dsor),
        (_, _) => return Err(incompatible("/", &dividend, &divisor)),
    })
}

fn prim_word_lt(machine: &mut Machine) -> WordResult {
    let (near, far) = machine.stack.pop_pair()?;
    machine.stack.push(Object::Boolean(match (&far, &near) {
        (Object::UnsignedInt(l), Object::UnsignedInt(r)) => l < r,
        (Object::SignedInt(l), Object::SignedInt(r)) => l < r,
        (Object::Float(l), Object::Float(r)) => l < r,
        (_, _) => return Err(incompatible("<", &far, &near)),
    }))
}

fn prim_word_gt(machine: &mut Machine) -> WordResult {
    let (near, far) = machine.stack.pop_pair()?;
    machine.stack.push(Object::Boolean(match (&far, &near) {
        (Object::UnsignedInt(l), Object::UnsignedInt(r)) => l > r,
        (Object::SignedInt(l), Object::SignedInt(r)) => l > r,
        (Object::Float(l), Object::Float(r)) => l > r,
        (_, _) => return Err(incompatible(">", &far, &near)),
    }))
}

fn prim_word_eq(machine: &mut Machine) -> WordResult {
    let (near, far) = machine.stack.pop_pair()?;
    machine.stack.push(Object::Boolean(far == near))
}

fn prim_word_apply(machine: &mut Machine) -> WordResult {
    match machine.stack.pop()? {
        Object::WordRef(WordRef::Block(block)) => machine.apply_block(&block),
        Object::WordRef(WordRef::Named(name)) => machine.apply_named(&name),
        other => Err(RuntimeError::fault(
            "apply",
            format!("expected a callable, found {}", other),
        )),
    }
}

fn incompatible(word: &str, left: &Object, right: &Object) -> RuntimeError {
    RuntimeError::fault(
        word,
        format!(
            "incompatible operands {} and {}",
            left.slot_type(),
            right.slot_type()
        ),
    )
}
