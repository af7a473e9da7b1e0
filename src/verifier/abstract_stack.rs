/// Symbolic stack for verification
///
/// A slot description records everything the verifier can know about one
/// stack position without running the program: its type, a known literal or
/// enum variant, known shape-field literals, a live generic binding, and
/// the instruction sequence of a statically-known block.
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::registry::{Instr, Literal, SlotType};

#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub instrs: Rc<Vec<Instr>>,
    /// Instruction path of the capture site within the overload under
    /// verification.
    pub path: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbstractSlot {
    pub ty: SlotType,
    pub literal: Option<Literal>,
    pub variant: Option<String>,
    pub fields: Option<BTreeMap<String, Literal>>,
    /// Live generic binding carried by this slot, if the value originated
    /// from (or survived through) a tagged input.
    pub binding: Option<usize>,
    pub block: Option<BlockInfo>,
}

impl AbstractSlot {
    pub fn of_type(ty: SlotType) -> Self {
        AbstractSlot {
            ty,
            literal: None,
            variant: None,
            fields: None,
            binding: None,
            block: None,
        }
    }

    pub fn known_literal(literal: Literal) -> Self {
        let ty = literal.slot_type();
        AbstractSlot {
            ty,
            literal: Some(literal),
            variant: None,
            fields: None,
            binding: None,
            block: None,
        }
    }

    pub fn with_binding(mut self, binding: usize) -> Self {
        self.binding = Some(binding);
        self
    }
}

impl fmt::Display for AbstractSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if let Some(literal) = &self.literal {
            write!(f, "={}", literal)?;
        }
        if let Some(variant) = &self.variant {
            write!(f, "::{}", variant)?;
        }
        if let Some(fields) = &self.fields {
            write!(f, "{{")?;
            for (name, value) in fields {
                write!(f, " {}: {}", name, value)?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}

/// The abstract stack: slot descriptions ordered bottom to top.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbstractStack {
    slots: Vec<AbstractSlot>,
}

impl AbstractStack {
    pub fn new() -> Self {
        AbstractStack::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, slot: AbstractSlot) {
        self.slots.push(slot);
    }

    pub fn pop(&mut self) -> Option<AbstractSlot> {
        self.slots.pop()
    }

    /// The top `n` slots, bottom to top. None if fewer are present.
    pub fn top_window(&self, n: usize) -> Option<&[AbstractSlot]> {
        if self.slots.len() < n {
            return None;
        }
        Some(&self.slots[self.slots.len() - n..])
    }

    /// Remove the top `n` slots, returning them bottom to top.
    pub fn pop_window(&mut self, n: usize) -> Vec<AbstractSlot> {
        self.slots.split_off(self.slots.len() - n)
    }

    pub fn slots(&self) -> &[AbstractSlot] {
        &self.slots
    }

    /// How many slots currently carry the given binding.
    pub fn live_count(&self, binding: usize) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.binding == Some(binding))
            .count()
    }
}

impl fmt::Display for AbstractStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", slot)?;
        }
        write!(f, "]")
    }
}
