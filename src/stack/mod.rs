/// The Loom data stack
///
/// The single ordered channel through which values flow between word calls.
/// "near" is the most recently pushed value; "far" and "farther" are the
/// next two positions down. Pops are strict and underflow is an error;
/// peeks are lenient and report absent positions as None so overload
/// matching can probe a shallow stack without committing.
use std::fmt;

use crate::engine::errors::RuntimeError;
use crate::object::Object;

/// Depth cap, matching the fixed store of the reference runtime. Exceeding
/// it reports heap exhaustion.
pub const MAX_STACK_DEPTH: usize = 4096;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Stack {
    items: Vec<Object>,
}

impl Stack {
    pub fn new() -> Self {
        Stack::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: Object) -> Result<(), RuntimeError> {
        if self.items.len() >= MAX_STACK_DEPTH {
            return Err(RuntimeError::HeapExhausted {
                limit: MAX_STACK_DEPTH,
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove and return the near value.
    pub fn pop(&mut self) -> Result<Object, RuntimeError> {
        self.items.pop().ok_or(RuntimeError::StackUnderflow {
            word: "pop".to_string(),
            required: 1,
            available: 0,
        })
    }

    /// Remove and return the top two values as (near, far).
    pub fn pop_pair(&mut self) -> Result<(Object, Object), RuntimeError> {
        if self.items.len() < 2 {
            return Err(RuntimeError::StackUnderflow {
                word: "pop-pair".to_string(),
                required: 2,
                available: self.items.len(),
            });
        }
        let near = self.items.pop().unwrap();
        let far = self.items.pop().unwrap();
        Ok((near, far))
    }

    /// Remove and return the top three values as (near, far, farther).
    pub fn pop_trio(&mut self) -> Result<(Object, Object, Object), RuntimeError> {
        if self.items.len() < 3 {
            return Err(RuntimeError::StackUnderflow {
                word: "pop-trio".to_string(),
                required: 3,
                available: self.items.len(),
            });
        }
        let near = self.items.pop().unwrap();
        let far = self.items.pop().unwrap();
        let farther = self.items.pop().unwrap();
        Ok((near, far, farther))
    }

    /// Borrow the near value without removing it.
    pub fn peek(&self) -> Option<&Object> {
        self.items.last()
    }

    /// Borrow (near, far) without removing; absent positions are None, not
    /// errors.
    pub fn peek_pair(&self) -> (Option<&Object>, Option<&Object>) {
        let n = self.items.len();
        (
            self.items.get(n.wrapping_sub(1)),
            self.items.get(n.wrapping_sub(2)),
        )
    }

    /// Borrow (near, far, farther) without removing; absent positions are
    /// None, not errors.
    pub fn peek_trio(&self) -> (Option<&Object>, Option<&Object>, Option<&Object>) {
        let n = self.items.len();
        (
            self.items.get(n.wrapping_sub(1)),
            self.items.get(n.wrapping_sub(2)),
            self.items.get(n.wrapping_sub(3)),
        )
    }

    /// Borrow the value `n` positions below near (0 is near).
    pub fn peek_at(&self, n: usize) -> Option<&Object> {
        let len = self.items.len();
        if n < len { self.items.get(len - 1 - n) } else { None }
    }

    /// Bottom-to-top iteration, for host-side inspection.
    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.items.iter()
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stack[")?;
        for item in &self.items {
            write!(f, " {}", item)?;
        }
        write!(f, " ]")
    }
}
