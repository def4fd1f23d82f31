//! Operand stack and call frames
//!
//! One stack holds every active frame's locals followed by its operands.
//! Arguments are pushed by the caller and become the callee's first locals.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ operands of frame N         │  ← top
//! │ local₂ (zeroed)             │
//! │ local₁ = arg₁               │
//! │ local₀ = receiver / arg₀    │  ← base of frame N
//! ├─────────────────────────────┤
//! │ frame N-1                   │
//! └─────────────────────────────┘
//! ```

use super::{VmError, VmResult};
use crate::value::Value;

/// Default maximum stack size (in slots)
const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 16;

/// One activation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    /// Start of the frame's locals in the stack
    pub base_pointer: usize,
    /// Number of locals, arguments included
    pub local_count: usize,
    /// Number of arguments passed
    pub arg_count: usize,
}

/// Operand and call frame stack
#[derive(Debug)]
pub struct Stack {
    slots: Vec<Value>,
    frames: Vec<CallFrame>,
    max_size: usize,
}

impl Stack {
    /// Create a stack with the default size limit
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_STACK_SIZE)
    }

    /// Create a stack with a size limit in slots
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(256),
            frames: Vec::with_capacity(32),
            max_size,
        }
    }

    // ========================================================================
    // Operand Stack Operations
    // ========================================================================

    /// Push a value
    #[inline]
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.slots.len() >= self.max_size {
            return Err(VmError::StackOverflow);
        }
        self.slots.push(value);
        Ok(())
    }

    /// Pop a value, never below the current frame's locals
    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        if self.slots.len() <= self.operand_floor() {
            return Err(VmError::StackUnderflow);
        }
        self.slots.pop().ok_or(VmError::StackUnderflow)
    }

    /// Value `n` slots below the top (0 = top)
    #[inline]
    pub fn peek_n(&self, n: usize) -> VmResult<&Value> {
        let len = self.slots.len();
        if len <= self.operand_floor() + n {
            return Err(VmError::StackUnderflow);
        }
        Ok(&self.slots[len - 1 - n])
    }

    /// Current stack depth in slots
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Whether the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn operand_floor(&self) -> usize {
        self.frames
            .last()
            .map_or(0, |f| f.base_pointer + f.local_count)
    }

    // ========================================================================
    // Call Frame Management
    // ========================================================================

    /// Open a frame over the top `arg_count` values
    pub fn push_frame(&mut self, arg_count: usize, local_count: usize) -> VmResult<()> {
        if local_count < arg_count {
            return Err(VmError::Runtime(format!(
                "{} arguments do not fit in {} locals",
                arg_count, local_count
            )));
        }
        let available = self.slots.len() - self.operand_floor();
        if available < arg_count {
            return Err(VmError::StackUnderflow);
        }
        let base_pointer = self.slots.len() - arg_count;
        if base_pointer + local_count > self.max_size {
            return Err(VmError::StackOverflow);
        }

        self.frames.push(CallFrame {
            base_pointer,
            local_count,
            arg_count,
        });
        self.slots.resize(base_pointer + local_count, Value::Null);
        Ok(())
    }

    /// Close the current frame, dropping its locals and operands
    pub fn pop_frame(&mut self) -> VmResult<CallFrame> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Runtime("No call frame to pop".to_string()))?;
        self.slots.truncate(frame.base_pointer);
        Ok(frame)
    }

    /// Current frame
    #[inline]
    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Number of active frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // Local Variable Access
    // ========================================================================

    fn local_index(&self, index: usize) -> VmResult<usize> {
        let frame = self
            .current_frame()
            .ok_or_else(|| VmError::Runtime("No active call frame".to_string()))?;
        if index >= frame.local_count {
            return Err(VmError::Runtime(format!(
                "Local index {} out of bounds (max {})",
                index, frame.local_count
            )));
        }
        Ok(frame.base_pointer + index)
    }

    /// Load a local
    #[inline]
    pub fn load_local(&self, index: usize) -> VmResult<Value> {
        let slot = self.local_index(index)?;
        Ok(self.slots[slot].clone())
    }

    /// Store a local
    #[inline]
    pub fn store_local(&mut self, index: usize, value: Value) -> VmResult<()> {
        let slot = self.local_index(index)?;
        self.slots[slot] = value;
        Ok(())
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
