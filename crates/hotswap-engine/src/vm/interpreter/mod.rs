//! Interpreter loop
//!
//! Calls recurse on the Rust stack, bounded by `VmOptions::max_call_depth`;
//! all frames share one operand [`Stack`]. Opcode handlers live in
//! `opcodes/`, one module per category.

mod opcodes;

use super::{Stack, Vm, VmError, VmResult};
use crate::error::LookupError;
use crate::executor::Executable;
use crate::object::{ClosureInstance, Instance};
use crate::registry::{visibility, TypeRegistry};
use crate::reloadable::{ReloadableType, TypeId};
use crate::value::Value;
use hotswap_unit::{BytecodeReader, Instruction, MethodSignature, Opcode};
use std::sync::Arc;

/// Control flow after one instruction
#[derive(Debug)]
pub(super) enum OpcodeResult {
    /// Fall through to the next instruction
    Continue,
    /// Continue at an absolute offset
    Jump(usize),
    /// Leave the current method
    Return(Value),
}

pub(super) struct Interpreter<'vm> {
    vm: &'vm Vm,
    stack: Stack,
    depth: usize,
}

impl<'vm> Interpreter<'vm> {
    pub(super) fn new(vm: &'vm Vm) -> Self {
        Self {
            vm,
            stack: Stack::new(),
            depth: 0,
        }
    }

    fn registry(&self) -> &'vm Arc<TypeRegistry> {
        self.vm.registry()
    }

    // ========================================================================
    // Host entry points
    // ========================================================================

    pub(super) fn invoke_static(&mut self, type_name: &str, signature: &str, args: &[Value]) -> VmResult<Value> {
        let ty = self.resolve_type(type_name)?;
        let target = Self::dispatcher(&ty, signature)?;
        Self::expect_kind(&target, true)?;
        self.enter(&target, None, args)
    }

    pub(super) fn invoke_virtual(
        &mut self,
        receiver: &Arc<Instance>,
        signature: &str,
        args: &[Value],
    ) -> VmResult<Value> {
        let target = Self::dispatcher(receiver.reloadable_type(), signature)?;
        Self::expect_kind(&target, false)?;
        self.enter(&target, Some(Value::Object(Arc::clone(receiver))), args)
    }

    pub(super) fn invoke_closure(
        &mut self,
        closure: &Arc<ClosureInstance>,
        signature: &str,
        args: &[Value],
    ) -> VmResult<Value> {
        let target = self.closure_target(closure, signature)?;
        self.enter(&target, Some(Value::Closure(Arc::clone(closure))), args)
    }

    fn enter(&mut self, target: &Arc<Executable>, receiver: Option<Value>, args: &[Value]) -> VmResult<Value> {
        let argc = args.len() + usize::from(receiver.is_some());
        if argc != target.arg_slots() {
            return Err(VmError::TypeError(format!(
                "{} takes {} arguments, {} given",
                target.key,
                target.signature.param_count(),
                args.len()
            )));
        }
        if let Some(receiver) = receiver {
            self.stack.push(receiver)?;
        }
        for arg in args {
            self.stack.push(arg.clone())?;
        }
        self.call(target, argc)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Run `target` over the top `argc` stack values
    fn call(&mut self, target: &Arc<Executable>, argc: usize) -> VmResult<Value> {
        let max_depth = self.vm.options().max_call_depth;
        if self.depth >= max_depth {
            return Err(VmError::CallDepthExceeded(max_depth));
        }
        if argc != target.arg_slots() {
            return Err(VmError::TypeError(format!(
                "{} expects {} argument slots, got {}",
                target.key,
                target.arg_slots(),
                argc
            )));
        }

        self.stack.push_frame(argc, usize::from(target.local_count))?;
        self.depth += 1;
        let result = self.run(target);
        self.depth -= 1;
        self.stack.pop_frame()?;
        result
    }

    /// Call and push the result, for invocation opcodes
    fn invoke(&mut self, target: &Arc<Executable>, argc: usize) -> VmResult<OpcodeResult> {
        let value = self.call(target, argc)?;
        if target.signature.returns_value() {
            self.stack.push(value)?;
        }
        Ok(OpcodeResult::Continue)
    }

    fn run(&mut self, exec: &Arc<Executable>) -> VmResult<Value> {
        let code: &[u8] = &exec.code;
        let mut reader = BytecodeReader::new(code);

        loop {
            if !reader.has_more() {
                return Err(VmError::Runtime(format!("{} fell off the end of its code", exec.key)));
            }
            let instruction = Instruction::read(&mut reader)?;

            use Opcode::*;
            let flow = match instruction.opcode {
                Nop | Pop | Dup | Swap | ConstNull | ConstTrue | ConstFalse | ConstI32 | ConstI64
                | ConstF64 | ConstStr | LoadLocal | StoreLocal => {
                    self.exec_stack_ops(exec, &instruction)?
                }
                Iadd | Isub | Imul | Idiv | Imod | Ineg | Ladd | Lsub | Lmul | Ldiv | I2l | Fadd
                | Fsub | Fmul | Fdiv | Ieq | Ine | Ilt | Ile | Igt | Ige | Not => {
                    self.exec_arithmetic_ops(&instruction)?
                }
                Jmp | JmpIfFalse | JmpIfTrue | Return | ReturnVoid => {
                    self.exec_control_flow_ops(code.len(), &instruction)?
                }
                InvokeStatic | InvokeVirtual | InvokeDynamicStatic | InvokeDynamicVirtual | Dispatch => {
                    self.exec_call_ops(exec, &instruction)?
                }
                New | GetField | PutField | GetFieldSlot | PutFieldSlot | GetExtField | PutExtField => {
                    self.exec_object_ops(exec, &instruction)?
                }
                InvokeClosure | MakeClosure | MakeCaptured | GetCaptured | GetEnclosing => {
                    self.exec_closure_ops(exec, &instruction)?
                }
            };

            match flow {
                OpcodeResult::Continue => {}
                OpcodeResult::Jump(target) => reader.seek(target),
                OpcodeResult::Return(value) => return Ok(value),
            }
        }
    }

    // ========================================================================
    // Resolution helpers
    // ========================================================================

    fn string_operand(exec: &Executable, index: u32) -> VmResult<&str> {
        exec.constants
            .get_string(index)
            .ok_or_else(|| VmError::Runtime(format!("{}: bad constant index {}", exec.key, index)))
    }

    fn signature_operand(exec: &Executable, index: u32) -> VmResult<(&str, MethodSignature)> {
        let key = Self::string_operand(exec, index)?;
        let signature = MethodSignature::parse_key(key)
            .map_err(|e| VmError::Runtime(format!("{}: {}", exec.key, e)))?;
        Ok((key, signature))
    }

    fn resolve_type(&self, name: &str) -> VmResult<Arc<ReloadableType>> {
        self.registry()
            .get(name)
            .ok_or_else(|| VmError::UnknownType(name.to_string()))
    }

    fn type_by_id(&self, id: TypeId) -> VmResult<Arc<ReloadableType>> {
        self.registry()
            .get_by_id(id)
            .ok_or_else(|| VmError::UnknownType(format!("#{}", id)))
    }

    fn check_access(exec: &Executable, target: &ReloadableType) -> VmResult<()> {
        if visibility::is_accessible(&exec.unit_name, target.name(), target.loaded_unit().access) {
            Ok(())
        } else {
            Err(VmError::IllegalAccess {
                accessor: exec.unit_name.to_string(),
                target: target.name().to_string(),
            })
        }
    }

    fn dispatcher(ty: &ReloadableType, key: &str) -> VmResult<Arc<Executable>> {
        ty.dispatcher(key).ok_or_else(|| {
            VmError::Lookup(LookupError::NoSuchMember {
                type_name: ty.name().to_string(),
                signature: key.to_string(),
            })
        })
    }

    fn expect_kind(target: &Executable, is_static: bool) -> VmResult<()> {
        if target.is_static == is_static {
            return Ok(());
        }
        let kind = if target.is_static { "static" } else { "an instance method" };
        Err(VmError::TypeError(format!("{}.{} is {}", target.type_name, target.key, kind)))
    }

    fn closure_target(&self, closure: &ClosureInstance, key: &str) -> VmResult<Arc<Executable>> {
        let site = self
            .registry()
            .sites()
            .get(closure.site())
            .ok_or_else(|| VmError::Runtime(format!("capture site {} is not bound", closure.site())))?;
        let host = self.type_by_id(site.host_id)?;
        let target = host.current_executable(key)?;
        Self::expect_kind(&target, false)?;
        Ok(target)
    }

    fn pop_instance(&mut self) -> VmResult<Arc<Instance>> {
        match self.stack.pop()? {
            Value::Object(object) => Ok(object),
            Value::Null => Err(VmError::NullPointer),
            other => Err(VmError::TypeError(format!("expected object, found {}", other.kind()))),
        }
    }

    fn pop_closure(&mut self) -> VmResult<Arc<ClosureInstance>> {
        match self.stack.pop()? {
            Value::Closure(closure) => Ok(closure),
            Value::Null => Err(VmError::NullPointer),
            other => Err(VmError::TypeError(format!("expected closure, found {}", other.kind()))),
        }
    }
}
