use crate::classfile::{parse_attributes, push_u2, u16_len, write_attributes, Attribute};
use crate::constant_pool::{ConstantPool, CpInfo};
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
use crate::error::{Error, Result};
use crate::opcodes::*;
use crate::reader::Reader;

const MAX_CODE_LEN: usize = 65535;

/// A decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytecode: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant pool index of the caught class, 0 for `finally`.
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub len: usize,
}

impl Code {
    pub fn parse(info: &[u8], cp: &ConstantPool) -> Result<Self> {
        let mut reader = Reader::new(info);
        let max_stack = reader.read_u2()?;
        let max_locals = reader.read_u2()?;
        let code_len = reader.read_u4()? as usize;
        if code_len == 0 || code_len > MAX_CODE_LEN {
            return Err(Error::MalformedAttribute("Code"));
        }
        let bytecode = reader.read_bytes(code_len)?.to_vec();

        let handlers = reader.read_u2()? as usize;
        let mut exception_table = Vec::with_capacity(handlers);
        for _ in 0..handlers {
            exception_table.push(ExceptionHandler {
                start_pc: reader.read_u2()?,
                end_pc: reader.read_u2()?,
                handler_pc: reader.read_u2()?,
                catch_type: reader.read_u2()?,
            });
        }
        let attributes = parse_attributes(&mut reader, cp)?;
        reader.ensure_empty()?;

        Ok(Self {
            max_stack,
            max_locals,
            bytecode,
            exception_table,
            attributes,
        })
    }

    pub fn to_attribute(&self, cp: &mut ConstantPool) -> Result<Attribute> {
        if self.bytecode.is_empty() {
            return Err(Error::MalformedAttribute("Code"));
        }
        if self.bytecode.len() > MAX_CODE_LEN {
            return Err(Error::CodeTooLarge(self.bytecode.len()));
        }
        let mut info = Vec::with_capacity(self.bytecode.len() + 16);
        push_u2(&mut info, self.max_stack);
        push_u2(&mut info, self.max_locals);
        info.extend_from_slice(&(self.bytecode.len() as u32).to_be_bytes());
        info.extend_from_slice(&self.bytecode);
        push_u2(&mut info, u16_len(self.exception_table.len())?);
        for handler in &self.exception_table {
            push_u2(&mut info, handler.start_pc);
            push_u2(&mut info, handler.end_pc);
            push_u2(&mut info, handler.handler_pc);
            push_u2(&mut info, handler.catch_type);
        }
        write_attributes(&mut info, cp, &self.attributes)?;
        Ok(Attribute::new("Code", info))
    }

    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.bytecode.len() {
            let len = instruction_len(&self.bytecode, offset)?;
            out.push(Instruction {
                offset,
                opcode: self.bytecode[offset],
                len,
            });
            offset += len;
        }
        Ok(out)
    }

    /// Splices straight-line `snippet` in front of the final instruction.
    ///
    /// Nothing before the final instruction moves, so branch offsets,
    /// handlers and stack map frames keep their meaning: anything that
    /// targeted the final instruction now reaches the snippet first. Ranges
    /// that ended at the old code end are stretched over the new bytes.
    pub fn insert_before_last_instruction(&mut self, snippet: &Code) -> Result<()> {
        if !snippet.exception_table.is_empty() || !snippet.attributes.is_empty() {
            return Err(Error::Other("inserted code must be straight-line"));
        }
        if snippet
            .instructions()?
            .iter()
            .any(|insn| is_branch(insn.opcode) || ends_block(insn.opcode))
        {
            return Err(Error::Other("inserted code must be straight-line"));
        }

        let last = self
            .instructions()?
            .last()
            .map(|insn| insn.offset)
            .ok_or(Error::MalformedAttribute("Code"))?;
        let old_len = self.bytecode.len();
        let grow = snippet.bytecode.len();
        let new_len = old_len + grow;
        if new_len > MAX_CODE_LEN {
            return Err(Error::CodeTooLarge(new_len));
        }

        self.bytecode
            .splice(last..last, snippet.bytecode.iter().copied());
        self.max_stack = self.max_stack.max(snippet.max_stack);
        self.max_locals = self.max_locals.max(snippet.max_locals);
        for handler in &mut self.exception_table {
            if handler.end_pc as usize == old_len {
                handler.end_pc = new_len as u16;
            }
        }
        for attr in &mut self.attributes {
            if attr.name == "LocalVariableTable" || attr.name == "LocalVariableTypeTable" {
                stretch_local_ranges(&mut attr.info, old_len, grow)?;
            }
        }
        Ok(())
    }

    /// One line per instruction, operands resolved through `cp`. Branch
    /// operands are printed as absolute targets.
    pub fn disassemble(&self, cp: &ConstantPool) -> Result<Vec<String>> {
        let code = &self.bytecode;
        let mut lines = Vec::new();
        for insn in self.instructions()? {
            let at = insn.offset;
            let name = mnemonic(insn.opcode).ok_or(Error::UnknownOpcode {
                opcode: insn.opcode,
                offset: at,
            })?;
            let line = match insn.opcode {
                BIPUSH => format!("{name} {}", code[at + 1] as i8),
                SIPUSH => format!("{name} {}", read_i16(code, at + 1)),
                LDC => format!("{name} {}", render_constant(cp, code[at + 1] as u16)?),
                LDC_W | LDC2_W => {
                    format!("{name} {}", render_constant(cp, read_u16(code, at + 1))?)
                }
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET | NEWARRAY => {
                    format!("{name} {}", code[at + 1])
                }
                IINC => format!("{name} {} {}", code[at + 1], code[at + 2] as i8),
                WIDE => {
                    let inner = code[at + 1];
                    let inner_name = mnemonic(inner).ok_or(Error::UnknownOpcode {
                        opcode: inner,
                        offset: at + 1,
                    })?;
                    let slot = read_u16(code, at + 2);
                    if inner == IINC {
                        format!("wide {inner_name} {slot} {}", read_i16(code, at + 4))
                    } else {
                        format!("wide {inner_name} {slot}")
                    }
                }
                opcode if is_branch(opcode) => {
                    format!("{name} {}", at as i64 + read_i16(code, at + 1) as i64)
                }
                GOTO_W | JSR_W => format!("{name} {}", at as i64 + read_i32(code, at + 1) as i64),
                GETSTATIC..=PUTFIELD => {
                    let (owner, field, desc) = cp.get_member_ref(read_u16(code, at + 1))?;
                    format!("{name} {owner}.{field}:{desc}")
                }
                INVOKEVIRTUAL..=INVOKEINTERFACE => {
                    let (owner, method, desc) = cp.get_member_ref(read_u16(code, at + 1))?;
                    format!("{name} {owner}.{method}{desc}")
                }
                NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                    format!("{name} {}", cp.get_class_name(read_u16(code, at + 1))?)
                }
                MULTIANEWARRAY => format!(
                    "{name} {} {}",
                    cp.get_class_name(read_u16(code, at + 1))?,
                    code[at + 3]
                ),
                _ => name.to_string(),
            };
            lines.push(line);
        }
        Ok(lines)
    }
}

/// Length in bytes of the instruction starting at `offset`.
pub fn instruction_len(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = *code.get(offset).ok_or(Error::UnexpectedEof)?;
    let len = match opcode {
        BIPUSH | LDC | ILOAD..=ALOAD | ISTORE..=ASTORE | RET | NEWARRAY => 2,
        SIPUSH | LDC_W | LDC2_W | IINC | IFEQ..=JSR | GETSTATIC..=INVOKESTATIC | NEW
        | ANEWARRAY | CHECKCAST | INSTANCEOF | IFNULL | IFNONNULL => 3,
        MULTIANEWARRAY => 4,
        INVOKEINTERFACE | INVOKEDYNAMIC | GOTO_W | JSR_W => 5,
        WIDE => {
            if code.get(offset + 1) == Some(&IINC) {
                6
            } else {
                4
            }
        }
        TABLESWITCH => {
            let base = offset + 1 + switch_padding(offset);
            let low = checked_i32(code, base + 4)? as i64;
            let high = checked_i32(code, base + 8)? as i64;
            if high < low {
                return Err(Error::MalformedAttribute("Code"));
            }
            (base - offset) + 12 + ((high - low + 1) as usize) * 4
        }
        LOOKUPSWITCH => {
            let base = offset + 1 + switch_padding(offset);
            let pairs = checked_i32(code, base + 4)?;
            let pairs = usize::try_from(pairs).map_err(|_| Error::MalformedAttribute("Code"))?;
            (base - offset) + 8 + pairs * 8
        }
        NOP..=JSR_W => 1,
        _ => return Err(Error::UnknownOpcode { opcode, offset }),
    };
    if offset + len > code.len() {
        return Err(Error::UnexpectedEof);
    }
    Ok(len)
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn checked_i32(code: &[u8], at: usize) -> Result<i32> {
    let bytes = code.get(at..at + 4).ok_or(Error::UnexpectedEof)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// The helpers below index bytes already bounds-checked by `instruction_len`.
fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

fn read_i16(code: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([code[at], code[at + 1]])
}

fn read_i32(code: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

fn render_constant(cp: &ConstantPool, index: u16) -> Result<String> {
    Ok(match cp.get(index)? {
        CpInfo::String { .. } => format!("{:?}", cp.get_string_constant(index)?),
        CpInfo::Class { .. } => format!("class {}", cp.get_class_name(index)?),
        CpInfo::Integer(v) => v.to_string(),
        CpInfo::Float(v) => format!("{v}f"),
        CpInfo::Long(v) => format!("{v}L"),
        CpInfo::Double(v) => format!("{v}d"),
        other => format!("#{index} ({})", other.kind()),
    })
}

fn stretch_local_ranges(info: &mut [u8], old_len: usize, grow: usize) -> Result<()> {
    let malformed = Error::MalformedAttribute("LocalVariableTable");
    if info.len() < 2 {
        return Err(malformed);
    }
    let count = u16::from_be_bytes([info[0], info[1]]) as usize;
    if info.len() != 2 + count * 10 {
        return Err(malformed);
    }
    for i in 0..count {
        let base = 2 + i * 10;
        let start = u16::from_be_bytes([info[base], info[base + 1]]) as usize;
        let length = u16::from_be_bytes([info[base + 2], info[base + 3]]) as usize;
        if start + length == old_len {
            let stretched = u16::try_from(length + grow).map_err(|_| Error::CodeTooLarge(old_len + grow))?;
            info[base + 2..base + 4].copy_from_slice(&stretched.to_be_bytes());
        }
    }
    Ok(())
}

/// A branch target inside a [`CodeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Internal name or array descriptor.
    Object(String),
}

/// A `StackMapTable` entry, always with an empty operand stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Same locals as the previous frame.
    Same,
    /// The previous frame's locals plus one to three more.
    Append(Vec<VerificationType>),
}

#[derive(Debug, Clone, Default)]
struct LabelState {
    offset: Option<usize>,
    stack: Option<u16>,
}

/// Emits bytecode while tracking the operand stack depth and the number of
/// local slots in use, so `max_stack` / `max_locals` come out exact for the
/// straight-line and simple branching code the enhancers produce.
pub struct CodeBuilder<'a> {
    cp: &'a mut ConstantPool,
    code: Vec<u8>,
    stack: u16,
    max_stack: u16,
    max_locals: u16,
    reachable: bool,
    labels: Vec<LabelState>,
    jumps: Vec<(usize, Label)>,
    frames: Vec<(Label, Frame)>,
}

impl<'a> CodeBuilder<'a> {
    /// `locals` is the number of slots taken by the receiver and arguments.
    pub fn new(cp: &'a mut ConstantPool, locals: u16) -> Self {
        Self {
            cp,
            code: Vec::new(),
            stack: 0,
            max_stack: 0,
            max_locals: locals,
            reachable: true,
            labels: Vec::new(),
            jumps: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn stack_depth(&self) -> u16 {
        self.stack
    }

    fn push(&mut self, slots: u16) {
        self.stack += slots;
        self.max_stack = self.max_stack.max(self.stack);
    }

    fn pop(&mut self, slots: u16) -> Result<()> {
        self.stack = self
            .stack
            .checked_sub(slots)
            .ok_or(Error::Other("operand stack underflow"))?;
        Ok(())
    }

    fn emit_u2(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_be_bytes());
    }

    fn after(&mut self, opcode: u8) {
        if ends_block(opcode) {
            self.reachable = false;
            self.stack = 0;
        }
    }

    fn unsupported(&self, opcode: u8) -> Error {
        Error::UnknownOpcode {
            opcode,
            offset: self.code.len(),
        }
    }

    /// An instruction without operands.
    pub fn insn(&mut self, opcode: u8) -> Result<()> {
        let (pop, push) = match opcode {
            NOP => (0, 0),
            ACONST_NULL | ICONST_M1..=ICONST_5 | FCONST_0..=FCONST_2 => (0, 1),
            LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => (0, 2),
            IALOAD | FALOAD | AALOAD..=SALOAD => (2, 1),
            LALOAD | DALOAD => (2, 2),
            IASTORE | FASTORE | AASTORE..=SASTORE => (3, 0),
            LASTORE | DASTORE => (4, 0),
            POP => (1, 0),
            POP2 => (2, 0),
            DUP => (1, 2),
            DUP_X1 => (2, 3),
            DUP_X2 => (3, 4),
            DUP2 => (2, 4),
            SWAP => (2, 2),
            IRETURN | FRETURN | ARETURN => (1, 0),
            LRETURN | DRETURN => (2, 0),
            RETURN => (0, 0),
            ARRAYLENGTH => (1, 1),
            ATHROW | MONITORENTER | MONITOREXIT => (1, 0),
            _ => return Err(self.unsupported(opcode)),
        };
        self.pop(pop)?;
        self.push(push);
        self.code.push(opcode);
        self.after(opcode);
        Ok(())
    }

    /// A local variable load or store, picking the short (`aload_1`) or
    /// `wide` encoding as needed.
    pub fn var_insn(&mut self, opcode: u8, slot: u16) -> Result<()> {
        let (is_load, kind) = match opcode {
            ILOAD..=ALOAD => (true, opcode - ILOAD),
            ISTORE..=ASTORE => (false, opcode - ISTORE),
            _ => return Err(self.unsupported(opcode)),
        };
        // lload/dload and their stores move two slots.
        let size = if kind == 1 || kind == 3 { 2 } else { 1 };
        if is_load {
            self.push(size);
        } else {
            self.pop(size)?;
        }

        if slot <= 3 {
            let base = if is_load { ILOAD_0 } else { ISTORE_0 };
            self.code.push(base + kind * 4 + slot as u8);
        } else if let Ok(short) = u8::try_from(slot) {
            self.code.push(opcode);
            self.code.push(short);
        } else {
            self.code.push(WIDE);
            self.code.push(opcode);
            self.emit_u2(slot);
        }
        self.max_locals = self.max_locals.max(slot + size);
        Ok(())
    }

    pub fn push_int(&mut self, value: i32) -> Result<()> {
        match value {
            -1..=5 => self.code.push((ICONST_0 as i32 + value) as u8),
            -128..=127 => {
                self.code.push(BIPUSH);
                self.code.push(value as i8 as u8);
            }
            -32768..=32767 => {
                self.code.push(SIPUSH);
                self.code.extend_from_slice(&(value as i16).to_be_bytes());
            }
            _ => {
                let index = self.cp.integer(value)?;
                self.ldc_index(index);
            }
        }
        self.push(1);
        Ok(())
    }

    pub fn ldc_string(&mut self, value: &str) -> Result<()> {
        let index = self.cp.string(value)?;
        self.ldc_index(index);
        self.push(1);
        Ok(())
    }

    /// Pushes a class literal.
    pub fn ldc_class(&mut self, internal_name: &str) -> Result<()> {
        let index = self.cp.class(internal_name)?;
        self.ldc_index(index);
        self.push(1);
        Ok(())
    }

    fn ldc_index(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(short) => {
                self.code.push(LDC);
                self.code.push(short);
            }
            Err(_) => {
                self.code.push(LDC_W);
                self.emit_u2(index);
            }
        }
    }

    /// `new`, `anewarray`, `checkcast` or `instanceof`.
    pub fn type_insn(&mut self, opcode: u8, class: &str) -> Result<()> {
        match opcode {
            NEW => self.push(1),
            ANEWARRAY | CHECKCAST | INSTANCEOF => {
                self.pop(1)?;
                self.push(1);
            }
            _ => return Err(self.unsupported(opcode)),
        }
        let index = self.cp.class(class)?;
        self.code.push(opcode);
        self.emit_u2(index);
        Ok(())
    }

    pub fn field_insn(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let size = parse_field_descriptor(descriptor)?.slot_size();
        match opcode {
            GETSTATIC => self.push(size),
            PUTSTATIC => self.pop(size)?,
            GETFIELD => {
                self.pop(1)?;
                self.push(size);
            }
            PUTFIELD => self.pop(1 + size)?,
            _ => return Err(self.unsupported(opcode)),
        }
        let index = self.cp.field_ref(owner, name, descriptor)?;
        self.code.push(opcode);
        self.emit_u2(index);
        Ok(())
    }

    /// A method invocation. `interface` selects an `InterfaceMethodref`
    /// (required for `invokeinterface`, and for static or special calls on
    /// interface owners).
    pub fn invoke(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<()> {
        let method = parse_method_descriptor(descriptor)?;
        let receiver = match opcode {
            INVOKESTATIC => 0,
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKEINTERFACE => 1,
            _ => return Err(self.unsupported(opcode)),
        };
        if opcode == INVOKEINTERFACE && !interface {
            return Err(Error::Other("invokeinterface needs an interface method"));
        }
        self.pop(method.argument_slots() + receiver)?;
        self.push(method.return_slots());

        let index = if interface {
            self.cp.interface_method_ref(owner, name, descriptor)?
        } else {
            self.cp.method_ref(owner, name, descriptor)?
        };
        self.code.push(opcode);
        self.emit_u2(index);
        if opcode == INVOKEINTERFACE {
            let count = u8::try_from(method.argument_slots() + 1)
                .map_err(|_| Error::InvalidDescriptor(descriptor.to_string()))?;
            self.code.push(count);
            self.code.push(0);
        }
        Ok(())
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label(self.labels.len() - 1)
    }

    pub fn place(&mut self, label: Label) -> Result<()> {
        let offset = self.code.len();
        let state = self
            .labels
            .get_mut(label.0)
            .ok_or(Error::Other("unknown label"))?;
        if state.offset.is_some() {
            return Err(Error::Other("label placed twice"));
        }
        state.offset = Some(offset);
        let incoming = state.stack;
        if !self.reachable {
            self.stack = incoming.unwrap_or(0);
            self.reachable = true;
        }
        Ok(())
    }

    /// A 16-bit conditional or unconditional branch.
    pub fn jump(&mut self, opcode: u8, target: Label) -> Result<()> {
        let pops = match opcode {
            IFEQ..=IFLE | IFNULL | IFNONNULL => 1,
            IF_ICMPEQ..=IF_ACMPNE => 2,
            GOTO => 0,
            _ => return Err(self.unsupported(opcode)),
        };
        self.pop(pops)?;
        let depth = self.stack;
        let state = self
            .labels
            .get_mut(target.0)
            .ok_or(Error::Other("unknown label"))?;
        state.stack.get_or_insert(depth);

        self.jumps.push((self.code.len(), target));
        self.code.push(opcode);
        self.code.extend_from_slice(&[0, 0]);
        self.after(opcode);
        Ok(())
    }

    /// Declares the verifier frame at `label`.
    pub fn frame(&mut self, label: Label, frame: Frame) {
        self.frames.push((label, frame));
    }

    pub fn finish(self) -> Result<Code> {
        let CodeBuilder {
            cp,
            mut code,
            max_stack,
            max_locals,
            labels,
            jumps,
            frames,
            ..
        } = self;

        for (at, label) in jumps {
            let target = label_offset(&labels, label)?;
            let delta = i16::try_from(target as i64 - at as i64)
                .map_err(|_| Error::Other("branch offset out of range"))?;
            code[at + 1..at + 3].copy_from_slice(&delta.to_be_bytes());
        }
        if code.len() > MAX_CODE_LEN {
            return Err(Error::CodeTooLarge(code.len()));
        }

        let mut attributes = Vec::new();
        if !frames.is_empty() {
            attributes.push(stack_map_table(cp, &labels, frames)?);
        }

        Ok(Code {
            max_stack,
            max_locals,
            bytecode: code,
            exception_table: Vec::new(),
            attributes,
        })
    }
}

fn label_offset(labels: &[LabelState], label: Label) -> Result<usize> {
    labels
        .get(label.0)
        .and_then(|state| state.offset)
        .ok_or(Error::Other("label was never placed"))
}

fn stack_map_table(
    cp: &mut ConstantPool,
    labels: &[LabelState],
    frames: Vec<(Label, Frame)>,
) -> Result<Attribute> {
    let mut resolved = frames
        .into_iter()
        .map(|(label, frame)| Ok((label_offset(labels, label)?, frame)))
        .collect::<Result<Vec<_>>>()?;
    resolved.sort_by_key(|(offset, _)| *offset);

    let malformed = Error::MalformedAttribute("StackMapTable");
    let mut info = Vec::new();
    push_u2(&mut info, u16_len(resolved.len())?);
    let mut previous: Option<usize> = None;
    for (offset, frame) in resolved {
        let delta = match previous {
            None => offset,
            Some(prev) => offset.checked_sub(prev + 1).ok_or(malformed.clone())?,
        };
        let delta = u16::try_from(delta).map_err(|_| malformed.clone())?;
        match frame {
            Frame::Same if delta < 64 => info.push(delta as u8),
            Frame::Same => {
                info.push(251);
                push_u2(&mut info, delta);
            }
            Frame::Append(locals) => {
                if locals.is_empty() || locals.len() > 3 {
                    return Err(malformed);
                }
                info.push(251 + locals.len() as u8);
                push_u2(&mut info, delta);
                for local in &locals {
                    write_verification_type(cp, &mut info, local)?;
                }
            }
        }
        previous = Some(offset);
    }
    Ok(Attribute::new("StackMapTable", info))
}

fn write_verification_type(
    cp: &mut ConstantPool,
    out: &mut Vec<u8>,
    ty: &VerificationType,
) -> Result<()> {
    match ty {
        VerificationType::Top => out.push(0),
        VerificationType::Integer => out.push(1),
        VerificationType::Float => out.push(2),
        VerificationType::Double => out.push(3),
        VerificationType::Long => out.push(4),
        VerificationType::Null => out.push(5),
        VerificationType::UninitializedThis => out.push(6),
        VerificationType::Object(name) => {
            out.push(7);
            push_u2(out, cp.class(name)?);
        }
    }
    Ok(())
}
