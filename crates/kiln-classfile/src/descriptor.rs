use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

impl BaseType {
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    pub fn from_descriptor_char(c: u8) -> Option<Self> {
        Some(match c {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return None,
        })
    }
}

impl FieldType {
    /// Operand stack / local variable slots taken by a value of this type.
    pub fn slot_size(&self) -> u16 {
        match self {
            FieldType::Base(BaseType::Long | BaseType::Double) => 2,
            _ => 1,
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Base(base) => base.descriptor_char().to_string(),
            FieldType::Object(name) => format!("L{name};"),
            FieldType::Array(component) => format!("[{}", component.descriptor()),
        }
    }
}

impl ReturnType {
    pub fn descriptor(&self) -> String {
        match self {
            ReturnType::Void => "V".to_owned(),
            ReturnType::Type(ty) => ty.descriptor(),
        }
    }
}

impl MethodDescriptor {
    pub fn argument_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_size).sum()
    }

    pub fn return_slots(&self) -> u16 {
        match &self.return_type {
            ReturnType::Void => 0,
            ReturnType::Type(ty) => ty.slot_size(),
        }
    }
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    match take_field_type(desc) {
        Some((ty, "")) => Ok(ty),
        _ => Err(Error::InvalidDescriptor(desc.to_string())),
    }
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let invalid = || Error::InvalidDescriptor(desc.to_string());
    let mut rest = desc.strip_prefix('(').ok_or_else(invalid)?;
    let mut params = Vec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        let (param, after) = take_field_type(rest).ok_or_else(invalid)?;
        params.push(param);
        rest = after;
    }

    let return_type = if rest == "V" {
        ReturnType::Void
    } else {
        match take_field_type(rest) {
            Some((ty, "")) => ReturnType::Type(ty),
            _ => return Err(invalid()),
        }
    };
    Ok(MethodDescriptor { params, return_type })
}

/// Splits one field type off the front of `input`.
fn take_field_type(input: &str) -> Option<(FieldType, &str)> {
    let first = *input.as_bytes().first()?;
    match first {
        b'L' => {
            let end = input.find(';')?;
            let name = &input[1..end];
            if name.is_empty() {
                return None;
            }
            Some((FieldType::Object(name.to_string()), &input[end + 1..]))
        }
        b'[' => {
            let (component, rest) = take_field_type(&input[1..])?;
            Some((FieldType::Array(Box::new(component)), rest))
        }
        c => BaseType::from_descriptor_char(c).map(|base| (FieldType::Base(base), &input[1..])),
    }
}
