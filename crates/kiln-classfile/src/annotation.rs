use crate::constant_pool::{ConstantPool, CpInfo};
use crate::error::{Error, Result};
use crate::reader::Reader;

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub type_descriptor: String,
    pub type_internal_name: Option<String>,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// A marker annotation (no elements) of the given internal type name.
    pub fn marker(type_internal_name: &str) -> Self {
        Self {
            type_descriptor: format!("L{type_internal_name};"),
            type_internal_name: Some(type_internal_name.to_string()),
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, name: impl Into<String>, value: ElementValue) -> Self {
        self.elements.push((name.into(), value));
        self
    }

    pub(crate) fn write(&self, cp: &mut ConstantPool, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&cp.utf8(&self.type_descriptor)?.to_be_bytes());
        out.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for (name, value) in &self.elements {
            out.extend_from_slice(&cp.utf8(name)?.to_be_bytes());
            value.write(cp, out)?;
        }
        Ok(())
    }

    pub(crate) fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let type_descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
        let type_internal_name = descriptor_to_internal_name(&type_descriptor);
        let pairs = reader.read_u2()?;
        let mut elements = Vec::with_capacity(pairs as usize);
        for _ in 0..pairs {
            let name = cp.get_utf8(reader.read_u2()?)?.to_string();
            elements.push((name, ElementValue::parse(reader, cp)?));
        }
        Ok(Self {
            type_descriptor,
            type_internal_name,
            elements,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(ConstValue),
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let tag = reader.read_u1()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                ElementValue::Const(const_value(tag, reader.read_u2()?, cp)?)
            }
            b's' => ElementValue::Const(ConstValue::String(cp.get_utf8(reader.read_u2()?)?.to_string())),
            b'e' => {
                let type_descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
                let const_name = cp.get_utf8(reader.read_u2()?)?.to_string();
                ElementValue::Enum {
                    type_descriptor,
                    const_name,
                }
            }
            b'c' => ElementValue::Class(cp.get_utf8(reader.read_u2()?)?.to_string()),
            b'@' => ElementValue::Annotation(Box::new(Annotation::parse(reader, cp)?)),
            b'[' => {
                let count = reader.read_u2()?;
                let values = (0..count)
                    .map(|_| ElementValue::parse(reader, cp))
                    .collect::<Result<Vec<_>>>()?;
                ElementValue::Array(values)
            }
            _ => return Err(Error::MalformedAttribute("annotation element value")),
        })
    }

    fn write(&self, cp: &mut ConstantPool, out: &mut Vec<u8>) -> Result<()> {
        match self {
            ElementValue::Const(value) => {
                let (tag, index) = match value {
                    ConstValue::Byte(v) => (b'B', cp.integer(*v as i32)?),
                    ConstValue::Char(v) => (b'C', cp.integer(*v as i32)?),
                    ConstValue::Short(v) => (b'S', cp.integer(*v as i32)?),
                    ConstValue::Int(v) => (b'I', cp.integer(*v)?),
                    ConstValue::Boolean(v) => (b'Z', cp.integer(*v as i32)?),
                    ConstValue::String(v) => (b's', cp.utf8(v)?),
                    ConstValue::Long(_) | ConstValue::Float(_) | ConstValue::Double(_) => {
                        return Err(Error::Other(
                            "wide and floating annotation constants are not written",
                        ))
                    }
                };
                out.push(tag);
                out.extend_from_slice(&index.to_be_bytes());
            }
            ElementValue::Enum {
                type_descriptor,
                const_name,
            } => {
                out.push(b'e');
                out.extend_from_slice(&cp.utf8(type_descriptor)?.to_be_bytes());
                out.extend_from_slice(&cp.utf8(const_name)?.to_be_bytes());
            }
            ElementValue::Class(descriptor) => {
                out.push(b'c');
                out.extend_from_slice(&cp.utf8(descriptor)?.to_be_bytes());
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(cp, out)?;
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for value in values {
                    value.write(cp, out)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}

/// Reads the primitive constant an element value with `tag` points at.
fn const_value(tag: u8, index: u16, cp: &ConstantPool) -> Result<ConstValue> {
    let entry = cp.get(index)?;
    let mismatch = |expected| Error::ConstantPoolTypeMismatch {
        index,
        expected,
        found: entry.kind(),
    };
    match (tag, entry) {
        (b'B', CpInfo::Integer(v)) => Ok(ConstValue::Byte(*v as i8)),
        (b'S', CpInfo::Integer(v)) => Ok(ConstValue::Short(*v as i16)),
        (b'I', CpInfo::Integer(v)) => Ok(ConstValue::Int(*v)),
        (b'Z', CpInfo::Integer(v)) => Ok(ConstValue::Boolean(*v != 0)),
        (b'C', CpInfo::Integer(v)) => char::from_u32(*v as u32)
            .map(ConstValue::Char)
            .ok_or(Error::MalformedAttribute("annotation char constant")),
        (b'J', CpInfo::Long(v)) => Ok(ConstValue::Long(*v)),
        (b'F', CpInfo::Float(v)) => Ok(ConstValue::Float(*v)),
        (b'D', CpInfo::Double(v)) => Ok(ConstValue::Double(*v)),
        (b'J', _) => Err(mismatch("Long")),
        (b'F', _) => Err(mismatch("Float")),
        (b'D', _) => Err(mismatch("Double")),
        _ => Err(mismatch("Integer")),
    }
}

pub fn descriptor_to_internal_name(desc: &str) -> Option<String> {
    desc.strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .map(|name| name.to_string())
}
