use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::reader::Reader;

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;
const CONSTANT_METHOD_HANDLE: u8 = 15;
const CONSTANT_METHOD_TYPE: u8 = 16;
const CONSTANT_DYNAMIC: u8 = 17;
const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum CpInfo {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// The second slot taken by a `Long` or `Double` entry.
    Unusable,
}

impl CpInfo {
    pub fn kind(&self) -> &'static str {
        match self {
            CpInfo::Utf8(_) => "Utf8",
            CpInfo::Integer(_) => "Integer",
            CpInfo::Float(_) => "Float",
            CpInfo::Long(_) => "Long",
            CpInfo::Double(_) => "Double",
            CpInfo::Class { .. } => "Class",
            CpInfo::String { .. } => "String",
            CpInfo::Fieldref { .. } => "Fieldref",
            CpInfo::Methodref { .. } => "Methodref",
            CpInfo::InterfaceMethodref { .. } => "InterfaceMethodref",
            CpInfo::NameAndType { .. } => "NameAndType",
            CpInfo::MethodHandle { .. } => "MethodHandle",
            CpInfo::MethodType { .. } => "MethodType",
            CpInfo::Dynamic { .. } => "Dynamic",
            CpInfo::InvokeDynamic { .. } => "InvokeDynamic",
            CpInfo::Module { .. } => "Module",
            CpInfo::Package { .. } => "Package",
            CpInfo::Unusable => "Unusable",
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, CpInfo::Long(_) | CpInfo::Double(_))
    }

    fn key(&self) -> Option<PoolKey> {
        Some(match self {
            CpInfo::Utf8(s) => PoolKey::Utf8(s.clone()),
            CpInfo::Integer(v) => PoolKey::Integer(*v),
            CpInfo::Float(v) => PoolKey::Float(v.to_bits()),
            CpInfo::Long(v) => PoolKey::Long(*v),
            CpInfo::Double(v) => PoolKey::Double(v.to_bits()),
            CpInfo::Class { name_index } => PoolKey::Ref(CONSTANT_CLASS, *name_index, 0),
            CpInfo::String { string_index } => PoolKey::Ref(CONSTANT_STRING, *string_index, 0),
            CpInfo::Fieldref {
                class_index,
                name_and_type_index,
            } => PoolKey::Ref(CONSTANT_FIELDREF, *class_index, *name_and_type_index),
            CpInfo::Methodref {
                class_index,
                name_and_type_index,
            } => PoolKey::Ref(CONSTANT_METHODREF, *class_index, *name_and_type_index),
            CpInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => PoolKey::Ref(
                CONSTANT_INTERFACE_METHODREF,
                *class_index,
                *name_and_type_index,
            ),
            CpInfo::NameAndType {
                name_index,
                descriptor_index,
            } => PoolKey::Ref(CONSTANT_NAME_AND_TYPE, *name_index, *descriptor_index),
            CpInfo::MethodType { descriptor_index } => {
                PoolKey::Ref(CONSTANT_METHOD_TYPE, *descriptor_index, 0)
            }
            // Entries the enhancer never creates are not deduplicated.
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Ref(u8, u16, u16),
}

/// A constant pool that can be read from a class file and then extended.
///
/// Entries are append-only: every index handed out (or parsed) stays valid, so
/// attributes copied verbatim from the input keep pointing at the right slots.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    // Index 0 is never valid; `entries[0]` is a placeholder.
    entries: Vec<CpInfo>,
    lookup: HashMap<PoolKey, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![CpInfo::Unusable],
            lookup: HashMap::new(),
        }
    }

    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()?;
        let mut pool = Self::new();
        let mut index = 1u16;
        while index < count {
            let tag = reader.read_u1()?;
            let info = match tag {
                CONSTANT_UTF8 => {
                    let len = reader.read_u2()? as usize;
                    CpInfo::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                CONSTANT_INTEGER => CpInfo::Integer(reader.read_u4()? as i32),
                CONSTANT_FLOAT => CpInfo::Float(f32::from_bits(reader.read_u4()?)),
                CONSTANT_LONG => CpInfo::Long(reader.read_u8()? as i64),
                CONSTANT_DOUBLE => CpInfo::Double(f64::from_bits(reader.read_u8()?)),
                CONSTANT_CLASS => CpInfo::Class {
                    name_index: reader.read_u2()?,
                },
                CONSTANT_STRING => CpInfo::String {
                    string_index: reader.read_u2()?,
                },
                CONSTANT_FIELDREF => CpInfo::Fieldref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_METHODREF => CpInfo::Methodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_INTERFACE_METHODREF => CpInfo::InterfaceMethodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_NAME_AND_TYPE => CpInfo::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                CONSTANT_METHOD_HANDLE => CpInfo::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                CONSTANT_METHOD_TYPE => CpInfo::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                CONSTANT_DYNAMIC => CpInfo::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_INVOKE_DYNAMIC => CpInfo::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_MODULE => CpInfo::Module {
                    name_index: reader.read_u2()?,
                },
                CONSTANT_PACKAGE => CpInfo::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(Error::InvalidConstantPoolTag(other)),
            };
            let wide = info.is_wide();
            pool.remember(index, &info);
            pool.entries.push(info);
            index += 1;
            if wide {
                pool.entries.push(CpInfo::Unusable);
                index += 1;
            }
        }
        Ok(pool)
    }

    /// Number of slots including the unused slot 0 (the `constant_pool_count`).
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Result<&CpInfo> {
        match self.entries.get(index as usize) {
            Some(CpInfo::Unusable) | None => Err(Error::InvalidConstantPoolIndex(index)),
            Some(info) if index != 0 => Ok(info),
            Some(_) => Err(Error::InvalidConstantPoolIndex(index)),
        }
    }

    pub fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            CpInfo::Utf8(s) => Ok(s),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "Utf8",
                found: other.kind(),
            }),
        }
    }

    /// Internal name (`java/lang/String`) of a `Class` entry.
    pub fn get_class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpInfo::Class { name_index } => Ok(self.get_utf8(*name_index)?.to_string()),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "Class",
                found: other.kind(),
            }),
        }
    }

    pub fn get_string_constant(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            CpInfo::String { string_index } => Ok(self.get_utf8(*string_index)?.to_string()),
            // Annotation `s` elements point straight at a Utf8 entry.
            CpInfo::Utf8(s) => Ok(s.clone()),
            other => Err(Error::ConstantPoolTypeMismatch {
                index,
                expected: "String",
                found: other.kind(),
            }),
        }
    }

    /// `(owner, name, descriptor)` of a field/method/interface-method reference.
    pub fn get_member_ref(&self, index: u16) -> Result<(String, String, String)> {
        let (class_index, nat_index) = match self.get(index)? {
            CpInfo::Fieldref {
                class_index,
                name_and_type_index,
            }
            | CpInfo::Methodref {
                class_index,
                name_and_type_index,
            }
            | CpInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            other => {
                return Err(Error::ConstantPoolTypeMismatch {
                    index,
                    expected: "member reference",
                    found: other.kind(),
                })
            }
        };
        let owner = self.get_class_name(class_index)?;
        match self.get(nat_index)? {
            CpInfo::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((
                owner,
                self.get_utf8(*name_index)?.to_string(),
                self.get_utf8(*descriptor_index)?.to_string(),
            )),
            other => Err(Error::ConstantPoolTypeMismatch {
                index: nat_index,
                expected: "NameAndType",
                found: other.kind(),
            }),
        }
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(CpInfo::Utf8(value.to_string()))
    }

    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.utf8(internal_name)?;
        self.intern(CpInfo::Class { name_index })
    }

    pub fn string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.utf8(value)?;
        self.intern(CpInfo::String { string_index })
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.intern(CpInfo::Integer(value))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        let descriptor_index = self.utf8(descriptor)?;
        self.intern(CpInfo::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.intern(CpInfo::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.intern(CpInfo::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.intern(CpInfo::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    fn intern(&mut self, info: CpInfo) -> Result<u16> {
        if let Some(key) = info.key() {
            if let Some(index) = self.lookup.get(&key) {
                return Ok(*index);
            }
        }
        let slots = if info.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.remember(index, &info);
        let wide = info.is_wide();
        self.entries.push(info);
        if wide {
            self.entries.push(CpInfo::Unusable);
        }
        Ok(index)
    }

    fn remember(&mut self, index: u16, info: &CpInfo) {
        if let Some(key) = info.key() {
            self.lookup.entry(key).or_insert(index);
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len()).map_err(|_| Error::ConstantPoolOverflow)?;
        out.extend_from_slice(&count.to_be_bytes());
        for info in self.entries.iter().skip(1) {
            match info {
                CpInfo::Unusable => {}
                CpInfo::Utf8(s) => {
                    let bytes = encode_modified_utf8(s);
                    let len = u16::try_from(bytes.len())
                        .map_err(|_| Error::Other("Utf8 constant longer than 65535 bytes"))?;
                    out.push(CONSTANT_UTF8);
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                CpInfo::Integer(v) => {
                    out.push(CONSTANT_INTEGER);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                CpInfo::Float(v) => {
                    out.push(CONSTANT_FLOAT);
                    out.extend_from_slice(&v.to_bits().to_be_bytes());
                }
                CpInfo::Long(v) => {
                    out.push(CONSTANT_LONG);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                CpInfo::Double(v) => {
                    out.push(CONSTANT_DOUBLE);
                    out.extend_from_slice(&v.to_bits().to_be_bytes());
                }
                CpInfo::Class { name_index } => write_u2_entry(out, CONSTANT_CLASS, *name_index),
                CpInfo::String { string_index } => {
                    write_u2_entry(out, CONSTANT_STRING, *string_index)
                }
                CpInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                } => write_u2_pair(out, CONSTANT_FIELDREF, *class_index, *name_and_type_index),
                CpInfo::Methodref {
                    class_index,
                    name_and_type_index,
                } => write_u2_pair(out, CONSTANT_METHODREF, *class_index, *name_and_type_index),
                CpInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => write_u2_pair(
                    out,
                    CONSTANT_INTERFACE_METHODREF,
                    *class_index,
                    *name_and_type_index,
                ),
                CpInfo::NameAndType {
                    name_index,
                    descriptor_index,
                } => write_u2_pair(out, CONSTANT_NAME_AND_TYPE, *name_index, *descriptor_index),
                CpInfo::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    out.push(CONSTANT_METHOD_HANDLE);
                    out.push(*reference_kind);
                    out.extend_from_slice(&reference_index.to_be_bytes());
                }
                CpInfo::MethodType { descriptor_index } => {
                    write_u2_entry(out, CONSTANT_METHOD_TYPE, *descriptor_index)
                }
                CpInfo::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => write_u2_pair(
                    out,
                    CONSTANT_DYNAMIC,
                    *bootstrap_method_attr_index,
                    *name_and_type_index,
                ),
                CpInfo::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => write_u2_pair(
                    out,
                    CONSTANT_INVOKE_DYNAMIC,
                    *bootstrap_method_attr_index,
                    *name_and_type_index,
                ),
                CpInfo::Module { name_index } => write_u2_entry(out, CONSTANT_MODULE, *name_index),
                CpInfo::Package { name_index } => {
                    write_u2_entry(out, CONSTANT_PACKAGE, *name_index)
                }
            }
        }
        Ok(())
    }
}

fn write_u2_entry(out: &mut Vec<u8>, tag: u8, value: u16) {
    out.push(tag);
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u2_pair(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    out.push(tag);
    out.extend_from_slice(&first.to_be_bytes());
    out.extend_from_slice(&second.to_be_bytes());
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            if b == 0 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1).ok_or(Error::InvalidModifiedUtf8)?;
            if b2 & 0xC0 != 0x80 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1).ok_or(Error::InvalidModifiedUtf8)?;
            let b3 = *bytes.get(i + 2).ok_or(Error::InvalidModifiedUtf8)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return Err(Error::InvalidModifiedUtf8);
            }
            units.push((((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16);
            i += 3;
        } else {
            return Err(Error::InvalidModifiedUtf8);
        }
    }
    // Supplementary characters arrive as surrogate pairs.
    String::from_utf16(&units).map_err(|_| Error::InvalidModifiedUtf8)
}

fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.method_ref("com/acme/Repo", "find", "()V").unwrap();
        let b = pool.method_ref("com/acme/Repo", "find", "()V").unwrap();
        assert_eq!(a, b);
        let class = pool.class("com/acme/Repo").unwrap();
        assert_eq!(pool.get_class_name(class).unwrap(), "com/acme/Repo");
        assert_eq!(
            pool.get_member_ref(a).unwrap(),
            (
                "com/acme/Repo".to_string(),
                "find".to_string(),
                "()V".to_string()
            )
        );
    }

    #[test]
    fn modified_utf8_round_trips_nul_and_supplementary() {
        let text = "a\u{0}\u{e9}\u{1F600}";
        let encoded = encode_modified_utf8(text);
        assert!(!encoded.contains(&0));
        // NUL is two bytes, U+1F600 is a six byte surrogate pair.
        assert_eq!(encoded.len(), 1 + 2 + 2 + 6);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
    }

    #[test]
    fn written_pool_parses_back() {
        let mut pool = ConstantPool::new();
        pool.string("hello").unwrap();
        pool.intern(CpInfo::Long(-5)).unwrap();
        let after_long = pool.integer(7).unwrap();

        let mut bytes = Vec::new();
        pool.write(&mut bytes).unwrap();
        let parsed = ConstantPool::parse(&mut Reader::new(&bytes)).unwrap();

        assert_eq!(parsed.count(), pool.count());
        assert_eq!(parsed.get(after_long).unwrap(), &CpInfo::Integer(7));
        assert!(parsed.get(after_long - 1).is_err());
    }
}
