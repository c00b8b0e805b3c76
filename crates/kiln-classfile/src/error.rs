use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnexpectedEof,
    InvalidMagic(u32),
    InvalidConstantPoolIndex(u16),
    InvalidConstantPoolTag(u8),
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    InvalidModifiedUtf8,
    InvalidDescriptor(String),
    InvalidSignature(String),
    MalformedAttribute(&'static str),
    /// More than 65535 constant pool slots would be needed.
    ConstantPoolOverflow,
    /// A method body grew past the 64KiB limit of the `Code` attribute.
    CodeTooLarge(usize),
    UnknownOpcode {
        opcode: u8,
        offset: usize,
    },
    Other(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof => f.write_str("class file is truncated"),
            Error::InvalidMagic(magic) => write!(f, "not a class file (magic 0x{magic:08x})"),
            Error::InvalidConstantPoolIndex(index) => {
                write!(f, "constant pool index {index} is out of range")
            }
            Error::InvalidConstantPoolTag(tag) => write!(f, "unknown constant pool tag {tag}"),
            Error::ConstantPoolTypeMismatch {
                index,
                expected,
                found,
            } => write!(
                f,
                "constant pool entry {index} is {found}, expected {expected}"
            ),
            Error::InvalidModifiedUtf8 => f.write_str("malformed modified UTF-8 in constant pool"),
            Error::InvalidDescriptor(desc) => write!(f, "bad descriptor {desc:?}"),
            Error::InvalidSignature(sig) => write!(f, "bad generic signature {sig:?}"),
            Error::MalformedAttribute(name) => write!(f, "malformed {name}"),
            Error::ConstantPoolOverflow => write!(f, "constant pool exceeds 65535 entries"),
            Error::CodeTooLarge(len) => write!(f, "method code too large: {len} bytes"),
            Error::UnknownOpcode { opcode, offset } => {
                write!(f, "unknown opcode 0x{opcode:02x} at offset {offset}")
            }
            Error::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}
