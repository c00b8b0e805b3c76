//! Parsers for the generic `Signature` attribute grammar (JVMS §4.7.9.1).

use crate::descriptor::BaseType;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub super_class: ClassTypeSignature,
    pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<TypeSignature>,
    /// `None` for `void`.
    pub return_type: Option<TypeSignature>,
    pub throws: Vec<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub class_bound: Option<TypeSignature>,
    pub interface_bounds: Vec<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
    /// Outermost first. The first segment carries the package prefix
    /// (`java/util/Map`), later segments are simple inner names (`Entry`).
    pub segments: Vec<SimpleClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClassTypeSignature {
    pub name: String,
    pub type_arguments: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
    Any,
    Exact(TypeSignature),
    Extends(TypeSignature),
    Super(TypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSignature {
    Base(BaseType),
    Array(Box<TypeSignature>),
    Class(ClassTypeSignature),
    TypeVariable(String),
}

/// Field signatures are reference type signatures.
pub type FieldTypeSignature = TypeSignature;

impl ClassTypeSignature {
    /// Internal name of the (innermost) class, e.g. `java/util/Map$Entry`.
    pub fn internal_name(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('$');
            }
            out.push_str(&segment.name);
        }
        out
    }

    pub fn has_type_arguments(&self) -> bool {
        self.segments.iter().any(|s| !s.type_arguments.is_empty())
    }
}

pub fn parse_class_signature(sig: &str) -> Result<ClassSignature> {
    let mut p = Parser::new(sig);
    let type_parameters = p.type_parameters()?;
    let super_class = p.class_type()?;
    let mut interfaces = Vec::new();
    while !p.at_end() {
        interfaces.push(p.class_type()?);
    }
    Ok(ClassSignature {
        type_parameters,
        super_class,
        interfaces,
    })
}

pub fn parse_field_signature(sig: &str) -> Result<FieldTypeSignature> {
    let mut p = Parser::new(sig);
    let ty = p.reference_type()?;
    p.finish()?;
    Ok(ty)
}

pub fn parse_method_signature(sig: &str) -> Result<MethodSignature> {
    let mut p = Parser::new(sig);
    let type_parameters = p.type_parameters()?;
    p.expect(b'(')?;
    let mut parameters = Vec::new();
    while p.peek()? != b')' {
        parameters.push(p.java_type()?);
    }
    p.expect(b')')?;
    let return_type = if p.peek()? == b'V' {
        p.bump();
        None
    } else {
        Some(p.java_type()?)
    };
    let mut throws = Vec::new();
    while !p.at_end() {
        p.expect(b'^')?;
        throws.push(p.reference_type()?);
    }
    Ok(MethodSignature {
        type_parameters,
        parameters,
        return_type,
        throws,
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self) -> Error {
        Error::InvalidSignature(self.input.to_string())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn finish(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn peek(&self) -> Result<u8> {
        self.input
            .as_bytes()
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error())
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek()? == byte {
            self.bump();
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn identifier(&mut self, stops: &[u8]) -> Result<&'a str> {
        let start = self.pos;
        while !self.at_end() && !stops.contains(&self.input.as_bytes()[self.pos]) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error());
        }
        Ok(&self.input[start..self.pos])
    }

    fn type_parameters(&mut self) -> Result<Vec<TypeParameter>> {
        let mut params = Vec::new();
        if self.at_end() || self.peek()? != b'<' {
            return Ok(params);
        }
        self.bump();
        while self.peek()? != b'>' {
            let name = self.identifier(b":>")?.to_string();
            self.expect(b':')?;
            // An empty class bound means "interface bounds only".
            let class_bound = match self.peek()? {
                b':' | b'>' => None,
                _ => Some(self.reference_type()?),
            };
            let mut interface_bounds = Vec::new();
            while self.peek()? == b':' {
                self.bump();
                interface_bounds.push(self.reference_type()?);
            }
            params.push(TypeParameter {
                name,
                class_bound,
                interface_bounds,
            });
        }
        self.bump();
        if params.is_empty() {
            return Err(self.error());
        }
        Ok(params)
    }

    fn java_type(&mut self) -> Result<TypeSignature> {
        let base = match self.peek()? {
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'D' => BaseType::Double,
            b'F' => BaseType::Float,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'S' => BaseType::Short,
            b'Z' => BaseType::Boolean,
            _ => return self.reference_type(),
        };
        self.bump();
        Ok(TypeSignature::Base(base))
    }

    fn reference_type(&mut self) -> Result<TypeSignature> {
        match self.peek()? {
            b'L' => Ok(TypeSignature::Class(self.class_type()?)),
            b'T' => {
                self.bump();
                let name = self.identifier(b";")?.to_string();
                self.expect(b';')?;
                Ok(TypeSignature::TypeVariable(name))
            }
            b'[' => {
                self.bump();
                Ok(TypeSignature::Array(Box::new(self.java_type()?)))
            }
            _ => Err(self.error()),
        }
    }

    fn class_type(&mut self) -> Result<ClassTypeSignature> {
        self.expect(b'L')?;
        let mut segments = Vec::new();
        loop {
            let name = self.identifier(b"<.;")?.to_string();
            let type_arguments = if self.peek()? == b'<' {
                self.type_arguments()?
            } else {
                Vec::new()
            };
            segments.push(SimpleClassTypeSignature {
                name,
                type_arguments,
            });
            match self.peek()? {
                b'.' => self.bump(),
                b';' => {
                    self.bump();
                    return Ok(ClassTypeSignature { segments });
                }
                _ => return Err(self.error()),
            }
        }
    }

    fn type_arguments(&mut self) -> Result<Vec<TypeArgument>> {
        self.expect(b'<')?;
        let mut args = Vec::new();
        while self.peek()? != b'>' {
            let arg = match self.peek()? {
                b'*' => {
                    self.bump();
                    TypeArgument::Any
                }
                b'+' => {
                    self.bump();
                    TypeArgument::Extends(self.reference_type()?)
                }
                b'-' => {
                    self.bump();
                    TypeArgument::Super(self.reference_type()?)
                }
                _ => TypeArgument::Exact(self.reference_type()?),
            };
            args.push(arg);
        }
        self.bump();
        if args.is_empty() {
            return Err(self.error());
        }
        Ok(args)
    }
}
