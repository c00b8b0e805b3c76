use crate::annotation::Annotation;
use crate::code::Code;
use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::reader::Reader;

const MAGIC: u32 = 0xCAFEBABE;

/// Class-file major version used for generated classes (Java 8).
pub const JAVA_8: u16 = 52;

/// A class file as read from disk or built from scratch.
///
/// Attributes are kept as raw bytes and written back verbatim. The constant
/// pool only ever grows, so every index inside a kept attribute stays valid
/// no matter what is added while enhancing.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ClassMember>,
    pub methods: Vec<ClassMember>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMember {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<Attribute>,
}

/// One entry of a `Record` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub info: Vec<u8>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, info: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }

    pub fn signature(cp: &mut ConstantPool, signature: &str) -> Result<Self> {
        let index = cp.utf8(signature)?;
        Ok(Self::new("Signature", index.to_be_bytes().to_vec()))
    }

    pub fn annotations(
        cp: &mut ConstantPool,
        visible: bool,
        annotations: &[Annotation],
    ) -> Result<Self> {
        let name = if visible {
            "RuntimeVisibleAnnotations"
        } else {
            "RuntimeInvisibleAnnotations"
        };
        let mut info = Vec::new();
        info.extend_from_slice(&u16_len(annotations.len())?.to_be_bytes());
        for annotation in annotations {
            annotation.write(cp, &mut info)?;
        }
        Ok(Self::new(name, info))
    }

    /// `MethodParameters` with no access flags on any parameter.
    pub fn method_parameters(cp: &mut ConstantPool, names: &[String]) -> Result<Self> {
        let count = u8::try_from(names.len())
            .map_err(|_| Error::MalformedAttribute("MethodParameters"))?;
        let mut info = vec![count];
        for name in names {
            info.extend_from_slice(&cp.utf8(name)?.to_be_bytes());
            info.extend_from_slice(&0u16.to_be_bytes());
        }
        Ok(Self::new("MethodParameters", info))
    }

    pub fn record(cp: &mut ConstantPool, components: &[RecordComponent]) -> Result<Self> {
        let mut info = Vec::new();
        push_u2(&mut info, u16_len(components.len())?);
        for component in components {
            push_u2(&mut info, cp.utf8(&component.name)?);
            push_u2(&mut info, cp.utf8(&component.descriptor)?);
            let attributes = match &component.signature {
                Some(sig) => vec![Self::signature(cp, sig)?],
                None => Vec::new(),
            };
            write_attributes(&mut info, cp, &attributes)?;
        }
        Ok(Self::new("Record", info))
    }
}

impl ClassMember {
    pub fn new(access_flags: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access_flags,
            name: name.into(),
            descriptor: descriptor.into(),
            attributes: Vec::new(),
        }
    }

    pub fn has_flags(&self, flags: u16) -> bool {
        self.access_flags & flags == flags
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Replaces any attribute with the same name.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        self.attributes.retain(|attr| attr.name != attribute.name);
        self.attributes.push(attribute);
    }

    pub fn signature(&self, cp: &ConstantPool) -> Result<Option<String>> {
        read_signature(&self.attributes, cp)
    }

    pub fn annotations(&self, cp: &ConstantPool) -> Result<Vec<Annotation>> {
        read_annotations(&self.attributes, cp)
    }

    /// Parameter names from a `MethodParameters` attribute, if present.
    pub fn parameter_names(&self, cp: &ConstantPool) -> Result<Option<Vec<String>>> {
        let Some(attr) = self.attribute("MethodParameters") else {
            return Ok(None);
        };
        let mut reader = Reader::new(&attr.info);
        let count = reader.read_u1()? as usize;
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            let name_index = reader.read_u2()?;
            let _flags = reader.read_u2()?;
            // Unnamed (index 0) parameters make the whole list unusable.
            if name_index == 0 {
                return Ok(None);
            }
            names.push(cp.get_utf8(name_index)?.to_string());
        }
        reader.ensure_empty()?;
        Ok(Some(names))
    }

    pub fn code(&self, cp: &ConstantPool) -> Result<Option<Code>> {
        self.attribute("Code")
            .map(|attr| Code::parse(&attr.info, cp))
            .transpose()
    }

    pub fn set_code(&mut self, cp: &mut ConstantPool, code: &Code) -> Result<()> {
        let attr = code.to_attribute(cp)?;
        self.set_attribute(attr);
        Ok(())
    }
}

impl ClassFile {
    /// An empty class with a fresh constant pool.
    pub fn new(access_flags: u16, this_class: &str, super_class: Option<&str>) -> Self {
        Self {
            minor_version: 0,
            major_version: JAVA_8,
            constant_pool: ConstantPool::new(),
            access_flags,
            this_class: this_class.to_string(),
            super_class: super_class.map(str::to_string),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class_idx = reader.read_u2()?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(cp.get_class_name(super_class_idx)?)
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_member(&mut reader, &cp)?);
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_member(&mut reader, &cp)?);
        }

        let attributes = parse_attributes(&mut reader, &cp)?;

        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            constant_pool: cp,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serializes the class. Names referenced by members and attributes are
    /// interned into a copy of the pool, so `self` is left untouched.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cp = self.constant_pool.clone();
        let mut body = Vec::new();

        push_u2(&mut body, self.access_flags);
        push_u2(&mut body, cp.class(&self.this_class)?);
        match &self.super_class {
            Some(name) => push_u2(&mut body, cp.class(name)?),
            None => push_u2(&mut body, 0),
        }
        push_u2(&mut body, u16_len(self.interfaces.len())?);
        for interface in &self.interfaces {
            push_u2(&mut body, cp.class(interface)?);
        }
        for members in [&self.fields, &self.methods] {
            push_u2(&mut body, u16_len(members.len())?);
            for member in members {
                push_u2(&mut body, member.access_flags);
                push_u2(&mut body, cp.utf8(&member.name)?);
                push_u2(&mut body, cp.utf8(&member.descriptor)?);
                write_attributes(&mut body, &mut cp, &member.attributes)?;
            }
        }
        write_attributes(&mut body, &mut cp, &self.attributes)?;

        let mut out = Vec::with_capacity(body.len() + 64);
        out.extend_from_slice(&MAGIC.to_be_bytes());
        push_u2(&mut out, self.minor_version);
        push_u2(&mut out, self.major_version);
        cp.write(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn has_flags(&self, flags: u16) -> bool {
        self.access_flags & flags == flags
    }

    pub fn signature(&self) -> Result<Option<String>> {
        read_signature(&self.attributes, &self.constant_pool)
    }

    pub fn annotations(&self) -> Result<Vec<Annotation>> {
        read_annotations(&self.attributes, &self.constant_pool)
    }

    pub fn set_attribute(&mut self, attribute: Attribute) {
        self.attributes.retain(|attr| attr.name != attribute.name);
        self.attributes.push(attribute);
    }

    /// Components from the `Record` attribute; `None` for non-record classes.
    pub fn record_components(&self) -> Result<Option<Vec<RecordComponent>>> {
        let Some(attr) = self.attributes.iter().find(|a| a.name == "Record") else {
            return Ok(None);
        };
        let cp = &self.constant_pool;
        let mut reader = Reader::new(&attr.info);
        let count = reader.read_u2()? as usize;
        let mut components = Vec::with_capacity(count);
        for _ in 0..count {
            let name = cp.get_utf8(reader.read_u2()?)?.to_string();
            let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
            let attributes = parse_attributes(&mut reader, cp)?;
            components.push(RecordComponent {
                name,
                descriptor,
                signature: read_signature(&attributes, cp)?,
            });
        }
        reader.ensure_empty()?;
        Ok(Some(components))
    }

    pub fn field(&self, name: &str) -> Option<&ClassMember> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&ClassMember> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

fn parse_member(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ClassMember> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
    let attributes = parse_attributes(reader, cp)?;
    Ok(ClassMember {
        access_flags,
        name,
        descriptor,
        attributes,
    })
}

pub(crate) fn parse_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<Attribute>> {
    let attributes_count = reader.read_u2()? as usize;
    let mut attributes = Vec::with_capacity(attributes_count);
    for _ in 0..attributes_count {
        let name = cp.get_utf8(reader.read_u2()?)?.to_string();
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?.to_vec();
        attributes.push(Attribute { name, info });
    }
    Ok(attributes)
}

pub(crate) fn write_attributes(
    out: &mut Vec<u8>,
    cp: &mut ConstantPool,
    attributes: &[Attribute],
) -> Result<()> {
    push_u2(out, u16_len(attributes.len())?);
    for attr in attributes {
        push_u2(out, cp.utf8(&attr.name)?);
        let len = u32::try_from(attr.info.len()).map_err(|_| Error::Other("attribute too large"))?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&attr.info);
    }
    Ok(())
}

fn read_signature(attributes: &[Attribute], cp: &ConstantPool) -> Result<Option<String>> {
    let Some(attr) = attributes.iter().find(|a| a.name == "Signature") else {
        return Ok(None);
    };
    let mut reader = Reader::new(&attr.info);
    let index = reader.read_u2()?;
    reader.ensure_empty()?;
    Ok(Some(cp.get_utf8(index)?.to_string()))
}

fn read_annotations(attributes: &[Attribute], cp: &ConstantPool) -> Result<Vec<Annotation>> {
    let mut out = Vec::new();
    for attr in attributes {
        if attr.name != "RuntimeVisibleAnnotations" && attr.name != "RuntimeInvisibleAnnotations" {
            continue;
        }
        let mut reader = Reader::new(&attr.info);
        let num = reader.read_u2()? as usize;
        for _ in 0..num {
            out.push(Annotation::parse(&mut reader, cp)?);
        }
        reader.ensure_empty()?;
    }
    Ok(out)
}

pub(crate) fn push_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn u16_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::Other("table exceeds 65535 entries"))
}
