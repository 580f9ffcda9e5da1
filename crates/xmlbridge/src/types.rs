//! Native record layouts
//!
//! Key design principles:
//! 1. Records link to each other through `RecordPtr` addresses, never through Rust references
//! 2. Every kind except namespaces shares one layout (`StdRecord`)
//! 3. Namespaces keep their own irregular layout (`NsRecord`) with no parent link
//! 4. Tags are raw bytes, so the tag space can hold kinds this crate does not support

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a native record inside the arena.
///
/// The generation changes every time a slot is freed, so an address that
/// outlived its record never resolves to whatever was allocated there next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordPtr {
    index: u32,
    generation: u32,
}

impl RecordPtr {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RecordPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}@{}", self.index, self.generation)
    }
}

/// Raw record tags, numbered like libxml2's `xmlElementType`.
pub mod tag {
    pub const ELEMENT: u8 = 1;
    pub const ATTRIBUTE: u8 = 2;
    pub const TEXT: u8 = 3;
    pub const CDATA_SECTION: u8 = 4;
    pub const ENTITY_REF: u8 = 5;
    pub const ENTITY: u8 = 6;
    pub const PI: u8 = 7;
    pub const COMMENT: u8 = 8;
    pub const DOCUMENT: u8 = 9;
    pub const DOCUMENT_TYPE: u8 = 10;
    pub const DOCUMENT_FRAGMENT: u8 = 11;
    pub const NOTATION: u8 = 12;
    pub const HTML_DOCUMENT: u8 = 13;
    pub const DTD: u8 = 14;
    pub const NAMESPACE_DECL: u8 = 18;
}

/// Record kinds this crate knows how to wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Kind {
    Element = tag::ELEMENT,
    Attribute = tag::ATTRIBUTE,
    Text = tag::TEXT,
    CData = tag::CDATA_SECTION,
    ProcessingInstruction = tag::PI,
    Comment = tag::COMMENT,
    Document = tag::DOCUMENT,
    HtmlDocument = tag::HTML_DOCUMENT,
    Dtd = tag::DTD,
    Namespace = tag::NAMESPACE_DECL,
}

impl Kind {
    pub const ALL: [Kind; 10] = [
        Kind::Element,
        Kind::Attribute,
        Kind::Text,
        Kind::CData,
        Kind::ProcessingInstruction,
        Kind::Comment,
        Kind::Document,
        Kind::HtmlDocument,
        Kind::Dtd,
        Kind::Namespace,
    ];

    pub fn from_tag(value: u8) -> Option<Self> {
        match value {
            tag::ELEMENT => Some(Kind::Element),
            tag::ATTRIBUTE => Some(Kind::Attribute),
            tag::TEXT => Some(Kind::Text),
            tag::CDATA_SECTION => Some(Kind::CData),
            tag::PI => Some(Kind::ProcessingInstruction),
            tag::COMMENT => Some(Kind::Comment),
            tag::DOCUMENT => Some(Kind::Document),
            tag::HTML_DOCUMENT => Some(Kind::HtmlDocument),
            tag::DTD => Some(Kind::Dtd),
            tag::NAMESPACE_DECL => Some(Kind::Namespace),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Element, text, comment, processing instruction or CDATA
    pub fn is_content(self) -> bool {
        matches!(
            self,
            Kind::Element
                | Kind::Text
                | Kind::Comment
                | Kind::ProcessingInstruction
                | Kind::CData
        )
    }

    pub fn is_document(self) -> bool {
        matches!(self, Kind::Document | Kind::HtmlDocument)
    }

    /// Kinds that may sit in a `children` list
    pub fn is_child(self) -> bool {
        self.is_content() || self == Kind::Dtd
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Element => "element",
            Kind::Attribute => "attribute",
            Kind::Text => "text",
            Kind::CData => "cdata",
            Kind::ProcessingInstruction => "processing-instruction",
            Kind::Comment => "comment",
            Kind::Document => "document",
            Kind::HtmlDocument => "html-document",
            Kind::Dtd => "dtd",
            Kind::Namespace => "namespace",
        };
        f.write_str(name)
    }
}

/// Shared-prefix layout used by every record kind except namespaces.
///
/// `doc == None` is the standalone sentinel: the record belongs to no document.
#[derive(Debug, Clone)]
pub struct StdRecord {
    /// Reserved for wrapper association; this crate never writes it.
    pub private: Option<u64>,
    pub tag: u8,
    pub name: String,
    pub children: Option<RecordPtr>,
    pub last: Option<RecordPtr>,
    pub parent: Option<RecordPtr>,
    pub next: Option<RecordPtr>,
    pub prev: Option<RecordPtr>,
    pub doc: Option<RecordPtr>,

    // Element tail
    pub ns: Option<RecordPtr>,
    pub ns_def: Option<RecordPtr>,
    pub properties: Option<RecordPtr>,
    pub content: Option<String>,
}

impl StdRecord {
    pub fn new(tag: u8, name: impl Into<String>) -> Self {
        Self {
            private: None,
            tag,
            name: name.into(),
            children: None,
            last: None,
            parent: None,
            next: None,
            prev: None,
            doc: None,
            ns: None,
            ns_def: None,
            properties: None,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn in_document(mut self, doc: Option<RecordPtr>) -> Self {
        self.doc = doc;
        self
    }

    /// No parent and no siblings
    pub fn is_unlinked(&self) -> bool {
        self.parent.is_none() && self.prev.is_none() && self.next.is_none()
    }
}

/// Irregular namespace layout. There is no parent field at all.
#[derive(Debug, Clone)]
pub struct NsRecord {
    pub next: Option<RecordPtr>,
    pub tag: u8,
    pub href: String,
    pub prefix: Option<String>,
    /// Reserved for wrapper association; this crate never writes it.
    pub private: Option<u64>,
    /// Owning document
    pub context: Option<RecordPtr>,
}

impl NsRecord {
    pub fn new(href: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            next: None,
            tag: tag::NAMESPACE_DECL,
            href: href.into(),
            prefix: prefix.map(String::from),
            private: None,
            context: None,
        }
    }
}

/// One slot's worth of native memory
#[derive(Debug, Clone)]
pub enum NativeRecord {
    Std(StdRecord),
    Ns(NsRecord),
}

impl NativeRecord {
    pub fn tag(&self) -> u8 {
        match self {
            NativeRecord::Std(record) => record.tag,
            NativeRecord::Ns(record) => record.tag,
        }
    }

    pub fn as_std(&self) -> Option<&StdRecord> {
        match self {
            NativeRecord::Std(record) => Some(record),
            NativeRecord::Ns(_) => None,
        }
    }

    pub fn as_std_mut(&mut self) -> Option<&mut StdRecord> {
        match self {
            NativeRecord::Std(record) => Some(record),
            NativeRecord::Ns(_) => None,
        }
    }

    pub fn as_ns(&self) -> Option<&NsRecord> {
        match self {
            NativeRecord::Ns(record) => Some(record),
            NativeRecord::Std(_) => None,
        }
    }

    pub fn as_ns_mut(&mut self) -> Option<&mut NsRecord> {
        match self {
            NativeRecord::Ns(record) => Some(record),
            NativeRecord::Std(_) => None,
        }
    }
}
