use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Audit fields rewritten on every save and ignored when comparing.
pub const DEFAULT_AUDIT_FIELDS: [&str; 2] = ["lastModifiedBy", "lastModifiedDate"];

/// Decides whether two documents differ in anything that matters.
pub trait SemanticEquality: Send + Sync {
    fn equivalent(&self, left: &[u8], right: &[u8]) -> bool;
}

/// Plain byte equality.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteEquality;

impl SemanticEquality for ByteEquality {
    fn equivalent(&self, left: &[u8], right: &[u8]) -> bool {
        left == right
    }
}

/// One step of a canonical XML document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlToken {
    /// Element name and its attributes sorted by name.
    Open {
        name: Vec<u8>,
        attributes: Vec<(Vec<u8>, Vec<u8>)>,
    },
    Close(Vec<u8>),
    Text(Vec<u8>),
    /// Declarations, comments and processing instructions.
    Other(Event<'static>),
}

/// XML equality that ignores audit fields.
///
/// A field matches by local name, so `dc:lastModifiedBy` is masked and
/// `xlastModifiedBy` is not. Audit attributes are dropped whatever their
/// quoting; audit elements keep their place but lose their content.
/// Attribute order and whitespace around text are insignificant.
/// Content that is not a well-formed element tree is compared byte for
/// byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditFieldMask {
    fields: Vec<String>,
}

impl AuditFieldMask {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn is_audit(&self, local_name: &[u8]) -> bool {
        self.fields.iter().any(|f| f.as_bytes() == local_name)
    }

    fn open(&self, start: &BytesStart<'_>) -> Option<XmlToken> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.ok()?;
            if self.is_audit(attr.key.local_name().as_ref()) {
                continue;
            }
            attributes.push((attr.key.as_ref().to_vec(), attr.value.into_owned()));
        }
        attributes.sort();
        Some(XmlToken::Open {
            name: start.name().as_ref().to_vec(),
            attributes,
        })
    }

    /// Canonical token stream of `content` with audit fields removed, or
    /// `None` if `content` is not a well-formed element tree.
    pub fn canonical(&self, content: &[u8]) -> Option<Vec<XmlToken>> {
        let mut reader = Reader::from_reader(content);
        reader.config_mut().trim_text(true);

        let mut tokens = Vec::new();
        let mut depth = 0usize;
        // Depth of the audit element being skipped, if any.
        let mut masked: Option<usize> = None;
        let mut saw_element = false;

        loop {
            let event = reader.read_event().ok()?;
            match event {
                Event::Start(start) => {
                    saw_element = true;
                    depth += 1;
                    if masked.is_some() {
                        continue;
                    }
                    tokens.push(self.open(&start)?);
                    if self.is_audit(start.local_name().as_ref()) {
                        masked = Some(depth);
                    }
                }
                Event::Empty(start) => {
                    saw_element = true;
                    if masked.is_some() {
                        continue;
                    }
                    tokens.push(self.open(&start)?);
                    tokens.push(XmlToken::Close(start.name().as_ref().to_vec()));
                }
                Event::End(end) => {
                    if masked == Some(depth) {
                        masked = None;
                    }
                    depth = depth.checked_sub(1)?;
                    if masked.is_none() {
                        tokens.push(XmlToken::Close(end.name().as_ref().to_vec()));
                    }
                }
                Event::Text(text) => {
                    if masked.is_none() && !text.is_empty() {
                        tokens.push(XmlToken::Text(text.into_inner().into_owned()));
                    }
                }
                Event::CData(data) => {
                    if masked.is_none() {
                        tokens.push(XmlToken::Text(data.into_inner().into_owned()));
                    }
                }
                Event::Eof => break,
                other => {
                    if masked.is_none() {
                        tokens.push(XmlToken::Other(other.into_owned()));
                    }
                }
            }
        }

        (saw_element && depth == 0).then_some(tokens)
    }
}

impl Default for AuditFieldMask {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_FIELDS)
    }
}

impl SemanticEquality for AuditFieldMask {
    fn equivalent(&self, left: &[u8], right: &[u8]) -> bool {
        if left == right {
            return true;
        }
        match (self.canonical(left), self.canonical(right)) {
            (Some(l), Some(r)) => l == r,
            _ => ByteEquality.equivalent(left, right),
        }
    }
}
