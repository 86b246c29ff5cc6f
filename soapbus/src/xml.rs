//! # Module XML
//!
//! Pull cursor abstraction used by the streaming parts of the binding.
//!
//! - [`XmlCursor`]: forward-only cursor over XML events, in the spirit of StAX.
//!   Namespace declarations are reported as attributes (`xmlns:p="..."`).
//! - [`QuickXmlCursor`]: a cursor over a string, backed by `quick-xml`. It can
//!   be seeded with namespace bindings inherited from an enclosing document,
//!   which is how a SOAP body fragment keeps the prefixes of its envelope.
//! - [`copy_document`] / [`to_xml_string`]: pump a cursor into a
//!   `quick_xml::Writer`, declaring any prefix the output would otherwise miss.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::errors::XmlError;
use crate::qname::QName;

pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument,
    StartElement,
    EndElement,
    Characters,
    EndDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: String,
    pub value: String,
}

impl XmlAttribute {
    /// `xmlns:{prefix}="{namespace}"`
    pub fn namespace_decl(prefix: &str, namespace: &str) -> Self {
        if prefix.is_empty() {
            XmlAttribute {
                prefix: None,
                local: "xmlns".to_string(),
                namespace: XMLNS_NS.to_string(),
                value: namespace.to_string(),
            }
        } else {
            XmlAttribute {
                prefix: Some("xmlns".to_string()),
                local: prefix.to_string(),
                namespace: XMLNS_NS.to_string(),
                value: namespace.to_string(),
            }
        }
    }

    pub fn plain(local: &str, value: &str) -> Self {
        XmlAttribute {
            prefix: None,
            local: local.to_string(),
            namespace: String::new(),
            value: value.to_string(),
        }
    }

    /// Declared prefix when this attribute is a namespace declaration
    /// (`""` for the default namespace).
    pub fn declared_prefix(&self) -> Option<&str> {
        match self.prefix.as_deref() {
            Some("xmlns") => Some(&self.local),
            None if self.local == "xmlns" => Some(""),
            _ => None,
        }
    }

    pub fn raw_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

/// Forward-only XML event cursor.
///
/// A cursor is positioned on `StartDocument` when created. Accessors describe
/// the current event; calling them on an event they do not apply to is an
/// [`XmlError::IllegalState`].
pub trait XmlCursor {
    fn event(&self) -> XmlEvent;

    /// Moves to the next event. Fails once `EndDocument` has been reached.
    fn next(&mut self) -> Result<XmlEvent, XmlError>;

    fn has_next(&self) -> bool {
        self.event() != XmlEvent::EndDocument
    }

    /// Qualified name of the current start or end element.
    fn name(&self) -> Result<QName, XmlError>;

    /// Prefix of the current start or end element.
    fn prefix(&self) -> Result<Option<String>, XmlError>;

    /// Text of the current `Characters` event.
    fn text(&self) -> Result<String, XmlError>;

    fn attribute_count(&self) -> Result<usize, XmlError>;

    fn attribute(&self, index: usize) -> Result<XmlAttribute, XmlError>;
}

/// Stack of in-scope namespace bindings.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScopes {
    scopes: Vec<Vec<(String, String)>>,
}

impl NamespaceScopes {
    /// Scopes starting with `inherited` as the outermost bindings.
    pub fn with_inherited(inherited: Vec<(String, String)>) -> Self {
        Self {
            scopes: vec![inherited],
        }
    }

    pub fn push(&mut self, declarations: Vec<(String, String)>) {
        self.scopes.push(declarations);
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => Some(XML_NS),
            "xmlns" => Some(XMLNS_NS),
            _ => self
                .scopes
                .iter()
                .rev()
                .flat_map(|s| s.iter().rev())
                .find(|(p, _)| p == prefix)
                .map(|(_, ns)| ns.as_str()),
        }
    }

    /// Every binding in scope, innermost wins.
    pub fn in_scope(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for (p, ns) in self.scopes.iter().flatten() {
            match out.iter_mut().find(|(q, _)| q == p) {
                Some(slot) => slot.1 = ns.clone(),
                None => out.push((p.clone(), ns.clone())),
            }
        }
        out
    }
}

/// Splits `prefix:local`.
pub fn split_name(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, raw),
    }
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|e| XmlError::Malformed(e.to_string()))
}

pub(crate) fn unescape(raw: &str) -> Result<String, XmlError> {
    quick_xml::escape::unescape(raw)
        .map(|c| c.into_owned())
        .map_err(|e| XmlError::Malformed(e.to_string()))
}

/// Attributes of a start tag, namespace declarations included, in document order.
pub(crate) fn raw_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, XmlError> {
    let mut out = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = unescape(utf8(&attr.value)?)?;
        out.push((key, value));
    }
    Ok(out)
}

/// Namespace declarations found in a list of raw attributes.
pub(crate) fn declarations(attributes: &[(String, String)]) -> Vec<(String, String)> {
    attributes
        .iter()
        .filter_map(|(k, v)| {
            if k == "xmlns" {
                Some((String::new(), v.clone()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (p.to_string(), v.clone()))
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Current {
    event: XmlEvent,
    name: Option<QName>,
    prefix: Option<String>,
    attributes: Vec<XmlAttribute>,
    text: String,
}

impl Current {
    fn of(event: XmlEvent) -> Self {
        Current {
            event,
            name: None,
            prefix: None,
            attributes: Vec::new(),
            text: String::new(),
        }
    }
}

/// [`XmlCursor`] over an in-memory document, backed by `quick_xml::Reader`.
pub struct QuickXmlCursor<'a> {
    reader: Reader<&'a [u8]>,
    scopes: NamespaceScopes,
    current: Current,
    depth: usize,
    // la portée d'un élément reste visible sur son EndElement
    pending_pop: bool,
}

impl<'a> QuickXmlCursor<'a> {
    pub fn new(xml: &'a str) -> Self {
        Self::with_namespaces(xml, Vec::new())
    }

    /// Cursor over a fragment that may use prefixes bound by an enclosing
    /// document.
    pub fn with_namespaces(xml: &'a str, inherited: Vec<(String, String)>) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().expand_empty_elements = true;
        Self {
            reader,
            scopes: NamespaceScopes::with_inherited(inherited),
            current: Current::of(XmlEvent::StartDocument),
            depth: 0,
            pending_pop: false,
        }
    }

    /// Namespace bound to `prefix` at the current position.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        self.scopes.resolve(prefix)
    }

    /// Every namespace binding in scope at the current position.
    pub fn namespaces_in_scope(&self) -> Vec<(String, String)> {
        self.scopes.in_scope()
    }

    /// Resolves a `prefix:local` value found in text content (fault codes).
    pub fn resolve_text_qname(&self, value: &str) -> Result<QName, XmlError> {
        let (prefix, local) = split_name(value.trim());
        match self.scopes.resolve(prefix.unwrap_or("")) {
            Some(ns) => Ok(QName::new(ns, local)),
            None if prefix.is_none() => Ok(QName::local(local)),
            None => Err(XmlError::Malformed(format!("undeclared prefix in '{}'", value))),
        }
    }

    fn resolve_element(&self, raw: &str) -> Result<(QName, Option<String>), XmlError> {
        let (prefix, local) = split_name(raw);
        let namespace = match self.scopes.resolve(prefix.unwrap_or("")) {
            Some(ns) => ns.to_string(),
            None if prefix.is_none() => String::new(),
            None => {
                return Err(XmlError::Malformed(format!(
                    "undeclared prefix in <{}>",
                    raw
                )));
            }
        };
        Ok((QName::new(namespace, local), prefix.map(str::to_string)))
    }

    fn start(&mut self, start: &BytesStart<'_>) -> Result<(), XmlError> {
        let raw = raw_attributes(start)?;
        self.scopes.push(declarations(&raw));

        let name = utf8(start.name().as_ref())?.to_string();
        let (qname, prefix) = self.resolve_element(&name)?;

        let mut attributes = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let (attr_prefix, local) = split_name(&key);
            let namespace = match attr_prefix {
                _ if key == "xmlns" => XMLNS_NS.to_string(),
                None => String::new(),
                Some(p) => self
                    .scopes
                    .resolve(p)
                    .ok_or_else(|| {
                        XmlError::Malformed(format!("undeclared prefix in attribute {}", key))
                    })?
                    .to_string(),
            };
            attributes.push(XmlAttribute {
                prefix: attr_prefix.map(str::to_string),
                local: local.to_string(),
                namespace,
                value,
            });
        }

        self.depth += 1;
        self.current = Current {
            event: XmlEvent::StartElement,
            name: Some(qname),
            prefix,
            attributes,
            text: String::new(),
        };
        Ok(())
    }

    fn end(&mut self, end: &BytesEnd<'_>) -> Result<(), XmlError> {
        let name = utf8(end.name().as_ref())?.to_string();
        let (qname, prefix) = self.resolve_element(&name)?;
        self.pending_pop = true;
        self.depth = self.depth.saturating_sub(1);
        self.current = Current {
            event: XmlEvent::EndElement,
            name: Some(qname),
            prefix,
            attributes: Vec::new(),
            text: String::new(),
        };
        Ok(())
    }

    fn characters(&mut self, text: String) {
        self.current = Current {
            text,
            ..Current::of(XmlEvent::Characters)
        };
    }
}

impl XmlCursor for QuickXmlCursor<'_> {
    fn event(&self) -> XmlEvent {
        self.current.event
    }

    fn next(&mut self) -> Result<XmlEvent, XmlError> {
        if self.current.event == XmlEvent::EndDocument {
            return Err(XmlError::IllegalState("cursor is past the end of the document".into()));
        }
        if self.pending_pop {
            self.scopes.pop();
            self.pending_pop = false;
        }
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    self.start(&e)?;
                    break;
                }
                Event::End(e) => {
                    self.end(&e)?;
                    break;
                }
                Event::Text(e) => {
                    let text = unescape(utf8(&e)?)?;
                    if self.depth == 0 {
                        if text.trim().is_empty() {
                            continue;
                        }
                        return Err(XmlError::Malformed("text outside of the root element".into()));
                    }
                    self.characters(text);
                    break;
                }
                Event::CData(e) => {
                    let text = utf8(&e)?.to_string();
                    self.characters(text);
                    break;
                }
                Event::GeneralRef(e) => {
                    let text = unescape(&format!("&{};", utf8(&e)?))?;
                    self.characters(text);
                    break;
                }
                Event::Empty(_) => {
                    return Err(XmlError::IllegalState("unexpected empty element event".into()));
                }
                Event::Eof => {
                    if self.depth != 0 {
                        return Err(XmlError::Malformed("unexpected end of document".into()));
                    }
                    self.current = Current::of(XmlEvent::EndDocument);
                    break;
                }
                Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => continue,
            }
        }
        Ok(self.current.event)
    }

    fn name(&self) -> Result<QName, XmlError> {
        self.current
            .name
            .clone()
            .ok_or_else(|| XmlError::IllegalState(format!("no name on {:?}", self.current.event)))
    }

    fn prefix(&self) -> Result<Option<String>, XmlError> {
        match self.current.event {
            XmlEvent::StartElement | XmlEvent::EndElement => Ok(self.current.prefix.clone()),
            other => Err(XmlError::IllegalState(format!("no prefix on {:?}", other))),
        }
    }

    fn text(&self) -> Result<String, XmlError> {
        match self.current.event {
            XmlEvent::Characters => Ok(self.current.text.clone()),
            other => Err(XmlError::IllegalState(format!("no text on {:?}", other))),
        }
    }

    fn attribute_count(&self) -> Result<usize, XmlError> {
        match self.current.event {
            XmlEvent::StartElement => Ok(self.current.attributes.len()),
            other => Err(XmlError::IllegalState(format!("no attributes on {:?}", other))),
        }
    }

    fn attribute(&self, index: usize) -> Result<XmlAttribute, XmlError> {
        let count = self.attribute_count()?;
        self.current
            .attributes
            .get(index)
            .cloned()
            .ok_or(XmlError::AttributeOutOfRange { index, count })
    }
}

/// Writes cursor events to a `quick_xml::Writer`.
///
/// Output scopes are tracked so that a prefix bound outside of the copied
/// fragment is declared again where it is first used.
pub struct EventCopier<'w, W: Write> {
    writer: &'w mut Writer<W>,
    scopes: NamespaceScopes,
    open: Vec<String>,
}

impl<'w, W: Write> EventCopier<'w, W> {
    pub fn new(writer: &'w mut Writer<W>) -> Self {
        Self {
            writer,
            scopes: NamespaceScopes::default(),
            open: Vec::new(),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), XmlError> {
        self.writer
            .write_event(event)
            .map_err(|e| XmlError::Write(e.to_string()))
    }

    /// Depth of the elements opened by this copier.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Writes the event the cursor is positioned on.
    pub fn copy_current<C: XmlCursor + ?Sized>(&mut self, cursor: &C) -> Result<(), XmlError> {
        match cursor.event() {
            XmlEvent::StartElement => self.start(cursor),
            XmlEvent::EndElement => self.end(),
            XmlEvent::Characters => {
                let text = cursor.text()?;
                self.write(Event::Text(BytesText::new(&text)))
            }
            XmlEvent::StartDocument | XmlEvent::EndDocument => Ok(()),
        }
    }

    fn start<C: XmlCursor + ?Sized>(&mut self, cursor: &C) -> Result<(), XmlError> {
        let name = cursor.name()?;
        let prefix = cursor.prefix()?;
        let raw_name = match &prefix {
            Some(p) => format!("{}:{}", p, name.local),
            None => name.local.clone(),
        };

        let mut attributes = Vec::new();
        for i in 0..cursor.attribute_count()? {
            attributes.push(cursor.attribute(i)?);
        }
        let mut declared: Vec<(String, String)> = attributes
            .iter()
            .filter_map(|a| a.declared_prefix().map(|p| (p.to_string(), a.value.clone())))
            .collect();

        let mut missing = Vec::new();
        let mut require = |prefix: &str, namespace: &str, declared: &[(String, String)]| {
            let bound = declared
                .iter()
                .rev()
                .find(|(p, _)| p == prefix)
                .map(|(_, ns)| ns.as_str())
                .or_else(|| self.scopes.resolve(prefix));
            let ok = match bound {
                Some(ns) => ns == namespace,
                None => namespace.is_empty(),
            };
            if !ok {
                missing.push((prefix.to_string(), namespace.to_string()));
            }
        };
        require(prefix.as_deref().unwrap_or(""), &name.namespace, &declared);
        for attr in &attributes {
            if let Some(p) = attr.prefix.as_deref().filter(|p| *p != "xmlns" && *p != "xml") {
                require(p, &attr.namespace, &declared);
            }
        }

        let mut start = BytesStart::new(raw_name.clone());
        for (p, ns) in &missing {
            let decl = XmlAttribute::namespace_decl(p, ns);
            start.push_attribute((decl.raw_name().as_str(), ns.as_str()));
        }
        for attr in &attributes {
            start.push_attribute((attr.raw_name().as_str(), attr.value.as_str()));
        }
        declared.extend(missing);

        self.write(Event::Start(start))?;
        self.scopes.push(declared);
        self.open.push(raw_name);
        Ok(())
    }

    fn end(&mut self) -> Result<(), XmlError> {
        let raw_name = self
            .open
            .pop()
            .ok_or_else(|| XmlError::IllegalState("end element without start".into()))?;
        self.scopes.pop();
        self.write(Event::End(BytesEnd::new(raw_name)))
    }

    /// Copies the element the cursor is positioned on, up to its end tag.
    pub fn copy_subtree<C: XmlCursor + ?Sized>(&mut self, cursor: &mut C) -> Result<(), XmlError> {
        if cursor.event() != XmlEvent::StartElement {
            return Err(XmlError::IllegalState(format!(
                "copy_subtree on {:?}",
                cursor.event()
            )));
        }
        let base = self.depth();
        self.copy_current(cursor)?;
        while self.depth() > base {
            cursor.next()?;
            self.copy_current(cursor)?;
        }
        Ok(())
    }
}

/// Copies every remaining event of `cursor` into `writer`.
pub fn copy_document<C, W>(cursor: &mut C, writer: &mut Writer<W>) -> Result<(), XmlError>
where
    C: XmlCursor + ?Sized,
    W: Write,
{
    let mut copier = EventCopier::new(writer);
    while cursor.next()? != XmlEvent::EndDocument {
        copier.copy_current(cursor)?;
    }
    Ok(())
}

/// Serializes every remaining event of `cursor`.
pub fn to_xml_string<C: XmlCursor + ?Sized>(cursor: &mut C) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    copy_document(cursor, &mut writer)?;
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
}

/// Re-serializes a fragment so that it declares every prefix it uses.
pub fn normalize_fragment(
    xml: &str,
    inherited: Vec<(String, String)>,
) -> Result<String, XmlError> {
    let mut cursor = QuickXmlCursor::with_namespaces(xml, inherited);
    to_xml_string(&mut cursor)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Every event of a cursor as `(event, name or text)`.
    pub(crate) fn events<C: XmlCursor + ?Sized>(cursor: &mut C) -> Vec<(XmlEvent, String)> {
        let mut out = Vec::new();
        loop {
            let ev = cursor.next().unwrap();
            let detail = match ev {
                XmlEvent::StartElement | XmlEvent::EndElement => cursor.name().unwrap().to_string(),
                XmlEvent::Characters => cursor.text().unwrap(),
                _ => String::new(),
            };
            out.push((ev, detail));
            if ev == XmlEvent::EndDocument {
                return out;
            }
        }
    }

    #[test]
    fn test_cursor_events_and_names() {
        let mut cursor = QuickXmlCursor::new(
            r#"<?xml version="1.0"?><g:GreetMe xmlns:g="urn:g"><name>Eugene &amp; co</name></g:GreetMe>"#,
        );
        assert_eq!(cursor.event(), XmlEvent::StartDocument);

        let evs = events(&mut cursor);
        assert_eq!(
            evs,
            vec![
                (XmlEvent::StartElement, "{urn:g}GreetMe".to_string()),
                (XmlEvent::StartElement, "name".to_string()),
                (XmlEvent::Characters, "Eugene ".to_string()),
                (XmlEvent::Characters, "&".to_string()),
                (XmlEvent::Characters, " co".to_string()),
                (XmlEvent::EndElement, "name".to_string()),
                (XmlEvent::EndElement, "{urn:g}GreetMe".to_string()),
                (XmlEvent::EndDocument, String::new()),
            ]
        );
        assert!(cursor.next().is_err());
    }

    #[test]
    fn test_attributes_include_namespace_declarations() {
        let mut cursor = QuickXmlCursor::new(r#"<a xmlns:x="urn:x" x:id="1" plain="2"/>"#);
        cursor.next().unwrap();

        assert_eq!(cursor.attribute_count().unwrap(), 3);
        let decl = cursor.attribute(0).unwrap();
        assert_eq!(decl.declared_prefix(), Some("x"));
        let id = cursor.attribute(1).unwrap();
        assert_eq!(id.namespace, "urn:x");
        assert_eq!(id.value, "1");
        assert!(matches!(
            cursor.attribute(3),
            Err(XmlError::AttributeOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_inherited_prefixes_resolve_and_are_redeclared() {
        let inherited = vec![("ns".to_string(), "urn:outer".to_string())];
        let mut cursor = QuickXmlCursor::with_namespaces("<ns:Ping><v>1</v></ns:Ping>", inherited.clone());
        cursor.next().unwrap();
        assert_eq!(cursor.name().unwrap(), QName::new("urn:outer", "Ping"));

        let xml = normalize_fragment("<ns:Ping><v>1</v></ns:Ping>", inherited).unwrap();
        assert_eq!(xml, r#"<ns:Ping xmlns:ns="urn:outer"><v>1</v></ns:Ping>"#);
    }

    #[test]
    fn test_undeclared_prefix_is_malformed() {
        let mut cursor = QuickXmlCursor::new("<ns:Ping/>");
        assert!(matches!(cursor.next(), Err(XmlError::Malformed(_))));
    }

    #[test]
    fn test_copy_subtree_stops_at_matching_end() {
        let mut cursor = QuickXmlCursor::new("<root><a><b/></a><c/></root>");
        cursor.next().unwrap();
        cursor.next().unwrap();

        let mut writer = Writer::new(Vec::new());
        EventCopier::new(&mut writer).copy_subtree(&mut cursor).unwrap();
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), "<a><b></b></a>");

        cursor.next().unwrap();
        assert_eq!(cursor.name().unwrap(), QName::local("c"));
    }
}
