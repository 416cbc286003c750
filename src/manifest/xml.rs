//! Minimal XML document tree that round-trips untouched nodes
//!
//! Text, comments, and attribute values are kept in their raw (escaped)
//! form so writing the tree back reproduces what was read. Only the
//! nodes the caller edits change on output.

use quick_xml::escape::{partial_escape, unescape};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

const BOM: char = '\u{feff}';

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("syntax error at byte {position}: {source}")]
    Syntax {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Structure(String),

    #[error("failed to serialize document: {0}")]
    Write(#[source] quick_xml::Error),
}

/// Line ending and indent unit detected from the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub newline: String,
    pub indent: String,
}

impl Layout {
    fn detect(source: &str, root: &Element, fallback_indent: &str) -> Self {
        let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };
        let indent = root
            .element_positions()
            .next()
            .and_then(|pos| root.indent_of(pos))
            .filter(|indent| !indent.is_empty())
            .unwrap_or_else(|| fallback_indent.to_string());
        Self {
            newline: newline.to_string(),
            indent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Raw (escaped) character data
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
    Declaration(XmlDecl),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.chars().all(char::is_whitespace))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// `(name, raw value)` in document order
    attributes: Vec<(String, String)>,
    /// Tag content as read, kept until the attributes change
    raw_start: Option<String>,
    pub children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            raw_start: None,
            children: Vec::new(),
            self_closing: true,
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Syntax {
                position: 0,
                source: quick_xml::Error::from(e),
            })?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = std::str::from_utf8(&attr.value)?.to_string();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            raw_start: Some(std::str::from_utf8(start)?.to_string()),
            children: Vec::new(),
            self_closing: false,
        })
    }

    /// Element names compare case-insensitively, as MSBuild does
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Unescaped attribute value
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, raw)| match unescape(raw) {
                Ok(value) => value.into_owned(),
                Err(_) => raw.clone(),
            })
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let escaped = partial_escape(value).replace('"', "&quot;");
        self.raw_start = None;
        match self
            .attributes
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, raw)) => *raw = escaped,
            None => self.attributes.push((name.to_string(), escaped)),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Concatenated, unescaped text content of direct text children
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(raw) => match unescape(raw) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(raw),
                },
                Node::CData(raw) => out.push_str(raw),
                _ => {}
            }
        }
        out
    }

    /// Replace all children with a single escaped text node
    pub fn set_text(&mut self, value: &str) {
        self.children = vec![Node::Text(partial_escape(value).into_owned())];
        self.self_closing = false;
    }

    /// Positions of element children within `children`
    pub fn element_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, Node::Element(_)))
            .map(|(pos, _)| pos)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn has_child_elements(&self) -> bool {
        self.child_elements().next().is_some()
    }

    pub fn child(&self, pos: usize) -> Option<&Element> {
        self.children.get(pos).and_then(Node::as_element)
    }

    pub fn child_mut(&mut self, pos: usize) -> Option<&mut Element> {
        self.children.get_mut(pos).and_then(Node::as_element_mut)
    }

    /// Indentation (text after the last newline) of the whitespace before `pos`
    pub fn indent_of(&self, pos: usize) -> Option<String> {
        if pos == 0 {
            return None;
        }
        match self.children.get(pos - 1) {
            Some(Node::Text(text)) if text.chars().all(char::is_whitespace) => {
                let indent = match text.rfind('\n') {
                    Some(newline) => &text[newline + 1..],
                    None => return None,
                };
                Some(indent.to_string())
            }
            _ => None,
        }
    }

    fn child_indent(&self) -> Option<String> {
        let last = self.element_positions().last()?;
        self.indent_of(last)
    }

    /// Append `child` as the last element, indented like its siblings
    ///
    /// `own_indent` is the indentation of `self`. Returns the position of
    /// the new child.
    pub fn append_element(&mut self, child: Element, own_indent: &str, layout: &Layout) -> usize {
        let child_indent = self
            .child_indent()
            .unwrap_or_else(|| format!("{}{}", own_indent, layout.indent));
        let keeps_closing = self.children.last().map_or(false, Node::is_whitespace);
        let at = if keeps_closing {
            self.children.len() - 1
        } else {
            self.children.len()
        };

        self.children
            .insert(at, Node::Text(format!("{}{}", layout.newline, child_indent)));
        self.children.insert(at + 1, Node::Element(child));
        if !keeps_closing {
            self.children
                .push(Node::Text(format!("{}{}", layout.newline, own_indent)));
        }
        if self.self_closing {
            if let Some(raw) = &mut self.raw_start {
                raw.truncate(raw.trim_end().len());
            }
        }
        self.self_closing = false;
        at + 1
    }

    /// Insert `child` directly after the element at `pos`, at the same indentation
    pub fn insert_element_after(&mut self, pos: usize, child: Element, layout: &Layout) -> usize {
        let indent = self
            .indent_of(pos)
            .unwrap_or_else(|| layout.indent.clone());
        self.children
            .insert(pos + 1, Node::Text(format!("{}{}", layout.newline, indent)));
        self.children.insert(pos + 2, Node::Element(child));
        pos + 2
    }

    /// Remove the element at `pos` together with the whitespace that precedes it
    ///
    /// Positions after `pos` shift down by one or two.
    pub fn remove_element(&mut self, pos: usize) -> Option<Element> {
        if self.child(pos).is_none() {
            return None;
        }
        let removed = match self.children.remove(pos) {
            Node::Element(el) => el,
            _ => return None,
        };
        if pos > 0 && self.children[pos - 1].is_whitespace() {
            self.children.remove(pos - 1);
        }
        Some(removed)
    }

    fn render_start(&self, empty: bool) -> String {
        let mut content = self.name.clone();
        // values read from single-quoted attributes may hold a bare `"`
        for (key, raw) in &self.attributes {
            content.push_str(&format!(" {}=\"{}\"", key, raw.replace('"', "&quot;")));
        }
        if empty {
            content.push(' ');
        }
        content
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let empty = self.self_closing && self.children.is_empty();
        let content = match &self.raw_start {
            Some(raw) => raw.clone(),
            None => self.render_start(empty),
        };
        let start = BytesStart::from_content(content, self.name.len());

        if empty {
            return writer
                .write_event(Event::Empty(start))
                .map_err(XmlError::Write);
        }

        writer
            .write_event(Event::Start(start))
            .map_err(XmlError::Write)?;
        for child in &self.children {
            write_node(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(XmlError::Write)
    }
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) -> Result<(), XmlError> {
    let event = match node {
        Node::Element(el) => return el.write(writer),
        Node::Text(raw) => Event::Text(BytesText::from_escaped(raw.as_str())),
        Node::CData(raw) => Event::CData(BytesCData::new(raw.as_str())),
        Node::Comment(raw) => Event::Comment(BytesText::from_escaped(raw.as_str())),
        Node::ProcessingInstruction(raw) => Event::PI(BytesText::from_escaped(raw.as_str())),
        Node::DocType(raw) => Event::DocType(BytesText::from_escaped(raw.as_str())),
        Node::Declaration(decl) => Event::Decl(BytesDecl::new(
            &decl.version,
            decl.encoding.as_deref(),
            decl.standalone.as_deref(),
        )),
    };
    writer.write_event(event).map_err(XmlError::Write)
}

/// A parsed document: nodes before the root, the root element, nodes after it
#[derive(Debug, Clone)]
pub struct Document {
    bom: bool,
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
    layout: Layout,
}

#[derive(Default)]
struct TreeBuilder {
    open: Vec<Element>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
}

impl TreeBuilder {
    fn attach(&mut self, node: Node) -> Result<(), XmlError> {
        if let Some(parent) = self.open.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        match node {
            Node::Element(el) => {
                if self.root.is_some() {
                    return Err(XmlError::Structure(format!(
                        "unexpected second root element <{}>",
                        el.name
                    )));
                }
                self.root = Some(el);
            }
            Node::Text(text) if !text.chars().all(char::is_whitespace) => {
                return Err(XmlError::Structure(format!(
                    "text outside the root element: {:?}",
                    text.trim()
                )));
            }
            other => {
                if self.root.is_none() {
                    self.prolog.push(other);
                } else {
                    self.epilog.push(other);
                }
            }
        }
        Ok(())
    }
}

fn utf8(bytes: std::borrow::Cow<'_, [u8]>) -> Result<String, XmlError> {
    Ok(std::str::from_utf8(&bytes)?.to_string())
}

impl Document {
    pub fn parse(source: &str) -> Result<Self, XmlError> {
        Self::parse_with_indent(source, "  ")
    }

    /// Parse, using `fallback_indent` when the document gives no indentation hint
    pub fn parse_with_indent(source: &str, fallback_indent: &str) -> Result<Self, XmlError> {
        let (bom, body) = match source.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, source),
        };

        let mut reader = Reader::from_str(body);
        let mut tree = TreeBuilder::default();

        loop {
            let event = reader.read_event().map_err(|source| XmlError::Syntax {
                position: reader.buffer_position(),
                source,
            })?;
            match event {
                Event::Start(start) => tree.open.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let mut el = Element::from_start(&start)?;
                    el.self_closing = true;
                    tree.attach(Node::Element(el))?;
                }
                Event::End(_) => {
                    let el = tree.open.pop().ok_or_else(|| {
                        XmlError::Structure("closing tag without an opening tag".to_string())
                    })?;
                    tree.attach(Node::Element(el))?;
                }
                Event::Text(text) => tree.attach(Node::Text(utf8(text.into_inner())?))?,
                Event::CData(data) => tree.attach(Node::CData(utf8(data.into_inner())?))?,
                Event::Comment(text) => tree.attach(Node::Comment(utf8(text.into_inner())?))?,
                Event::PI(text) => {
                    tree.attach(Node::ProcessingInstruction(utf8(text.into_inner())?))?
                }
                Event::DocType(text) => tree.attach(Node::DocType(utf8(text.into_inner())?))?,
                Event::Decl(decl) => {
                    let syntax = |source| XmlError::Syntax {
                        position: 0,
                        source,
                    };
                    let version = utf8(decl.version().map_err(syntax)?)?;
                    let encoding = match decl.encoding() {
                        Some(value) => Some(utf8(value.map_err(syntax)?)?),
                        None => None,
                    };
                    let standalone = match decl.standalone() {
                        Some(value) => Some(utf8(value.map_err(syntax)?)?),
                        None => None,
                    };
                    tree.attach(Node::Declaration(XmlDecl {
                        version,
                        encoding,
                        standalone,
                    }))?;
                }
                Event::Eof => break,
            }
        }

        if let Some(unclosed) = tree.open.last() {
            return Err(XmlError::Structure(format!(
                "element <{}> is never closed",
                unclosed.name
            )));
        }
        let root = tree
            .root
            .ok_or_else(|| XmlError::Structure("document has no root element".to_string()))?;
        let layout = Layout::detect(body, &root, fallback_indent);

        Ok(Self {
            bom,
            prolog: tree.prolog,
            root,
            epilog: tree.epilog,
            layout,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn serialize(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        self.root.write(&mut writer)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }

        let body = String::from_utf8(writer.into_inner())
            .map_err(|e| XmlError::Encoding(e.utf8_error()))?;
        if self.bom {
            Ok(format!("{}{}", BOM, body))
        } else {
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- generated -->
<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net46</TargetFramework>
    <Description>Tom &amp; Jerry</Description>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="X" Version="1.0.0" />
  </ItemGroup>
</Project>
"#;

    #[test]
    fn test_round_trip_is_byte_identical() {
        let doc = Document::parse(PROJECT).unwrap();
        assert_eq!(doc.serialize().unwrap(), PROJECT);
    }

    #[test]
    fn test_bom_is_preserved() {
        let source = format!("{}<Project>\n</Project>", BOM);
        let doc = Document::parse(&source).unwrap();
        assert_eq!(doc.serialize().unwrap(), source);
    }

    #[test]
    fn test_detects_indent_and_newline() {
        let doc = Document::parse("<Project>\r\n    <ItemGroup />\r\n</Project>").unwrap();
        assert_eq!(doc.layout().indent, "    ");
        assert_eq!(doc.layout().newline, "\r\n");
    }

    #[test]
    fn test_attribute_unescapes_and_escapes() {
        let mut doc = Document::parse(PROJECT).unwrap();
        let root = doc.root_mut();
        assert_eq!(root.attribute("sdk").as_deref(), Some("Microsoft.NET.Sdk"));
        root.set_attribute("Label", "a<b");
        assert_eq!(root.attribute("Label").as_deref(), Some("a<b"));
        assert!(doc.serialize().unwrap().contains(r#"Label="a&lt;b""#));
    }

    #[test]
    fn test_rewritten_single_quoted_attribute_stays_well_formed() {
        let source = r#"<Project><A Include="X" Label='say "hi"' /></Project>"#;
        let mut doc = Document::parse(source).unwrap();
        let el = doc.root_mut().child_mut(0).unwrap();
        el.set_attribute("Version", "2.0.0");

        let text = doc.serialize().unwrap();
        assert!(text.contains(r#"Label="say &quot;hi&quot;""#));
        let reparsed = Document::parse(&text).unwrap();
        let el = reparsed.root().child(0).unwrap();
        assert_eq!(el.attribute("Label").as_deref(), Some(r#"say "hi""#));
        assert_eq!(el.attribute("Version").as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_append_and_remove_keep_layout() {
        let mut doc = Document::parse(PROJECT).unwrap();
        let layout = doc.layout().clone();
        let root = doc.root_mut();
        let group_pos = root
            .element_positions()
            .find(|&pos| root.child(pos).unwrap().is_named("ItemGroup"))
            .unwrap();
        let group = root.child_mut(group_pos).unwrap();
        let added = group.append_element(
            Element::new("PackageReference").with_attribute("Include", "Y"),
            "  ",
            &layout,
        );
        let text = doc.serialize().unwrap();
        assert!(text.contains(
            "    <PackageReference Include=\"X\" Version=\"1.0.0\" />\n    <PackageReference Include=\"Y\" />\n  </ItemGroup>"
        ));

        let group = doc.root_mut().child_mut(group_pos).unwrap();
        group.remove_element(added).unwrap();
        assert_eq!(doc.serialize().unwrap(), PROJECT);
    }

    #[test]
    fn test_append_into_self_closing_element() {
        let mut doc = Document::parse("<Project>\n  <ItemGroup />\n</Project>").unwrap();
        let layout = doc.layout().clone();
        let group = doc.root_mut().child_mut(1).unwrap();
        group.append_element(Element::new("PackageReference"), "  ", &layout);
        assert_eq!(
            doc.serialize().unwrap(),
            "<Project>\n  <ItemGroup>\n    <PackageReference />\n  </ItemGroup>\n</Project>"
        );
    }

    #[test]
    fn test_rejects_malformed_documents() {
        assert!(Document::parse("").is_err());
        assert!(Document::parse("<Project>").is_err());
        assert!(Document::parse("<Project></Other>").is_err());
        assert!(Document::parse("<A/><B/>").is_err());
        assert!(Document::parse("stray <A/>").is_err());
    }
}
