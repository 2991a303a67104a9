//! Content group map conversion
//!
//! Reads a source content group map and rewrites it in the packaged form:
//! automatic groups first, then required, then optional groups, each with
//! a flat `<Files>` list.

use crate::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const CGM_NAMESPACE: &str = "http://schemas.microsoft.com/appx/2016/contentgroupmap";
const SOURCE_CGM_NAMESPACE: &str = "http://schemas.microsoft.com/appx/2016/sourcecgm";

/// Kind of content group, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKind {
    Automatic,
    Required,
    Optional,
}

impl GroupKind {
    fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"Automatic" => Some(GroupKind::Automatic),
            b"Required" => Some(GroupKind::Required),
            b"Optional" => Some(GroupKind::Optional),
            _ => None,
        }
    }

    fn element(self) -> &'static str {
        match self {
            GroupKind::Automatic => "Automatic",
            GroupKind::Required => "Required",
            GroupKind::Optional => "Optional",
        }
    }
}

/// One content group with the files it lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentGroup {
    pub kind: GroupKind,
    /// Only kept for optional groups
    pub name: Option<String>,
    /// Whether the source group had a `<Files>` section
    pub has_files: bool,
    pub files: Vec<String>,
}

/// Parsed content group map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentGroupMap {
    pub groups: Vec<ContentGroup>,
}

impl ContentGroupMap {
    /// Parse a source content group map
    pub fn parse(contents: &str) -> Result<Self> {
        let mut reader = Reader::from_str(contents);
        reader.trim_text(true);
        let mut buf = Vec::new();

        let mut saw_root = false;
        let mut groups = Vec::new();
        let mut current: Option<ContentGroup> = None;
        let mut in_files = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let local = e.local_name();
                    match local.as_ref() {
                        b"ContentGroupMap" => saw_root = true,
                        b"Files" if current.is_some() => {
                            in_files = true;
                            if let Some(group) = current.as_mut() {
                                group.has_files = true;
                            }
                        }
                        b"File" => push_file(&mut current, in_files, &e)?,
                        name => {
                            if let Some(kind) = GroupKind::from_element(name) {
                                if current.is_none() {
                                    current = Some(new_group(kind, &e)?);
                                }
                            }
                        }
                    }
                }
                Event::Empty(e) => {
                    let local = e.local_name();
                    match local.as_ref() {
                        b"ContentGroupMap" => saw_root = true,
                        b"Files" => {
                            if let Some(group) = current.as_mut() {
                                group.has_files = true;
                            }
                        }
                        b"File" => push_file(&mut current, in_files, &e)?,
                        name => {
                            if let Some(kind) = GroupKind::from_element(name) {
                                if current.is_none() {
                                    groups.push(new_group(kind, &e)?);
                                }
                            }
                        }
                    }
                }
                Event::End(e) => {
                    let local = e.local_name();
                    match local.as_ref() {
                        b"Files" => in_files = false,
                        name => {
                            if let Some(kind) = GroupKind::from_element(name) {
                                if current.as_ref().map(|g| g.kind) == Some(kind) {
                                    groups.extend(current.take());
                                    in_files = false;
                                }
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(Error::Validation(
                "Invalid source CGM - missing ContentGroupMap element".to_string(),
            ));
        }
        if groups.is_empty() {
            return Err(Error::Validation(
                "Invalid source CGM - no content groups defined".to_string(),
            ));
        }

        // Stable, so document order is kept within each kind
        groups.sort_by_key(|g: &ContentGroup| g.kind);
        Ok(Self { groups })
    }

    /// Render the converted map
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut writer = Writer::new_with_indent(&mut output, b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("ContentGroupMap");
        root.push_attribute(("xmlns", CGM_NAMESPACE));
        root.push_attribute(("xmlns:s", SOURCE_CGM_NAMESPACE));
        writer.write_event(Event::Start(root))?;

        for group in &self.groups {
            let mut element = BytesStart::new(group.kind.element());
            if let Some(name) = &group.name {
                element.push_attribute(("Name", name.as_str()));
            }
            writer.write_event(Event::Start(element))?;

            if group.has_files {
                writer.write_event(Event::Start(BytesStart::new("Files")))?;
                for file in &group.files {
                    let mut entry = BytesStart::new("File");
                    entry.push_attribute(("Name", file.as_str()));
                    writer.write_event(Event::Empty(entry))?;
                }
                writer.write_event(Event::End(BytesEnd::new("Files")))?;
            }

            writer.write_event(Event::End(BytesEnd::new(group.kind.element())))?;
        }

        writer.write_event(Event::End(BytesEnd::new("ContentGroupMap")))?;

        output.push(b'\n');
        Ok(output)
    }
}

fn new_group(kind: GroupKind, element: &BytesStart) -> Result<ContentGroup> {
    let name = match kind {
        GroupKind::Optional => name_attribute(element)?,
        _ => None,
    };
    Ok(ContentGroup {
        kind,
        name,
        has_files: false,
        files: Vec::new(),
    })
}

fn push_file(current: &mut Option<ContentGroup>, in_files: bool, element: &BytesStart) -> Result<()> {
    if !in_files {
        return Ok(());
    }
    if let Some(group) = current.as_mut() {
        if let Some(name) = name_attribute(element)? {
            group.files.push(name);
        }
    }
    Ok(())
}

fn name_attribute(element: &BytesStart) -> Result<Option<String>> {
    match element.try_get_attribute("Name")? {
        Some(attr) => {
            let value = attr.unescape_value()?;
            Ok((!value.is_empty()).then(|| value.into_owned()))
        }
        None => Ok(None),
    }
}

/// Convert the content group map at `source` and write it to `output`
pub fn convert_cgm<P: AsRef<Path>, Q: AsRef<Path>>(source: P, output: Q) -> Result<ContentGroupMap> {
    let source = source.as_ref();
    let output = output.as_ref();

    if !source.exists() {
        return Err(Error::NotFound(format!(
            "Source CGM file does not exist: {:?}",
            source
        )));
    }

    let contents = fs::read_to_string(source)?;
    let map = ContentGroupMap::parse(&contents)?;
    debug!("Parsed {} content groups from {:?}", map.groups.len(), source);

    fs::write(output, map.to_xml()?)?;
    info!("Converted content group map {:?} -> {:?}", source, output);

    Ok(map)
}
