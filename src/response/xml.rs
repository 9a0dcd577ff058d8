use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str;

use crate::errors::AdapterError;

/// Converts an XML document into a JSON value tree.
///
/// Mirrors the conversion downstream consumers were written against:
/// element names keep their namespace prefix, an element with children
/// becomes an object, repeated sibling names collapse into an array only
/// when they actually repeat, a text-only element becomes a string and an
/// empty element becomes `""`. Attributes are dropped.
pub fn xml_to_value(xml: &str) -> Result<Value, AdapterError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // (element name, accumulated text, child values)
    let mut stack: Vec<(String, String, Map<String, Value>)> = Vec::new();
    let mut root = Map::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = qualified_name(&e)?;
                stack.push((name, String::new(), Map::new()));
            }
            Ok(Event::Empty(e)) => {
                let name = qualified_name(&e)?;
                let target = match stack.last_mut() {
                    Some((_, _, children)) => children,
                    None => &mut root,
                };
                insert_child(target, name, Value::String(String::new()));
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| AdapterError::Parse(format!("invalid text content: {}", err)))?;
                if let Some((_, buffer, _)) = stack.last_mut() {
                    buffer.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = str::from_utf8(&e)
                    .map_err(|err| AdapterError::Parse(format!("invalid CDATA content: {}", err)))?;
                if let Some((_, buffer, _)) = stack.last_mut() {
                    buffer.push_str(text);
                }
            }
            Ok(Event::End(e)) => {
                let closing = qualified_end_name(&e)?;
                let (name, text, children) = stack.pop().ok_or_else(|| {
                    AdapterError::Parse(format!("unexpected closing tag </{}>", closing))
                })?;
                let value = if children.is_empty() {
                    Value::String(text)
                } else {
                    Value::Object(children)
                };
                let target = match stack.last_mut() {
                    Some((_, _, parent_children)) => parent_children,
                    None => &mut root,
                };
                insert_child(target, name, value);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(AdapterError::Parse(format!("malformed XML: {}", e))),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(AdapterError::Parse(
            "unexpected end of XML document".to_string(),
        ));
    }

    Ok(Value::Object(root))
}

fn insert_child(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        None => {
            map.insert(name, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

fn qualified_name(e: &BytesStart) -> Result<String, AdapterError> {
    str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| AdapterError::Parse(format!("invalid UTF-8 in element name: {}", err)))
}

fn qualified_end_name(e: &BytesEnd) -> Result<String, AdapterError> {
    str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| AdapterError::Parse(format!("invalid UTF-8 in element name: {}", err)))
}

/// Parsed meta block of an OCS envelope, re-emitted verbatim for
/// operations whose only useful payload is the success confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcsMeta {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statuscode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcsEnvelope {
    pub meta: OcsMeta,
    pub data: Value,
}

/// Parses an OCS envelope and enforces its success invariant:
/// `meta.status` must be "ok", otherwise the server-supplied message (or
/// the status itself) becomes a remote error.
pub fn parse_ocs_envelope(xml: &str) -> Result<OcsEnvelope, AdapterError> {
    let value = xml_to_value(xml)?;
    let ocs = value
        .get("ocs")
        .ok_or_else(|| AdapterError::Parse("response is missing the <ocs> envelope".to_string()))?;
    let meta_value = ocs
        .get("meta")
        .ok_or_else(|| AdapterError::Parse("OCS envelope has no <meta> block".to_string()))?;

    let meta = OcsMeta {
        status: meta_value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        statuscode: meta_value
            .get("statuscode")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: meta_value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
    };

    if meta.status != "ok" {
        let message = meta.message.clone().unwrap_or_else(|| meta.status.clone());
        return Err(AdapterError::Remote(message));
    }

    let data = ocs.get("data").cloned().unwrap_or(Value::String(String::new()));
    Ok(OcsEnvelope { meta, data })
}

/// One child entry of a PROPFIND listing, shaped the way downstream steps
/// consume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DavEntry {
    pub path: String,
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(rename = "contentLength", skip_serializing_if = "Option::is_none")]
    pub content_length: Option<String>,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(rename = "eTag")]
    pub etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// Parses a WebDAV multistatus listing into child entries.
///
/// The first response entry always describes the queried folder itself and
/// is skipped. `mount_path` is the path component of the WebDAV mount
/// (e.g. `/remote.php/webdav`); it is stripped from each href to produce
/// a path relative to the mount.
pub fn parse_multistatus(xml: &str, mount_path: &str) -> Result<Vec<DavEntry>, AdapterError> {
    let value = xml_to_value(xml)?;

    let responses = match value
        .get("d:multistatus")
        .and_then(|multistatus| multistatus.get("d:response"))
    {
        // A lone response entry is the queried folder itself: nothing to list.
        Some(Value::Array(responses)) => responses,
        _ => return Ok(Vec::new()),
    };

    responses
        .iter()
        .skip(1)
        .map(|entry| parse_entry(entry, mount_path))
        .collect()
}

fn parse_entry(entry: &Value, mount_path: &str) -> Result<DavEntry, AdapterError> {
    let href = entry
        .get("d:href")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::Parse("listing entry has no d:href".to_string()))?;

    // A response may split its properties across several propstat blocks;
    // only the first block is consulted.
    let propstat = entry
        .get("d:propstat")
        .ok_or_else(|| AdapterError::Parse("listing entry has no d:propstat".to_string()))?;
    let first = match propstat {
        Value::Array(blocks) => blocks.first().ok_or_else(|| {
            AdapterError::Parse("listing entry has an empty d:propstat list".to_string())
        })?,
        other => other,
    };
    let props = first
        .get("d:prop")
        .ok_or_else(|| AdapterError::Parse("propstat block has no d:prop".to_string()))?;

    // The wire names these fields are renamed to live on DavEntry's serde
    // attributes; this just picks the raw properties up.
    let prop = |name: &str| props.get(name).and_then(Value::as_str).map(str::to_string);
    let last_modified = prop("d:getlastmodified");
    let content_length = prop("d:getcontentlength");
    let content_type = prop("d:getcontenttype");

    // An empty resourcetype marks a plain file; anything else is a folder.
    let kind = match props.get("d:resourcetype") {
        Some(Value::String(s)) if s.is_empty() => EntryKind::File,
        _ => EntryKind::Folder,
    };

    let etag = props
        .get("d:getetag")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AdapterError::Parse(format!("listing entry \"{}\" has no etag", href))
        })?;

    Ok(DavEntry {
        path: relativize_href(href, mount_path),
        last_modified,
        content_length,
        content_type,
        kind,
        etag: strip_etag_quotes(etag).to_string(),
    })
}

/// Strips the WebDAV mount prefix plus the leading slash from an href,
/// leaving a path relative to the mount root.
fn relativize_href(href: &str, mount_path: &str) -> String {
    let rest = if mount_path.is_empty() {
        href
    } else {
        href.strip_prefix(mount_path).unwrap_or(href)
    };
    rest.trim_start_matches('/').to_string()
}

fn strip_etag_quotes(etag: &str) -> &str {
    etag.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(etag)
}
