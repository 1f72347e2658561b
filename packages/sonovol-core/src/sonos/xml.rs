//! XML helpers shared by the SOAP, topology and GENA parsers.
//!
//! The speakers nest whole documents inside element text and attribute values,
//! entity-escaped once per level. [`decode_entities`] undoes exactly one level;
//! the quick-xml based helpers below never unescape on their own, so callers
//! decide how many levels to peel.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Decodes one level of XML entity escaping.
///
/// The order matters: `&amp;` is decoded last so that a literal `&amp;lt;`
/// becomes `&lt;` rather than `<`.
#[must_use]
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    input
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Escapes a value for use as SOAP argument element content.
#[must_use]
pub fn escape_xml(value: &str) -> String {
    html_escape::encode_quoted_attribute(value).into_owned()
}

/// Reads an attribute from a start tag, decoding one level of entities.
///
/// Attribute names are matched on their local name, so `xmlns`-prefixed
/// attributes resolve too.
#[must_use]
pub fn get_xml_attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| {
            std::str::from_utf8(&attr.value)
                .ok()
                .map(decode_entities)
        })
}

/// Returns the raw (still escaped) text of the first element named `tag`.
///
/// The match is on the local name, so `<u:ZoneGroupState>` and
/// `<ZoneGroupState>` both match `"ZoneGroupState"`. Returns `None` when the
/// element is missing or the document is not well formed up to that point.
#[must_use]
pub fn extract_raw_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == tag.as_bytes() => {
                let end = e.to_end().into_owned();
                return reader
                    .read_text(end.name())
                    .ok()
                    .map(|text| text.into_owned());
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == tag.as_bytes() => {
                return Some(String::new());
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                log::debug!("[XML] parse error while looking for <{}>: {}", tag, e);
                return None;
            }
            _ => {}
        }
    }
}

/// Returns the text of the first element named `tag` with one level of
/// entities decoded.
#[must_use]
pub fn extract_xml_text(xml: &str, tag: &str) -> Option<String> {
    extract_raw_text(xml, tag).map(|raw| decode_entities(&raw))
}

/// Collects the `val` attribute of `<Name val="..."/>` elements.
///
/// This is the shape used inside LastChange documents. Elements carrying a
/// `channel` attribute other than `Master` are skipped so that stereo-pair
/// LF/RF values never shadow the master value. The first occurrence wins.
#[must_use]
pub fn extract_val_attrs(xml: &str, names: &[&str]) -> HashMap<String, String> {
    let mut found = HashMap::new();
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = e.local_name();
                let Ok(name) = std::str::from_utf8(local.as_ref()) else {
                    continue;
                };
                if !names.contains(&name) || found.contains_key(name) {
                    continue;
                }
                if let Some(channel) = get_xml_attr(&e, b"channel") {
                    if channel != "Master" {
                        continue;
                    }
                }
                if let Some(val) = get_xml_attr(&e, b"val") {
                    found.insert(name.to_string(), val);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::debug!("[XML] parse error in LastChange document: {}", e);
                break;
            }
            _ => {}
        }
    }

    found
}

/// Extracts the host part of a `http://host:port/path` URL.
#[must_use]
pub fn extract_ip_from_location(location: &str) -> Option<String> {
    let rest = location
        .strip_prefix("http://")
        .or_else(|| location.strip_prefix("https://"))?;
    let authority = rest.split('/').next()?;
    let host = authority.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
