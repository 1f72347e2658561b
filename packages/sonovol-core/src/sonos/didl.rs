//! DIDL-Lite metadata decoding.
//!
//! Track metadata arrives as a DIDL-Lite document, either in the
//! `TrackMetaData` field of `GetPositionInfo` or in the
//! `CurrentTrackMetaData` value of an AVTransport LastChange event.

use crate::protocol_constants::DEVICE_HTTP_PORT;
use crate::sonos::types::TrackMetadata;
use crate::sonos::xml::extract_xml_text;

/// Placeholder the devices use for "no metadata".
const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

/// Parses title/artist/album/artwork from a DIDL-Lite document.
///
/// `device_ip` is used to absolutize artwork paths, which the devices report
/// relative to their own HTTP server (`/getaa?...`).
///
/// Radio streams put the station name in `dc:title` and the current
/// "Artist - Title" in `r:streamContent`; when present, the stream content
/// wins.
#[must_use]
pub(crate) fn parse_didl_lite(didl: &str, device_ip: &str) -> TrackMetadata {
    let didl = didl.trim();
    if didl.is_empty() || didl == NOT_IMPLEMENTED {
        return TrackMetadata::default();
    }

    let field = |tag: &str| {
        extract_xml_text(didl, tag)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut meta = TrackMetadata {
        title: field("title"),
        artist: field("creator"),
        album: field("album"),
        art_url: field("albumArtURI").map(|uri| absolutize(&uri, device_ip)),
    };

    if let Some(stream_content) = field("streamContent") {
        match stream_content.split_once(" - ") {
            Some((artist, title)) => {
                meta.album = meta.album.or(meta.title.take());
                meta.artist = Some(artist.trim().to_string());
                meta.title = Some(title.trim().to_string());
            }
            None => {
                meta.album = meta.album.or(meta.title.take());
                meta.title = Some(stream_content);
            }
        }
    }

    meta
}

fn absolutize(uri: &str, device_ip: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        let sep = if uri.starts_with('/') { "" } else { "/" };
        format!("http://{}:{}{}{}", device_ip, DEVICE_HTTP_PORT, sep, uri)
    }
}
