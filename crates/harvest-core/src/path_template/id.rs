//! Gallery identifier extraction from source links.

use url::Url;

use super::sanitize::sanitize_component;

/// Identifier fields parsed out of a gallery link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryIdentifier {
    pub gid: String,
    pub token: Option<String>,
}

/// Extracts the gallery identifier from a link.
///
/// Links shaped like `https://host/g/<gid>/<token>/` yield both parts.
/// Other URLs use their last non-empty path segment. Unparseable links fall
/// back to a sanitized copy of the link itself.
pub fn gallery_identifier(link: &str) -> GalleryIdentifier {
    if let Ok(url) = Url::parse(link) {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if let Some(pos) = segments.iter().position(|s| *s == "g") {
            if let Some(gid) = segments.get(pos + 1) {
                return GalleryIdentifier {
                    gid: sanitize_component(gid),
                    token: segments.get(pos + 2).map(|t| sanitize_component(t)),
                };
            }
        }
        if let Some(last) = segments.last() {
            return GalleryIdentifier {
                gid: sanitize_component(last),
                token: None,
            };
        }
        if let Some(host) = url.host_str() {
            return GalleryIdentifier {
                gid: sanitize_component(host),
                token: None,
            };
        }
    }

    let fallback = sanitize_component(link);
    GalleryIdentifier {
        gid: if fallback.is_empty() {
            "gallery".to_string()
        } else {
            fallback
        },
        token: None,
    }
}
