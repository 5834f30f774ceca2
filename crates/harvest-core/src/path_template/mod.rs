//! Gallery target paths: template rendering and deterministic asset names.
//!
//! A download job owns a root folder (`download_dir / <job title>`); each
//! gallery lands in `root / <rendered template>`. Placeholders: `{gid}`,
//! `{token}`, `{title}`, `{job_title}`, `{index}`. Every substituted value is
//! sanitized; `/` in the template itself creates sub-folders.

mod id;
mod sanitize;

use std::path::{Path, PathBuf};

pub use id::{gallery_identifier, GalleryIdentifier};
pub use sanitize::sanitize_component;

/// Used when a title sanitizes to nothing.
const UNTITLED: &str = "untitled";
/// Extension for assets whose URL path carries none.
const DEFAULT_ASSET_EXT: &str = "jpg";

/// Values available to a path template for one gallery.
#[derive(Debug, Clone)]
pub struct TemplateFields<'a> {
    pub link: &'a str,
    pub title: &'a str,
    pub job_title: &'a str,
    /// 1-based position of the gallery within its job.
    pub index: usize,
}

fn non_empty(name: String) -> String {
    if name.is_empty() {
        UNTITLED.to_string()
    } else {
        name
    }
}

/// Root folder for a download job: `download_dir / <sanitized title>`.
pub fn job_root(download_dir: &Path, job_title: &str) -> PathBuf {
    download_dir.join(non_empty(sanitize_component(job_title)))
}

/// Renders `template` for one gallery into a relative path.
///
/// Unknown placeholders are kept literally. Empty components are dropped and
/// an empty result falls back to the gallery id.
pub fn render(template: &str, fields: &TemplateFields<'_>) -> PathBuf {
    let id = gallery_identifier(fields.link);
    let lookup = |key: &str| -> Option<String> {
        match key {
            "gid" => Some(id.gid.clone()),
            "token" => Some(id.token.clone().unwrap_or_default()),
            "title" => Some(sanitize_component(fields.title)),
            "job_title" => Some(sanitize_component(fields.job_title)),
            "index" => Some(fields.index.to_string()),
            _ => None,
        }
    };

    let mut out = PathBuf::new();
    for raw in template.split(['/', '\\']) {
        let component = sanitize_component(&substitute(raw, &lookup));
        if !component.is_empty() {
            out.push(component);
        }
    }
    if out.as_os_str().is_empty() {
        out.push(id.gid);
    }
    out
}

fn substitute(raw: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Deterministic file name for the `index`-th (0-based) asset of a gallery,
/// e.g. `0001.png`. Re-downloading an asset overwrites the same file.
pub fn asset_file_name(index: usize, url: &str) -> String {
    format!("{:04}.{}", index + 1, asset_extension(url))
}

fn asset_extension(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_ASSET_EXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields<'a>(link: &'a str, title: &'a str) -> TemplateFields<'a> {
        TemplateFields {
            link,
            title,
            job_title: "Favorites",
            index: 3,
        }
    }

    #[test]
    fn renders_default_template() {
        let f = fields("https://e-hentai.org/g/123/abc/", "Some: Title");
        assert_eq!(render("{gid} {title}", &f), PathBuf::from("123 Some_ Title"));
    }

    #[test]
    fn slash_in_template_makes_subfolders() {
        let f = fields("https://e-hentai.org/g/123/abc/", "T");
        assert_eq!(
            render("{job_title}/{index}-{gid}_{token}", &f),
            PathBuf::from("Favorites").join("3-123_abc")
        );
    }

    #[test]
    fn title_slashes_do_not_escape_folder() {
        let f = fields("https://e-hentai.org/g/9/x/", "../../etc/passwd");
        let rendered = render("{title}", &f);
        assert_eq!(rendered.components().count(), 1);
        assert_eq!(rendered, PathBuf::from("_.._etc_passwd"));
    }

    #[test]
    fn unknown_placeholder_kept_and_empty_falls_back_to_gid() {
        let f = fields("https://e-hentai.org/g/77/t/", "");
        assert_eq!(render("{nope}", &f), PathBuf::from("{nope}"));
        assert_eq!(render("{title}", &f), PathBuf::from("77"));
    }

    #[test]
    fn job_root_sanitizes_title() {
        let root = job_root(Path::new("/dl"), "Fetched from example.org (3 items)");
        assert_eq!(root, PathBuf::from("/dl/Fetched from example.org (3 items)"));
        assert_eq!(job_root(Path::new("/dl"), "///"), PathBuf::from("/dl/_"));
        assert_eq!(job_root(Path::new("/dl"), "..."), PathBuf::from("/dl/untitled"));
    }

    #[test]
    fn asset_names_are_deterministic() {
        assert_eq!(asset_file_name(0, "https://cdn.example.org/a/b/pic.PNG"), "0001.png");
        assert_eq!(asset_file_name(11, "https://example.org/s/abc/12-3"), "0012.jpg");
        assert_eq!(asset_file_name(1, "https://example.org/x.webp?download=1"), "0002.webp");
        assert_eq!(asset_file_name(2, "https://example.org/.hidden"), "0003.jpg");
    }
}
