//! Image placeholder resolution
//!
//! Generated documents reference `https://placehold.co/` images with a descriptive `alt`.
//! Once a variant completes, each distinct placeholder is turned into a real image and the
//! `src` attributes are rewritten in place.

use crate::image_cache::ImageCache;
use crate::provider::ImageBackend;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const PLACEHOLDER_PREFIX: &str = "https://placehold.co/";

static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("Invalid img tag regex"));
static IMG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\s(src|alt)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid img attr regex")
});

/// One `<img>` element found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

impl ImageRef {
    pub fn is_placeholder(&self) -> bool {
        self.src.starts_with(PLACEHOLDER_PREFIX)
    }
}

/// Placeholder with its cache token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub token: String,
    pub image: ImageRef,
}

/// Deterministic cache token for an image. Keyed on the alt text so identical descriptions
/// share one image across documents; `position` is used only when the alt text is empty.
pub fn placeholder_token(alt: &str, position: usize) -> String {
    let alt = alt.trim();
    if alt.is_empty() {
        return format!("img-pos-{}", position);
    }
    let digest = blake3::hash(alt.as_bytes());
    format!("img-{}", hex::encode(&digest.as_bytes()[..8]))
}

// Attribute names must follow whitespace so `data-src`/`data-alt` never match; the first
// occurrence of each attribute wins.
fn parse_img(tag: &str) -> ImageRef {
    let mut src = None;
    let mut alt = None;
    for caps in IMG_ATTR.captures_iter(tag) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        match caps[1].to_ascii_lowercase().as_str() {
            "src" => {
                src.get_or_insert(value);
            }
            "alt" => {
                alt.get_or_insert(value);
            }
            _ => {}
        }
    }
    ImageRef {
        src: src.unwrap_or_default(),
        alt: alt.unwrap_or_default(),
    }
}

/// All `<img>` elements in document order
pub fn find_images(html: &str) -> Vec<ImageRef> {
    IMG_TAG
        .find_iter(html)
        .map(|m| parse_img(m.as_str()))
        .collect()
}

/// Placeholders in document order; `img-pos-{n}` counts placeholders only
pub fn find_placeholders(html: &str) -> Vec<Placeholder> {
    find_images(html)
        .into_iter()
        .filter(ImageRef::is_placeholder)
        .enumerate()
        .map(|(position, image)| Placeholder {
            token: placeholder_token(&image.alt, position),
            image,
        })
        .collect()
}

/// Seed `cache` with every real image in the baseline code so updates reuse them.
/// Returns the number of entries seeded.
pub fn seed_cache_from_baseline(cache: &ImageCache, baseline_code: &str) -> usize {
    let mut seeded = 0;
    for image in find_images(baseline_code) {
        if image.is_placeholder() || image.src.is_empty() || image.alt.trim().is_empty() {
            continue;
        }
        cache.seed(placeholder_token(&image.alt, 0), image.src);
        seeded += 1;
    }
    seeded
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageResolution {
    pub html: String,
    /// Distinct placeholders resolved
    pub resolved: usize,
    /// Alt text of placeholders that could not be resolved
    pub failed: Vec<String>,
}

/// Replace placeholder `src` attributes with generated images.
///
/// Each distinct token is produced at most once per pass; with a cache, at most once per
/// connection. Failed tokens keep their placeholder `src`.
pub async fn resolve_images(
    html: &str,
    backend: &dyn ImageBackend,
    cache: Option<&ImageCache>,
) -> ImageResolution {
    let placeholders = find_placeholders(html);
    if placeholders.is_empty() {
        return ImageResolution {
            html: html.to_string(),
            ..Default::default()
        };
    }

    let mut distinct: Vec<&Placeholder> = Vec::new();
    for placeholder in &placeholders {
        if !distinct.iter().any(|p| p.token == placeholder.token) {
            distinct.push(placeholder);
        }
    }
    debug!(
        placeholders = placeholders.len(),
        distinct = distinct.len(),
        cached = cache.is_some(),
        "Resolving image placeholders"
    );

    let outcomes = join_all(distinct.iter().map(|placeholder| async move {
        let prompt = image_prompt(&placeholder.image.alt);
        let result = match cache {
            Some(cache) => {
                cache
                    .get_or_try_create(&placeholder.token, || backend.generate(&prompt))
                    .await
            }
            None => backend.generate(&prompt).await,
        };
        (*placeholder, result)
    }))
    .await;

    let mut urls: HashMap<String, String> = HashMap::new();
    let mut failed = Vec::new();
    for (placeholder, result) in outcomes {
        match result {
            Ok(url) => {
                urls.insert(placeholder.token.clone(), url);
            }
            Err(err) => {
                warn!(token = %placeholder.token, kind = err.kind(), error = %err, "Image generation failed");
                failed.push(placeholder.image.alt.clone());
            }
        }
    }

    ImageResolution {
        html: substitute(html, &urls),
        resolved: urls.len(),
        failed,
    }
}

fn image_prompt(alt: &str) -> String {
    let alt = alt.trim();
    if alt.is_empty() {
        "A neutral placeholder image for a web page".to_string()
    } else {
        alt.to_string()
    }
}

// Rewrite placeholder tags in one pass; positions are recomputed the same way as
// `find_placeholders` so empty-alt tokens line up.
fn substitute(html: &str, urls: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    let mut position = 0;
    for m in IMG_TAG.find_iter(html) {
        let tag = m.as_str();
        let image = parse_img(tag);
        if !image.is_placeholder() {
            continue;
        }
        let token = placeholder_token(&image.alt, position);
        position += 1;
        if let Some(url) = urls.get(&token) {
            out.push_str(&html[last..m.start()]);
            out.push_str(&tag.replacen(&image.src, url, 1));
            last = m.end();
        }
    }
    out.push_str(&html[last..]);
    out
}
