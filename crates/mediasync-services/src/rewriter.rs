//! URL rewriting for rendered output
//!
//! Replaces the host of local upload URLs with the configured CDN host. Hosts
//! call the rewriter explicitly on a response payload or a rendered page;
//! only matched URL prefixes change, every other byte is copied through.

use mediasync_core::SyncConfig;
use regex::{Match, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::host::UploadHost;

/// An `<img>` tag, optionally wrapped by the `<a>` tag right before it.
/// Quoted attribute values may contain `>`.
static IMAGE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)(?P<anchor><a\b(?:[^>"']|"[^"]*"|'[^']*')*>\s*)?(?P<img><img\b(?:[^>"']|"[^"]*"|'[^']*')*>)"#,
    )
    .expect("image tag pattern is valid")
});

/// One attribute inside a tag. Matching every attribute keeps the scan from
/// picking up `src=` text inside another attribute's quoted value.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\s([a-z_:][-a-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
    )
    .expect("attribute pattern is valid")
});

struct BaseUrl<'a> {
    scheme: &'a str,
    host: &'a str,
    path: &'a str,
}

fn split_base_url(url: &str) -> Option<BaseUrl<'_>> {
    let (scheme, rest) = url.trim().split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let (host, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };
    if host.is_empty() {
        return None;
    }
    Some(BaseUrl {
        scheme,
        host,
        path: path.trim_end_matches('/'),
    })
}

/// A match must end where the URL path segment ends, so `/uploads` does not
/// match `/uploads-old` and a bare origin does not match the same host on
/// another port or with userinfo.
fn ends_at_boundary(rest: &str, len: usize) -> bool {
    rest[len..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@')))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewriter {
    marker: String,
    needles: Vec<String>,
    replacement: String,
}

impl UrlRewriter {
    /// Returns `None` when either URL is not absolute or the rewrite host is empty.
    pub fn new(
        upload_base_url: &str,
        site_base_url: Option<&str>,
        rewrite_host: &str,
    ) -> Option<Self> {
        let rewrite_host = rewrite_host.trim().trim_end_matches('/');
        if rewrite_host.is_empty() {
            return None;
        }
        let upload = split_base_url(upload_base_url)?;

        let upload_needle = format!("{}://{}{}", upload.scheme, upload.host, upload.path);
        let mut needles = vec![upload_needle.clone()];
        if let Some(site) = site_base_url.and_then(split_base_url) {
            if site.scheme != upload.scheme || site.host != upload.host {
                needles.push(format!("{}://{}{}", site.scheme, site.host, upload.path));
            }
        }
        needles.sort_by(|a, b| b.len().cmp(&a.len()));
        needles.dedup();

        let marker = if upload.path.is_empty() {
            upload_needle
        } else {
            upload.path.to_string()
        };

        Some(UrlRewriter {
            marker,
            needles,
            replacement: format!("{}://{}{}", upload.scheme, rewrite_host, upload.path),
        })
    }

    /// Rewriter for a host, or `None` when rewriting is disabled or the
    /// upload URL cannot be resolved.
    pub fn from_host(config: &SyncConfig, host: &dyn UploadHost) -> Option<Self> {
        let rewrite_host = config
            .rewrite_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())?;

        let Some(upload_base_url) = host.upload_base_url() else {
            tracing::warn!(
                rewrite_host = %rewrite_host,
                "URL rewriting disabled: upload base URL could not be resolved"
            );
            return None;
        };

        let rewriter = Self::new(
            &upload_base_url,
            host.site_base_url().as_deref(),
            rewrite_host,
        );
        if rewriter.is_none() {
            tracing::warn!(
                upload_base_url = %upload_base_url,
                "URL rewriting disabled: upload base URL is not absolute"
            );
        }
        rewriter
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Earliest needle occurrence at or after `from`, as a byte range.
    fn next_match(&self, haystack: &str, from: usize) -> Option<(usize, usize)> {
        let mut search = from;
        loop {
            let start = self
                .needles
                .iter()
                .filter_map(|needle| haystack[search..].find(needle.as_str()))
                .min()
                .map(|offset| search + offset)?;

            let rest = &haystack[start..];
            let found = self
                .needles
                .iter()
                .find(|needle| rest.starts_with(needle.as_str()) && ends_at_boundary(rest, needle.len()));
            if let Some(needle) = found {
                return Some((start, start + needle.len()));
            }
            // Needles start with an ASCII scheme, so the next byte is a char boundary.
            search = start + 1;
        }
    }

    /// Rewrite every upload URL prefix in `input`.
    pub fn rewrite_str<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains(self.marker.as_str()) {
            return Cow::Borrowed(input);
        }

        let mut output = String::new();
        let mut last = 0;
        while let Some((start, end)) = self.next_match(input, last) {
            output.push_str(&input[last..start]);
            output.push_str(&self.replacement);
            last = end;
        }

        if last == 0 {
            return Cow::Borrowed(input);
        }
        output.push_str(&input[last..]);
        Cow::Owned(output)
    }

    /// Rewrite string leaves of a structured payload in place.
    ///
    /// Returns how many strings changed.
    pub fn rewrite_value(&self, value: &mut serde_json::Value) -> usize {
        match value {
            serde_json::Value::String(s) => {
                let rewritten = match self.rewrite_str(s) {
                    Cow::Owned(rewritten) => rewritten,
                    Cow::Borrowed(_) => return 0,
                };
                *s = rewritten;
                1
            }
            serde_json::Value::Array(items) => {
                items.iter_mut().map(|item| self.rewrite_value(item)).sum()
            }
            serde_json::Value::Object(map) => {
                map.values_mut().map(|item| self.rewrite_value(item)).sum()
            }
            _ => 0,
        }
    }

    /// Rewrite image references in rendered HTML.
    ///
    /// Only `src`/`srcset` of `<img>` tags and `href` of an `<a>` directly
    /// wrapping one are touched.
    pub fn rewrite_html<'a>(&self, html: &'a str) -> Cow<'a, str> {
        if !html.contains(self.marker.as_str()) {
            return Cow::Borrowed(html);
        }

        let mut output = String::new();
        let mut last = 0;
        for caps in IMAGE_TAG.captures_iter(html) {
            if let Some(anchor) = caps.name("anchor") {
                self.rewrite_attributes(html, anchor, &["href"], &mut output, &mut last);
            }
            if let Some(img) = caps.name("img") {
                self.rewrite_attributes(html, img, &["src", "srcset"], &mut output, &mut last);
            }
        }

        if last == 0 {
            return Cow::Borrowed(html);
        }
        output.push_str(&html[last..]);
        Cow::Owned(output)
    }

    fn rewrite_attributes(
        &self,
        html: &str,
        tag: Match<'_>,
        names: &[&str],
        output: &mut String,
        last: &mut usize,
    ) {
        for caps in ATTRIBUTE.captures_iter(tag.as_str()) {
            if !names.iter().any(|name| name.eq_ignore_ascii_case(&caps[1])) {
                continue;
            }
            let Some(value) = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)) else {
                continue;
            };

            if let Cow::Owned(rewritten) = self.rewrite_str(value.as_str()) {
                let start = tag.start() + value.start();
                output.push_str(&html[*last..start]);
                output.push_str(&rewritten);
                *last = tag.start() + value.end();
            }
        }
    }
}
