//! Minimal URL splitting for same-site checks.
//!
//! Only the pieces the Hugo modifiers need: scheme, network location and
//! everything after it. No normalisation is done, so hosts compare exactly
//! as written.

/// A URL split as `scheme://netloc` + `rest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub scheme: Option<&'a str>,
    /// Host with optional userinfo and port
    pub netloc: Option<&'a str>,
    /// Path, query and fragment
    pub rest: &'a str,
}

impl<'a> UrlParts<'a> {
    pub fn parse(url: &'a str) -> Self {
        let (scheme, after_scheme) = match split_scheme(url) {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, url),
        };

        let (netloc, rest) = match after_scheme.strip_prefix("//") {
            Some(authority) => {
                let end = authority.find(['/', '?', '#']).unwrap_or(authority.len());
                (Some(&authority[..end]), &authority[end..])
            }
            None => (None, after_scheme),
        };

        Self {
            scheme,
            netloc,
            rest,
        }
    }

    /// Whether both URLs name the same network location.
    pub fn same_host(&self, other: &UrlParts<'_>) -> bool {
        self.netloc.unwrap_or("") == other.netloc.unwrap_or("")
    }

    /// `scheme://netloc` of the URL, empty for relative URLs.
    pub fn origin(&self) -> String {
        match (self.scheme, self.netloc) {
            (Some(scheme), Some(netloc)) => format!("{}://{}", scheme, netloc),
            (None, Some(netloc)) => format!("//{}", netloc),
            (Some(scheme), None) => format!("{}:", scheme),
            (None, None) => String::new(),
        }
    }
}

fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme, &url[colon + 1..]))
}

/// Drop scheme and host from `url`.
///
/// With a site URL only URLs on the site's host are changed; without one
/// every URL loses its scheme and host.
pub fn make_relative(url: &str, site_url: Option<&str>) -> String {
    let parts = UrlParts::parse(url);
    match site_url {
        Some(site_url) if !parts.same_host(&UrlParts::parse(site_url)) => url.to_string(),
        _ => parts.rest.to_string(),
    }
}

/// Resolve `path` against `base`.
///
/// An absolute path replaces the whole path of `base`; a relative one
/// replaces only its last segment, so `https://e.com/blog/` and `wp-content`
/// give `https://e.com/blog/wp-content`.
pub fn join_url(base: &str, path: &str) -> String {
    let parts = UrlParts::parse(base);
    let origin = parts.origin();
    if path.starts_with('/') {
        return format!("{}{}", origin, path);
    }

    let base_path = parts
        .rest
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let directory = match base_path.rfind('/') {
        Some(slash) => &base_path[..=slash],
        None => "/",
    };
    format!("{}{}{}", origin, directory, path)
}
