// Utility functions
use url::Url;
use url::form_urlencoded;

/// Appends query pairs onto `url`, joining with `&` when it already carries a query.
/// The pairs go in front of any `#fragment`. Returns the url untouched when
/// there are no pairs.
pub fn append_query<'a, I>(url: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut empty = true;
    for (key, value) in pairs {
        serializer.append_pair(key, value);
        empty = false;
    }
    if empty {
        return url.to_string();
    }

    let query = serializer.finish();
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = match base.find('?') {
        Some(at) if at + 1 == base.len() || base.ends_with('&') => "",
        Some(_) => "&",
        None => "?",
    };

    match fragment {
        Some(fragment) => format!("{}{}{}#{}", base, separator, query, fragment),
        None => format!("{}{}{}", base, separator, query),
    }
}

/// Resolves a possibly relative link against `base`. Falls back to the raw link.
pub fn resolve_link(base: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

/// Collapses runs of whitespace in extracted text.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
