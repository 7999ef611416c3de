// src/utils/url.rs

//! URL manipulation utilities.

/// Fill `{name}` placeholders of an endpoint template.
///
/// # Examples
/// ```
/// use threadwatch::utils::url::expand;
///
/// assert_eq!(
///     expand("https://host/{board}/res/{thread}.json", &[("board", "b"), ("thread", "42")]),
///     "https://host/b/res/42.json"
/// );
/// ```
pub fn expand(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{key}}}"), value)
        })
}

/// Flatten a URL into a single file name for the staging directory.
///
/// Keeps what follows the last `//`, drops every `/` and the first `.`,
/// so `https://s1.host.com/a/b.webm` becomes `s1host.comab.webm`.
///
/// # Examples
/// ```
/// use threadwatch::utils::url::staged_name;
///
/// assert_eq!(
///     staged_name("https://s1.webmshare.com/DBj7M.webm"),
///     "s1webmshare.comDBj7M.webm"
/// );
/// ```
pub fn staged_name(url: &str) -> String {
    let tail = url.rsplit("//").next().unwrap_or(url);
    tail.replace('/', "").replacen('.', "", 1)
}
