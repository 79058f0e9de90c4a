use std::sync::LazyLock;

use regex::Regex;

const FALLBACK_FILE_NAME: &str = "photo";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._ -]").expect("static regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Gallery entries are public, so uploaded file names are cut down to a
/// harmless character set before they are stored.
pub fn sanitize_file_name(input: &str) -> String {
    let s = SPACES.replace_all(input, " ");
    let s = UNSAFE_CHARS.replace_all(&s, "");
    let s = SPACES.replace_all(s.trim(), " ").into_owned();

    if s.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        s
    }
}
