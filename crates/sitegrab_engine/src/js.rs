use std::sync::LazyLock;

use regex::Regex;

// `import x from "m"`, `import "m"`, `require("m")`. Matches inside comments
// and strings are reported too.
static MODULE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        \bimport\s*(?:[\w$*{}\s,]+?\s*from\s*)?["']([^"'\r\n]+)["']
        | \brequire\s*\(\s*["']([^"'\r\n]+)["']\s*\)
        "#,
    )
    .expect("module reference pattern")
});

/// Module specifiers referenced by static imports and `require` calls, in
/// source order.
pub fn extract_js_module_links(source: &str) -> Vec<String> {
    MODULE_REFERENCE
        .captures_iter(source)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|specifier| specifier.as_str().trim().to_string())
        .filter(|specifier| !specifier.is_empty())
        .collect()
}
