//! Image identifier grammar
//!
//! Identifiers look like `<slug>-<revision>.<ext>`. Outside this pattern they
//! are opaque: the pruner only needs the extension check and exact-string
//! membership against the keeper set.

use regex::Regex;
use std::sync::LazyLock;

/// File extensions recognized as VM images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["qcow2", "iso", "tar.gz", "partial"];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]*-[0-9a-f]+\.(?:qcow2|iso|tar\.gz|partial)$")
        .expect("identifier pattern is valid")
});

/// Whether `name` ends in one of the recognized image extensions
pub fn has_image_extension(name: &str) -> bool {
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| name.strip_suffix(ext).is_some_and(|stem| stem.ends_with('.') && stem.len() > 1))
}

/// Whether `candidate` matches the full identifier grammar
pub fn is_identifier(candidate: &str) -> bool {
    IDENTIFIER.is_match(candidate)
}

/// Extract an identifier from one line of a unified diff.
///
/// Only added lines (`+` prefix) whose remainder is exactly an identifier
/// count. File headers (`+++ b/...`) never match because `/` and spaces are
/// outside the grammar.
pub fn added_identifier(diff_line: &str) -> Option<&str> {
    let rest = diff_line.strip_prefix('+')?;
    let rest = rest.trim_end();
    is_identifier(rest).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::qcow2("fedora-40-0a1b2c.qcow2", true)]
    #[case::iso("rhel-9-4-boot-ffee.iso", true)]
    #[case::tarball("services-1234abcd.tar.gz", true)]
    #[case::partial("debian-testing-99.partial", true)]
    #[case::text("image.txt", false)]
    #[case::bare_gz("archive.gz", false)]
    #[case::extension_only(".qcow2", false)]
    #[case::suffix_without_dot("notaqcow2", false)]
    fn extension_filter(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(has_image_extension(name), expected);
    }

    #[rstest]
    #[case::plain("a-111.qcow2", true)]
    #[case::dotted_slug("fedora-coreos-3f9a.qcow2", true)]
    #[case::no_revision("fedora.qcow2", false)]
    #[case::uppercase_revision("fedora-ABC.qcow2", false)]
    #[case::path("images/fedora-abc.qcow2", false)]
    #[case::wrong_ext("fedora-abc.img", false)]
    fn identifier_grammar(#[case] candidate: &str, #[case] expected: bool) {
        assert_eq!(is_identifier(candidate), expected);
    }

    #[test]
    fn added_identifier_from_diff_lines() {
        assert_eq!(added_identifier("+fedora-40-abc123.qcow2"), Some("fedora-40-abc123.qcow2"));
        assert_eq!(added_identifier("-fedora-40-abc123.qcow2"), None);
        assert_eq!(added_identifier(" fedora-40-abc123.qcow2"), None);
        assert_eq!(added_identifier("+++ b/images/fedora-40"), None);
        assert_eq!(added_identifier("+not an image"), None);
    }
}
