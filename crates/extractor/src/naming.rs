//! File names for dumped payloads.
//!
//! Embedded objects carry up to three candidate names. Only their extension
//! survives into the output name, which is otherwise a run-wide counter:
//! `oledump<N><extension>`.

use tracing::debug;

/// Prefix of every output file name.
pub const OUTPUT_PREFIX: &str = "oledump";

/// Rewrite a Windows path into forward-slash form.
///
/// `c:\temp\a.doc` becomes `c/temp/a.doc`. Backslashes and colons turn into
/// slashes, then doubled slashes collapse once.
///
/// ```
/// use extractor::naming::to_forward_slashes;
///
/// assert_eq!(to_forward_slashes("c:\\temp\\a.doc"), "c/temp/a.doc");
/// assert_eq!(to_forward_slashes("a.doc"), "a.doc");
/// ```
pub fn to_forward_slashes(name: &str) -> String {
    name.replace('\\', "/").replace(':', "/").replace("//", "/")
}

/// Extension of a file name, leading dot included, surrounding whitespace
/// trimmed. Empty when there is none.
///
/// Only the last path segment counts, and dots leading that segment do not
/// start an extension.
///
/// ```
/// use extractor::naming::extension_of;
///
/// assert_eq!(extension_of("c:\\temp\\report.final.PDF"), ".PDF");
/// assert_eq!(extension_of("dir.d/README"), "");
/// assert_eq!(extension_of(".bashrc"), "");
/// ```
pub fn extension_of(name: &str) -> &str {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &name[base_start..];

    let Some(dot) = base.rfind('.') else {
        return "";
    };
    if base[..dot].bytes().all(|b| b == b'.') {
        return "";
    }
    base[dot..].trim()
}

/// Pick one extension from the candidate names.
///
/// Names without an extension are ignored. When the remaining extensions
/// disagree the first one wins; it is always kept verbatim. Agreement is
/// checked case-insensitively and only affects the log.
///
/// ```
/// use extractor::naming::resolve_extension;
///
/// assert_eq!(resolve_extension(&["a.txt", "b.doc", ""]), ".txt");
/// assert_eq!(resolve_extension(&["", "", ""]), "");
/// ```
pub fn resolve_extension<S: AsRef<str>>(names: &[S]) -> String {
    let extensions: Vec<&str> = names
        .iter()
        .map(|name| extension_of(name.as_ref()))
        .filter(|ext| !ext.is_empty())
        .collect();

    let Some(first) = extensions.first() else {
        return String::new();
    };

    if !extensions.iter().all(|ext| ext.eq_ignore_ascii_case(first)) {
        debug!(?extensions, chosen = %first, "Candidate names disagree on extension");
    }
    first.to_string()
}

/// Output file name for the `index`-th dumped object.
///
/// ```
/// use extractor::naming::output_file_name;
///
/// assert_eq!(output_file_name(0, ".docx"), "oledump0.docx");
/// assert_eq!(output_file_name(12, ""), "oledump12");
/// ```
pub fn output_file_name(index: u64, extension: &str) -> String {
    format!("{}{}{}", OUTPUT_PREFIX, index, extension)
}
