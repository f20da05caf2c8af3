//! Supported file types and content-type classification.

/// Extensions (upper-case) whose files are mirrored. Anything else is
/// filtered out before it reaches the mirror.
pub const SUPPORTED_FILE_TYPES: &[&str] = &[
    "PDF", "HTML", "XML", "XSLT", "MD", "CSV", "XLS", "XLSX", "JSON", "RTF", "PPT", "PPTX", "DOC",
    "DOCX", "TXT",
];

/// Extensions the search index classifies natively.
const INDEX_DOCUMENT_TYPES: &[&str] = &[
    "PDF", "HTML", "XML", "XSLT", "MD", "CSV", "XLS", "XLSX", "JSON", "RTF", "PPT", "PPTX", "DOC",
    "DOCX",
];

/// Content type assigned to everything the index does not classify natively.
pub const DEFAULT_CONTENT_TYPE: &str = "TXT";

/// Returns the upper-cased extension of `name`, if it has one.
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_uppercase())
}

/// Whether a file with this name is mirrored at all.
pub fn is_supported_file(name: &str) -> bool {
    extension(name).is_some_and(|ext| SUPPORTED_FILE_TYPES.contains(&ext.as_str()))
}

/// Content type for the metadata document.
pub fn content_type(name: &str) -> &'static str {
    extension(name)
        .and_then(|ext| INDEX_DOCUMENT_TYPES.iter().find(|t| **t == ext).copied())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
