//! File name and extension heuristics.

use attachport_shared::RemoteFileInfo;

/// Suffixes longer than this are not treated as real extensions.
pub const MAX_EXTENSION_LEN: usize = 4;

/// Name used when neither the server nor the URL offers one.
const FALLBACK_NAME: &str = "attachment";

/// A plausible extension is 1–4 ASCII alphanumerics.
pub fn is_plausible_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// The suffix after the last period of `name`, if plausible.
pub fn extension_of(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    is_plausible_extension(ext).then_some(ext)
}

/// Local file name for a probed remote file.
///
/// Uses the probed name, percent-decoded and reduced to a safe final path
/// component. The probed extension is appended only when the name has no
/// dot-delimited suffix, or the suffix is empty or longer than
/// [`MAX_EXTENSION_LEN`], so a real extension is never doubled.
pub fn local_file_name(info: &RemoteFileInfo) -> String {
    let raw = info.file_name.as_deref().unwrap_or("");
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    let mut name = sanitize_file_name(&decoded);
    if name.is_empty() {
        name = FALLBACK_NAME.to_string();
    }

    let needs_extension = match name.rsplit_once('.') {
        None => true,
        Some((_, last)) => last.is_empty() || last.len() > MAX_EXTENSION_LEN,
    };

    if needs_extension {
        let ext: String = info
            .extension
            .as_deref()
            .unwrap_or("")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if !ext.is_empty() {
            name.push('.');
            name.push_str(&ext);
        }
    }

    name
}

/// Keep the final path component and drop characters unsafe in file names or URLs.
fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("");

    let mut out = String::with_capacity(last.len());
    for c in last.chars() {
        if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
            out.push(c);
        } else if c.is_whitespace() && !out.ends_with('-') {
            out.push('-');
        }
    }

    out.trim_matches(|c| c == '.' || c == '-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: Option<&str>, ext: Option<&str>) -> RemoteFileInfo {
        RemoteFileInfo {
            mime_type: None,
            file_name: name.map(String::from),
            extension: ext.map(String::from),
        }
    }

    #[test]
    fn plausible_extensions() {
        assert!(is_plausible_extension("jpg"));
        assert!(is_plausible_extension("jpeg"));
        assert!(!is_plausible_extension("dockerfile"));
        assert!(!is_plausible_extension(""));
        assert!(!is_plausible_extension("j/g"));
        assert_eq!(extension_of("pic.final.PNG"), Some("PNG"));
        assert_eq!(extension_of("6a00d8341c-pi"), None);
    }

    #[test]
    fn appends_extension_when_missing() {
        assert_eq!(local_file_name(&info(Some("report"), Some("pdf"))), "report.pdf");
        assert_eq!(local_file_name(&info(Some("pic"), Some("jpeg"))), "pic.jpeg");
    }

    #[test]
    fn keeps_existing_extension() {
        // The probe's extension came from the name, even if the MIME type disagrees.
        assert_eq!(local_file_name(&info(Some("pic.jpg"), Some("jpg"))), "pic.jpg");
        assert_eq!(local_file_name(&info(Some("pic.jpg"), Some("png"))), "pic.jpg");
    }

    #[test]
    fn long_suffix_is_not_an_extension() {
        assert_eq!(
            local_file_name(&info(Some("notes.backup"), Some("pdf"))),
            "notes.backup.pdf"
        );
    }

    #[test]
    fn decodes_and_sanitizes() {
        assert_eq!(
            local_file_name(&info(Some("My%20Trip%20Photo.jpg"), Some("jpg"))),
            "My-Trip-Photo.jpg"
        );
        assert_eq!(
            local_file_name(&info(Some("..%2F..%2Fetc%2Fpasswd"), None)),
            "passwd"
        );
    }

    #[test]
    fn falls_back_to_generic_name() {
        assert_eq!(local_file_name(&info(None, Some("png"))), "attachment.png");
        assert_eq!(local_file_name(&info(Some("%%%"), None)), "attachment");
    }
}
