//! Container detection from file headers.
//!
//! The media type of a candidate is decided by its leading bytes, never by
//! its extension, so a renamed executable is still reported as what it is.

/// Number of leading bytes read for detection.
pub const SNIFF_LEN: usize = 4096;

pub const MIME_MP4: &str = "video/mp4";
pub const MIME_QUICKTIME: &str = "video/quicktime";
pub const MIME_AVI: &str = "video/x-msvideo";
pub const MIME_MATROSKA: &str = "video/x-matroska";
pub const MIME_WEBM: &str = "video/webm";
pub const MIME_WINDOWS_EXECUTABLE: &str = "application/x-msdownload";
pub const MIME_UNKNOWN: &str = "application/octet-stream";

/// EBML magic number that opens every Matroska/WebM file.
const EBML_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];

/// Shortest header every recognized container can be identified from.
pub const MIN_SNIFF_LEN: usize = 12;

/// Top-level QuickTime atoms that may open a file lacking an `ftyp` box.
const LEGACY_QUICKTIME_ATOMS: &[&[u8; 4]] = &[b"moov", b"mdat", b"wide", b"free", b"skip", b"pnot"];

/// Detects the MIME type of a file from its header bytes.
///
/// Returns [`MIME_UNKNOWN`] when nothing is recognized.
pub fn sniff(header: &[u8]) -> &'static str {
    if let Some(mime) = sniff_iso_bmff(header) {
        return mime;
    }

    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"AVI " {
        return MIME_AVI;
    }

    if header.starts_with(EBML_MAGIC) {
        return sniff_ebml_doctype(header);
    }

    if header.starts_with(b"MZ") {
        return MIME_WINDOWS_EXECUTABLE;
    }

    MIME_UNKNOWN
}

/// Media type implied by a file name's extension, for allowed containers only.
///
/// Used when the file is too short to carry a recognizable header, so an
/// empty `clip.mp4` is still reported as an MP4 of size zero.
pub fn from_extension(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some(MIME_MP4),
        "mov" | "qt" => Some(MIME_QUICKTIME),
        "avi" => Some(MIME_AVI),
        "mkv" => Some(MIME_MATROSKA),
        "webm" => Some(MIME_WEBM),
        _ => None,
    }
}

/// Detects the media type of a file from its header, falling back to the
/// extension only when the header is too short to say anything.
pub fn detect(file_name: &str, header: &[u8]) -> &'static str {
    match sniff(header) {
        MIME_UNKNOWN if header.len() < MIN_SNIFF_LEN => {
            from_extension(file_name).unwrap_or(MIME_UNKNOWN)
        }
        sniffed => sniffed,
    }
}

/// MP4 and QuickTime share the ISO base media layout: a size followed by a
/// four-character box type. The `ftyp` major brand tells them apart.
fn sniff_iso_bmff(header: &[u8]) -> Option<&'static str> {
    if header.len() < 8 {
        return None;
    }

    let box_type = &header[4..8];
    if box_type == b"ftyp" {
        let brand = header.get(8..12)?;
        return Some(if brand == b"qt  " {
            MIME_QUICKTIME
        } else {
            MIME_MP4
        });
    }

    LEGACY_QUICKTIME_ATOMS
        .iter()
        .any(|atom| box_type == &atom[..])
        .then_some(MIME_QUICKTIME)
}

/// Matroska and WebM differ only in the EBML DocType string.
fn sniff_ebml_doctype(header: &[u8]) -> &'static str {
    if contains(header, b"webm") {
        MIME_WEBM
    } else {
        MIME_MATROSKA
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
