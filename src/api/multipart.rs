use rand::Rng;
use std::path::Path;

/// Container formats the backend accepts, by file extension.
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
];

/// `video/*` MIME type for a file name, or `None` if it is not a video.
pub fn video_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// A `multipart/form-data` body with a single file field.
pub(crate) struct FilePart {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FilePart {
    pub(crate) fn new(field: &str, file_name: &str, mime: &str, bytes: &[u8]) -> Self {
        let mut rng = rand::thread_rng();
        let boundary = boundary_for(bytes, || rng.gen::<u64>());
        let file_name = file_name.replace(['"', '\r', '\n'], "_");
        let mut body = Vec::with_capacity(bytes.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Self {
            content_type: format!("multipart/form-data; boundary={}", boundary),
            body,
        }
    }
}

/// A boundary whose delimiter line does not occur anywhere in `payload`.
fn boundary_for(payload: &[u8], mut next: impl FnMut() -> u64) -> String {
    loop {
        let boundary = format!("----zonectl{:016x}", next());
        let delimiter = format!("--{}", boundary);
        if !contains(payload, delimiter.as_bytes()) {
            return boundary;
        }
        log::debug!("multipart boundary {} collides with payload; picking another", boundary);
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
