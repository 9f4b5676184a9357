//! Blocking HTTP client for the detection backend.
//!
//! Every endpoint the console uses lives here. Path segments are appended
//! through `url` so ids are percent-encoded; non-2xx answers become errors
//! that carry the status code and response body.

mod multipart;

pub use multipart::video_mime;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::store::ZoneRemote;
use crate::zone::Zone;
use multipart::FilePart;

pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
const MAX_FRAME_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ApiClient {
    base: Url,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid api base url '{}'", base))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("api base url '{}' cannot take a path", base));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { base, agent })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Shared agent, reused by the baseline image loader.
    pub fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("api base url cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // -------------------- Video --------------------

    /// Uploads a video file as multipart field `file`.
    pub fn upload_video(&self, path: &Path) -> Result<UploadedVideo> {
        let mime = video_mime(path)
            .ok_or_else(|| anyhow!("{} is not a video file", path.display()))?;
        let size = std::fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        if size > MAX_UPLOAD_BYTES {
            return Err(anyhow!(
                "{} is {} bytes; the upload limit is 100MB",
                path.display(),
                size
            ));
        }
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video");
        let part = FilePart::new("file", file_name, mime, &bytes);

        let url = self.endpoint(&["api", "video", "upload"])?;
        log::info!("uploading {} ({} bytes)", path.display(), size);
        let response = check(
            self.agent
                .post(url.as_str())
                .set("Content-Type", &part.content_type)
                .send_bytes(&part.body),
            "video upload",
        )?;
        let raw: RawUpload = response.into_json().context("parse upload response")?;
        let video_id = match raw.video_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(anyhow!("upload response has no usable video_id: {}", other)),
        };
        Ok(UploadedVideo { video_id })
    }

    pub fn video_metadata(&self, video_id: &str) -> Result<VideoMetadata> {
        let url = self.endpoint(&["api", "video", video_id])?;
        let response = check(self.agent.get(url.as_str()).call(), "video metadata")?;
        response.into_json().context("parse video metadata")
    }

    pub fn first_frame_url(&self, video_id: &str) -> Result<Url> {
        self.endpoint(&["api", "video", video_id, "first-frame"])
    }

    /// Encoded bytes of the video's first frame.
    pub fn first_frame(&self, video_id: &str) -> Result<Vec<u8>> {
        let url = self.first_frame_url(video_id)?;
        let response = check(self.agent.get(url.as_str()).call(), "first frame")?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_FRAME_BYTES + 1)
            .read_to_end(&mut bytes)
            .context("read first frame")?;
        if bytes.is_empty() {
            return Err(anyhow!("backend returned an empty first frame"));
        }
        if bytes.len() as u64 > MAX_FRAME_BYTES {
            return Err(anyhow!("first frame exceeds {} bytes", MAX_FRAME_BYTES));
        }
        Ok(bytes)
    }

    /// URL of the live multipart stream; the display collaborator opens it.
    pub fn stream_url(&self, video_id: &str) -> Result<Url> {
        self.endpoint(&["api", "video", video_id, "stream"])
    }

    pub fn stop_stream(&self) -> Result<()> {
        let url = self.endpoint(&["api", "video", "stream", "stop"])?;
        check(self.agent.post(url.as_str()).call(), "stream stop")?;
        Ok(())
    }

    // -------------------- Beam --------------------

    pub fn start_monitoring(&self, video_id: &str) -> Result<serde_json::Value> {
        let mut url = self.endpoint(&["api", "beam", "start-monitoring"])?;
        url.query_pairs_mut().append_pair("video_id", video_id);
        let response = check(
            self.agent
                .post(url.as_str())
                .set("Content-Type", "application/json")
                .call(),
            "start monitoring",
        )?;
        response.into_json().context("parse start-monitoring response")
    }

    pub fn beam_control(&self, action: BeamAction) -> Result<()> {
        let url = self.endpoint(&["api", "beam", "control"])?;
        check(
            self.agent
                .post(url.as_str())
                .send_json(BeamControl { action }),
            "beam control",
        )?;
        Ok(())
    }

    pub fn beam_status(&self) -> Result<BeamStatus> {
        let url = self.endpoint(&["api", "beam", "status"])?;
        let response = check(self.agent.get(url.as_str()).call(), "beam status")?;
        response.into_json().context("parse beam status")
    }
}

/// Turns non-2xx statuses into errors that carry the response body.
fn check(
    result: std::result::Result<ureq::Response, ureq::Error>,
    what: &str,
) -> Result<ureq::Response> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                Err(anyhow!("{} failed: HTTP {}", what, code))
            } else {
                Err(anyhow!("{} failed: HTTP {}: {}", what, code, body))
            }
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("{} failed: backend unreachable", what))),
    }
}

/// True when the error came from the transport rather than an HTTP status.
pub fn is_unreachable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ureq::Error>(),
            Some(ureq::Error::Transport(_))
        )
    })
}

// -------------------- Zones --------------------

impl ZoneRemote for ApiClient {
    fn list_zones(&mut self) -> Result<Vec<Zone>> {
        let url = self.endpoint(&["api", "zones"])?;
        let response = check(self.agent.get(url.as_str()).call(), "zone listing")?;
        response.into_json().context("parse zone listing")
    }

    fn create_zone(&mut self, zone: &Zone) -> Result<()> {
        let url = self.endpoint(&["api", "zones"])?;
        check(self.agent.post(url.as_str()).send_json(zone), "zone create")?;
        Ok(())
    }

    fn zone_exists(&mut self, id: &str) -> Result<bool> {
        let url = self.endpoint(&["api", "zones", id])?;
        match self.agent.get(url.as_str()).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(code, _)) => {
                log::debug!("zone {} check answered HTTP {}", id, code);
                Ok(false)
            }
            Err(err) => Err(anyhow::Error::new(err).context(format!("check zone {}", id))),
        }
    }

    fn delete_zone(&mut self, id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "zones", id])?;
        check(self.agent.delete(url.as_str()).call(), "zone delete")?;
        Ok(())
    }
}

// -------------------- Wire types --------------------

#[derive(Deserialize)]
struct RawUpload {
    #[serde(default)]
    video_id: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedVideo {
    pub video_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub duration_formatted: Option<String>,
    #[serde(default)]
    pub frame_count: u64,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl VideoMetadata {
    /// Backend-formatted duration, else `frame_count / fps` as `m:ss`.
    pub fn duration_label(&self) -> String {
        match &self.duration_formatted {
            Some(label) if !label.is_empty() => label.clone(),
            _ if self.fps > 0.0 => format_duration(self.frame_count as f64 / self.fps),
            _ => format_duration(0.0),
        }
    }

    pub fn resolution_label(&self) -> String {
        format!("{} × {}", self.width, self.height)
    }

    pub fn fps_label(&self) -> String {
        format!("{} fps", self.fps.round())
    }
}

/// `m:ss`
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamAction {
    Stop,
    EmergencyStop,
}

#[derive(Serialize)]
struct BeamControl {
    action: BeamAction,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamStatus {
    #[serde(default)]
    pub is_active: bool,
}
