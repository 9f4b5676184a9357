//! Live stream monitoring and beam stop commands.
//!
//! Start and stop are plain request sequences. The emergency stop is the one
//! safety-critical path: it sends the beam command before touching the
//! stream and always leaves the monitor inactive, whatever the backend says.

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::api::{ApiClient, BeamAction, BeamStatus};
use crate::schedule::RepeatingTimer;
use crate::store::ZoneRemote;
use crate::zone::Zone;

pub const STATUS_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Backend operations the monitor needs.
pub trait BeamBackend {
    fn start_monitoring(&mut self, video_id: &str) -> Result<()>;
    fn stream_url(&self, video_id: &str) -> Result<String>;
    fn stop_stream(&mut self) -> Result<()>;
    fn control(&mut self, action: BeamAction) -> Result<()>;
    fn status(&mut self) -> Result<BeamStatus>;
    fn zones(&mut self) -> Result<Vec<Zone>>;
}

impl BeamBackend for ApiClient {
    fn start_monitoring(&mut self, video_id: &str) -> Result<()> {
        let ack = ApiClient::start_monitoring(self, video_id)?;
        log::debug!("start-monitoring ack: {}", ack);
        Ok(())
    }

    fn stream_url(&self, video_id: &str) -> Result<String> {
        Ok(ApiClient::stream_url(self, video_id)?.to_string())
    }

    fn stop_stream(&mut self) -> Result<()> {
        ApiClient::stop_stream(self)
    }

    fn control(&mut self, action: BeamAction) -> Result<()> {
        self.beam_control(action)
    }

    fn status(&mut self) -> Result<BeamStatus> {
        self.beam_status()
    }

    fn zones(&mut self) -> Result<Vec<Zone>> {
        self.list_zones()
    }
}

pub struct BeamMonitor<B> {
    backend: B,
    active: bool,
    video_id: Option<String>,
    stream_url: Option<String>,
    poll: RepeatingTimer,
    last_status: Option<BeamStatus>,
    zone_feed: Vec<Zone>,
}

impl<B: BeamBackend> BeamMonitor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: false,
            video_id: None,
            stream_url: None,
            poll: RepeatingTimer::new(STATUS_POLL_PERIOD),
            last_status: None,
            zone_feed: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_running()
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }

    pub fn last_status(&self) -> Option<&BeamStatus> {
        self.last_status.as_ref()
    }

    /// Zones shown next to the stream. Read-only.
    pub fn zone_feed(&self) -> &[Zone] {
        &self.zone_feed
    }

    /// Starts monitoring `video_id` and the 1 s status poll.
    pub fn start(&mut self, video_id: Option<&str>, now_ms: u64) -> Result<()> {
        let video_id = video_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("please upload a video first"))?;
        self.backend.start_monitoring(video_id)?;
        let url = self.backend.stream_url(video_id)?;
        log::info!("monitoring video {}; stream at {}", video_id, url);
        self.active = true;
        self.video_id = Some(video_id.to_string());
        self.stream_url = Some(url);
        self.poll.start(now_ms);
        self.refresh_zone_feed();
        Ok(())
    }

    /// Stops the stream, then the beam. Both requests are always sent; the
    /// monitor only goes inactive when both succeeded.
    pub fn stop(&mut self) -> Result<()> {
        let stream = self.backend.stop_stream();
        let beam = self.backend.control(BeamAction::Stop);
        match (stream, beam) {
            (Ok(()), Ok(())) => {
                log::info!("monitoring stopped");
                self.go_inactive();
                Ok(())
            }
            (Err(err), _) | (Ok(()), Err(err)) => {
                log::error!("stop failed; monitor still active: {:#}", err);
                Err(err)
            }
        }
    }

    /// Beam first, stream second. Always ends inactive with polling
    /// cancelled; the first failure is returned after that.
    pub fn emergency_stop(&mut self) -> Result<()> {
        log::warn!("EMERGENCY STOP requested");
        let beam = self.backend.control(BeamAction::EmergencyStop);
        if let Err(err) = &beam {
            log::error!("emergency stop command failed: {:#}", err);
        }
        let stream = self.backend.stop_stream();
        if let Err(err) = &stream {
            log::error!("stream stop after emergency stop failed: {:#}", err);
        }
        self.go_inactive();
        beam.and(stream)
    }

    /// Runs the status poll if due.
    pub fn tick(&mut self, now_ms: u64) -> Option<&BeamStatus> {
        if !self.active || !self.poll.fire_if_due(now_ms) {
            return None;
        }
        match self.backend.status() {
            Ok(status) => {
                self.last_status = Some(status);
                self.last_status.as_ref()
            }
            Err(err) => {
                log::warn!("beam status poll failed: {:#}", err);
                None
            }
        }
    }

    /// One immediate status request, outside the poll schedule.
    pub fn poll_status(&mut self) -> Result<BeamStatus> {
        let status = self.backend.status()?;
        self.last_status = Some(status.clone());
        Ok(status)
    }

    pub fn refresh_zone_feed(&mut self) {
        match self.backend.zones() {
            Ok(zones) => self.zone_feed = zones,
            Err(err) => log::warn!("zone feed not refreshed: {:#}", err),
        }
    }

    fn go_inactive(&mut self) {
        self.active = false;
        self.video_id = None;
        self.stream_url = None;
        self.poll.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        calls: Vec<String>,
        fail_control: bool,
        fail_stream_stop: bool,
        fail_start: bool,
        active: bool,
    }

    impl BeamBackend for FakeBackend {
        fn start_monitoring(&mut self, video_id: &str) -> Result<()> {
            self.calls.push(format!("start {}", video_id));
            if self.fail_start {
                return Err(anyhow!("HTTP 500"));
            }
            self.active = true;
            Ok(())
        }

        fn stream_url(&self, video_id: &str) -> Result<String> {
            Ok(format!("http://backend/api/video/{}/stream", video_id))
        }

        fn stop_stream(&mut self) -> Result<()> {
            self.calls.push("stream stop".into());
            if self.fail_stream_stop {
                return Err(anyhow!("connection refused"));
            }
            Ok(())
        }

        fn control(&mut self, action: BeamAction) -> Result<()> {
            self.calls.push(format!("control {:?}", action));
            if self.fail_control {
                return Err(anyhow!("connection refused"));
            }
            self.active = false;
            Ok(())
        }

        fn status(&mut self) -> Result<BeamStatus> {
            self.calls.push("status".into());
            Ok(BeamStatus {
                is_active: self.active,
            })
        }

        fn zones(&mut self) -> Result<Vec<Zone>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn start_requires_video() {
        let mut monitor = BeamMonitor::new(FakeBackend::default());
        assert!(monitor.start(None, 0).is_err());
        assert!(monitor.start(Some(""), 0).is_err());
        assert!(!monitor.is_active());
        assert!(monitor.backend().calls.is_empty());
    }

    #[test]
    fn failed_start_stays_inactive() {
        let mut monitor = BeamMonitor::new(FakeBackend {
            fail_start: true,
            ..FakeBackend::default()
        });
        assert!(monitor.start(Some("v1"), 0).is_err());
        assert!(!monitor.is_active());
        assert!(!monitor.is_polling());
    }

    #[test]
    fn polls_once_per_second_while_active() {
        let mut monitor = BeamMonitor::new(FakeBackend::default());
        monitor.start(Some("v1"), 0).unwrap();
        assert_eq!(
            monitor.stream_url(),
            Some("http://backend/api/video/v1/stream")
        );
        assert!(monitor.tick(500).is_none());
        assert_eq!(monitor.tick(1_000), Some(&BeamStatus { is_active: true }));
        assert!(monitor.tick(1_200).is_none());
        assert!(monitor.tick(2_000).is_some());
        monitor.stop().unwrap();
        assert!(monitor.tick(10_000).is_none());
        let polls = monitor
            .backend()
            .calls
            .iter()
            .filter(|c| *c == "status")
            .count();
        assert_eq!(polls, 2);
    }

    #[test]
    fn stop_sends_stream_then_beam() {
        let mut monitor = BeamMonitor::new(FakeBackend::default());
        monitor.start(Some("v1"), 0).unwrap();
        monitor.stop().unwrap();
        assert_eq!(
            &monitor.backend().calls[1..],
            &["stream stop", "control Stop"]
        );
        assert!(!monitor.is_active());
        assert!(!monitor.is_polling());
        assert_eq!(monitor.video_id(), None);
    }

    #[test]
    fn failed_stop_keeps_monitoring() {
        let mut monitor = BeamMonitor::new(FakeBackend::default());
        monitor.start(Some("v1"), 0).unwrap();
        monitor.backend.fail_control = true;
        assert!(monitor.stop().is_err());
        assert!(monitor.is_active());
        assert!(monitor.is_polling());
    }

    #[test]
    fn emergency_stop_always_ends_inactive() {
        let mut monitor = BeamMonitor::new(FakeBackend {
            fail_control: true,
            fail_stream_stop: true,
            ..FakeBackend::default()
        });
        monitor.start(Some("v1"), 0).unwrap();
        assert!(monitor.emergency_stop().is_err());
        assert!(!monitor.is_active());
        assert!(!monitor.is_polling());
        assert_eq!(
            &monitor.backend().calls[1..],
            &["control EmergencyStop", "stream stop"]
        );
        // a second emergency stop is harmless
        let _ = monitor.emergency_stop();
        assert!(!monitor.is_polling());
    }
}
