//! Adaptive-streaming fault handling
//!
//! Segment loaders and demuxers report faults while a manifest source plays.
//! Network faults are retried by reloading from the current position, media
//! faults by an in-place recovery. Both share a bounded attempt budget so a
//! stream that keeps failing is eventually surfaced as a load error instead
//! of looping forever. Sustained playback progress refills the budget.

use super::StreamCallbacks;

/// Broad class of an adaptive-streaming fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Manifest or segment fetch failed
    Network,
    /// Demux or decode failure on data that did arrive
    Media,
    /// Anything else (missing codec, unsupported format, internal errors)
    Other,
}

#[derive(Debug, Clone)]
pub struct StreamFault {
    pub kind: FaultKind,
    pub fatal: bool,
    pub detail: String,
}

impl StreamFault {
    pub fn new(kind: FaultKind, fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            kind,
            fatal,
            detail: detail.into(),
        }
    }
}

/// What the adapter should do about a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Log and keep going
    Ignore,
    /// Restart loading from the current position
    ReloadFromPosition,
    /// Flush and re-decode in place
    RecoverMedia,
    /// Give up; report the stream as failed
    Escalate,
}

/// Per-session recovery budget
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    max_attempts: u32,
    attempts: u32,
}

impl RecoveryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    pub fn decide(&mut self, fault: &StreamFault) -> Recovery {
        let wanted = match (fault.kind, fault.fatal) {
            (FaultKind::Network, _) => Recovery::ReloadFromPosition,
            (FaultKind::Media, _) => Recovery::RecoverMedia,
            (FaultKind::Other, true) => return Recovery::Escalate,
            (FaultKind::Other, false) => return Recovery::Ignore,
        };

        if self.attempts >= self.max_attempts {
            return Recovery::Escalate;
        }
        self.attempts += 1;
        wanted
    }

    /// Playback is progressing again; refill the budget
    pub fn record_progress(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Media operations an adaptive session drives while recovering
pub trait RecoveryTarget {
    /// Current element position, if known
    fn position(&self) -> Option<f64>;

    /// Restart loading the source, resuming at `resume_at`. Returns `false` if
    /// the element refused to restart.
    fn reload(&self, resume_at: Option<f64>) -> bool;

    /// Flush and re-decode at `position`
    fn recover_in_place(&self, position: f64) -> bool;
}

/// Adaptive-streaming session of a manifest source.
///
/// Owned by whatever watches the element and dropped with it, so detaching a
/// stream always ends the session.
#[derive(Debug)]
pub struct AdaptiveSession {
    demuxer: &'static str,
    policy: RecoveryPolicy,
}

impl AdaptiveSession {
    pub fn new(demuxer: &'static str, max_recoveries: u32) -> Self {
        Self {
            demuxer,
            policy: RecoveryPolicy::new(max_recoveries),
        }
    }

    pub fn record_progress(&mut self) {
        self.policy.record_progress();
    }

    /// Apply the recovery the policy picks for `fault`
    pub fn handle(
        &mut self,
        fault: StreamFault,
        target: &impl RecoveryTarget,
        callbacks: &StreamCallbacks,
    ) -> Recovery {
        let recovery = self.policy.decide(&fault);
        match recovery {
            Recovery::Ignore => {
                log::debug!(
                    "[{}] Ignoring {} warning: {}",
                    callbacks.id(),
                    self.demuxer,
                    fault.detail
                );
            }
            Recovery::ReloadFromPosition => {
                log::warn!(
                    "[{}] Network fault ({}), reloading (attempt {})",
                    callbacks.id(),
                    fault.detail,
                    self.policy.attempts()
                );
                if target.reload(target.position()) {
                    callbacks.load_started();
                } else {
                    callbacks.error(format!("reload failed: {}", fault.detail));
                }
            }
            Recovery::RecoverMedia => {
                log::warn!(
                    "[{}] Media fault ({}), recovering in place (attempt {})",
                    callbacks.id(),
                    fault.detail,
                    self.policy.attempts()
                );
                let position = target.position().unwrap_or(0.0);
                if !target.recover_in_place(position) {
                    callbacks.error(format!("media recovery failed: {}", fault.detail));
                }
            }
            Recovery::Escalate => {
                log::error!(
                    "[{}] Unrecoverable stream fault: {}",
                    callbacks.id(),
                    fault.detail
                );
                callbacks.error(fault.detail);
            }
        }
        recovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterEvent;
    use common::StreamId;
    use std::cell::RefCell;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingTarget {
        position: Option<f64>,
        refuse: bool,
        reloads: RefCell<Vec<Option<f64>>>,
        recoveries: RefCell<Vec<f64>>,
    }

    impl RecoveryTarget for RecordingTarget {
        fn position(&self) -> Option<f64> {
            self.position
        }

        fn reload(&self, resume_at: Option<f64>) -> bool {
            self.reloads.borrow_mut().push(resume_at);
            !self.refuse
        }

        fn recover_in_place(&self, position: f64) -> bool {
            self.recoveries.borrow_mut().push(position);
            !self.refuse
        }
    }

    fn callbacks() -> (StreamCallbacks, mpsc::UnboundedReceiver<crate::adapter::StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StreamCallbacks::new(StreamId::new("NCMVC_front"), tx), rx)
    }

    fn events(rx: &mut mpsc::UnboundedReceiver<crate::adapter::StreamEvent>) -> Vec<AdapterEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.event);
        }
        out
    }

    #[test]
    fn test_network_faults_reload() {
        let mut policy = RecoveryPolicy::new(3);
        let fault = StreamFault::new(FaultKind::Network, false, "segment 404");
        assert_eq!(policy.decide(&fault), Recovery::ReloadFromPosition);

        let fault = StreamFault::new(FaultKind::Network, true, "manifest timeout");
        assert_eq!(policy.decide(&fault), Recovery::ReloadFromPosition);
    }

    #[test]
    fn test_media_faults_recover_in_place() {
        let mut policy = RecoveryPolicy::new(3);
        let fault = StreamFault::new(FaultKind::Media, true, "decode error");
        assert_eq!(policy.decide(&fault), Recovery::RecoverMedia);
    }

    #[test]
    fn test_other_faults() {
        let mut policy = RecoveryPolicy::new(3);
        let fatal = StreamFault::new(FaultKind::Other, true, "no decoder for h265");
        let warning = StreamFault::new(FaultKind::Other, false, "clock skew");
        assert_eq!(policy.decide(&warning), Recovery::Ignore);
        assert_eq!(policy.decide(&fatal), Recovery::Escalate);
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn test_budget_exhaustion_escalates() {
        let mut policy = RecoveryPolicy::new(2);
        let fault = StreamFault::new(FaultKind::Network, true, "connection reset");
        assert_eq!(policy.decide(&fault), Recovery::ReloadFromPosition);
        assert_eq!(policy.decide(&fault), Recovery::ReloadFromPosition);
        assert_eq!(policy.decide(&fault), Recovery::Escalate);

        policy.record_progress();
        assert_eq!(policy.decide(&fault), Recovery::ReloadFromPosition);
    }

    #[test]
    fn test_zero_budget_escalates_immediately() {
        let mut policy = RecoveryPolicy::new(0);
        let fault = StreamFault::new(FaultKind::Media, true, "bad frame");
        assert_eq!(policy.decide(&fault), Recovery::Escalate);
    }

    #[test]
    fn test_session_reload_resumes_at_position() {
        let (callbacks, mut rx) = callbacks();
        let target = RecordingTarget {
            position: Some(42.5),
            ..Default::default()
        };
        let mut session = AdaptiveSession::new("hlsdemux2", 3);

        let fault = StreamFault::new(FaultKind::Network, true, "segment 404");
        assert_eq!(
            session.handle(fault, &target, &callbacks),
            Recovery::ReloadFromPosition
        );
        assert_eq!(*target.reloads.borrow(), vec![Some(42.5)]);
        assert_eq!(events(&mut rx), vec![AdapterEvent::LoadStarted]);
    }

    #[test]
    fn test_session_refused_reload_reports_error() {
        let (callbacks, mut rx) = callbacks();
        let target = RecordingTarget {
            refuse: true,
            ..Default::default()
        };
        let mut session = AdaptiveSession::new("hlsdemux", 3);

        let fault = StreamFault::new(FaultKind::Network, true, "manifest timeout");
        session.handle(fault, &target, &callbacks);
        assert!(matches!(
            events(&mut rx).as_slice(),
            [AdapterEvent::Error(info)] if info.contains("manifest timeout")
        ));
    }

    #[test]
    fn test_session_media_fault_recovers_in_place() {
        let (callbacks, mut rx) = callbacks();
        let target = RecordingTarget {
            position: Some(7.0),
            ..Default::default()
        };
        let mut session = AdaptiveSession::new("hlsdemux2", 3);

        let fault = StreamFault::new(FaultKind::Media, true, "decode error");
        session.handle(fault, &target, &callbacks);
        assert_eq!(*target.recoveries.borrow(), vec![7.0]);
        assert!(target.reloads.borrow().is_empty());
        assert!(events(&mut rx).is_empty());
    }

    #[test]
    fn test_session_escalates_to_error() {
        let (callbacks, mut rx) = callbacks();
        let target = RecordingTarget::default();
        let mut session = AdaptiveSession::new("hlsdemux2", 1);

        let fault = StreamFault::new(FaultKind::Network, true, "connection reset");
        session.handle(fault.clone(), &target, &callbacks);
        assert_eq!(
            session.handle(fault, &target, &callbacks),
            Recovery::Escalate
        );
        assert_eq!(target.reloads.borrow().len(), 1);
        assert_eq!(
            events(&mut rx),
            vec![
                AdapterEvent::LoadStarted,
                AdapterEvent::Error("connection reset".to_string())
            ]
        );

        let warning = StreamFault::new(FaultKind::Other, false, "clock skew");
        assert_eq!(session.handle(warning, &target, &callbacks), Recovery::Ignore);
        assert!(events(&mut rx).is_empty());
    }
}
