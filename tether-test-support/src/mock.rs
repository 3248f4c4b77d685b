//! In-memory transport.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether::{Envelope, Transport, TransportError, Vsn};
use url::Url;

#[derive(Debug, Default)]
struct State {
    connected: bool,
    connecting: bool,
    fail_sends: bool,
    opened: Vec<(Url, bool)>,
    sent: Vec<String>,
    closes: Vec<Option<Duration>>,
}

/// Transport that never touches the network.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// session. `open` only records the request and leaves the attempt in
/// flight; the test settles it with [`set_connected`](Self::set_connected)
/// and feeds `TransportEvent::Open` or `TransportEvent::Close` to the session.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle any in-flight attempt as connected or failed.
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state.lock();
        state.connected = connected;
        state.connecting = false;
    }

    /// Make every `send_text` fail even while connected.
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// URLs passed to `open`, oldest first.
    pub fn opened(&self) -> Vec<Url> {
        self.state.lock().opened.iter().map(|(url, _)| url.clone()).collect()
    }

    /// `allow_self_signed` from the latest `open`.
    pub fn last_allow_self_signed(&self) -> Option<bool> {
        self.state.lock().opened.last().map(|(_, allow)| *allow)
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Frames written so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Frames written so far, removing them from the record.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Written frames decoded with `vsn`. Panics on a frame that does not decode.
    pub fn sent_envelopes(&self, vsn: Vsn) -> Vec<Envelope> {
        self.sent()
            .iter()
            .map(|text| Envelope::decode(text, vsn).expect("session wrote an undecodable frame"))
            .collect()
    }

    pub fn last_sent(&self, vsn: Vsn) -> Option<Envelope> {
        self.sent_envelopes(vsn).pop()
    }

    /// Written frames with the given event, decoded with `vsn`.
    pub fn sent_with_event(&self, vsn: Vsn, event: &str) -> Vec<Envelope> {
        self.sent_envelopes(vsn)
            .into_iter()
            .filter(|envelope| envelope.event == event)
            .collect()
    }

    /// Timeouts passed to `close`, oldest first.
    pub fn closes(&self) -> Vec<Option<Duration>> {
        self.state.lock().closes.clone()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, url: &Url, allow_self_signed: bool) -> tether::Result<()> {
        let mut state = self.state.lock();
        state.opened.push((url.clone(), allow_self_signed));
        state.connected = false;
        state.connecting = true;
        Ok(())
    }

    fn close(&mut self, timeout: Option<Duration>) {
        let mut state = self.state.lock();
        state.connected = false;
        state.connecting = false;
        state.closes.push(timeout);
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn is_connecting(&self) -> bool {
        self.state.lock().connecting
    }

    fn send_text(&mut self, text: String) -> tether::Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_sends {
            return Err(TransportError::io("send refused"));
        }
        state.sent.push(text);
        Ok(())
    }
}
