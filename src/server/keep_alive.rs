use crate::logger::{log, systime, LogSeverity::*};
use crate::net::session::{PingState, SessionHandle};
use crate::protocol::game::ServerKeepAlivePacket;
use crate::protocol::packet::ClientboundPacket;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Sends a keep-alive every `period` until the session closes. The id of each
/// keep-alive is the current time in milliseconds.
pub fn spawn(session: SessionHandle<ClientboundPacket>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cancel = session.cancellation();
        let ping = session.ping_state();
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let keep_alive_id = systime::unix_millis();
                    {
                        let mut state = ping.lock();
                        state.last_ping_id = keep_alive_id;
                        state.last_ping_time = keep_alive_id;
                    }
                    let packet = ClientboundPacket::KeepAlive(ServerKeepAlivePacket {
                        ping_id: keep_alive_id,
                    });
                    if session.send(packet).is_err() {
                        break;
                    }
                }
            }
        }
        log("Keep-alive task stopped".to_owned(), Debug);
    })
}

/// Records the answer to a keep-alive. Only an answer to the most recent
/// keep-alive updates the latency, which is returned.
pub fn record_answer(ping: &Mutex<PingState>, ping_id: i64) -> Option<i64> {
    let mut state = ping.lock();
    if ping_id != state.last_ping_id {
        return None;
    }
    state.latency = systime::unix_millis() - state.last_ping_time;
    Some(state.latency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_answer_updates_latency() {
        let now = systime::unix_millis();
        let ping = Mutex::new(PingState {
            last_ping_id: 42,
            last_ping_time: now - 35,
            latency: 0,
        });
        let latency = record_answer(&ping, 42).unwrap();
        assert!(latency >= 35);
        assert_eq!(ping.lock().latency, latency);
    }

    #[test]
    fn test_stale_answer_is_ignored() {
        let ping = Mutex::new(PingState {
            last_ping_id: 42,
            last_ping_time: systime::unix_millis() - 35,
            latency: 7,
        });
        assert_eq!(record_answer(&ping, 41), None);
        assert_eq!(ping.lock().latency, 7);
    }
}
