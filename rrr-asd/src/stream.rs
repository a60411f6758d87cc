//! Ties the send queue, release queue collection, and connect manager
//! together into the one per-stream object an instance owns (§4.5
//! overview). The underlying datagram transport is supplied by the
//! caller through [`Transport`] so this layer stays testable without a
//! real socket.

use rrr_broker::MessageHolder;

use crate::connect::{ConnectAttempt, ConnectManager};
use crate::err::AsdError;
use crate::frame::{ConnectHandle, ControlFrame, CACK, DACK, MSG, RACK, RST};
use crate::params::AsdParams;
use crate::release_queue::ReleaseQueueCollection;
use crate::send_queue::{SendAction, SendQueue};

/// What a tick produced, for callers that want to react (metrics, logs)
/// without re-deriving it from the transport calls.
#[derive(Default, Debug)]
pub struct TickReport {
    pub data_sent: u32,
    pub releases_sent: u32,
    pub dacks_sent: u32,
    pub window_reduction_requested: bool,
}

/// Transport hook a stream drives: sending a data frame (the application
/// message, self-describing with its own CRCs per §6), sending a control
/// frame, and shrinking the receive window.
pub trait Transport: ConnectAttempt {
    fn send_data(&mut self, connect_handle: ConnectHandle, holder: &MessageHolder) -> Result<(), AsdError>;
    fn send_control(&mut self, connect_handle: ConnectHandle, frame: ControlFrame) -> Result<(), AsdError>;
    fn shrink_window(&mut self, connect_handle: ConnectHandle, amount: u32);
}

/// One reliable ASD stream: an outbound send queue keyed by locally
/// allocated `message_id`s, an inbound release-queue collection keyed by
/// peer `connect_handle`, and the connect state machine that keeps the
/// underlying transport up.
pub struct AsdStream {
    params: AsdParams,
    connect: ConnectManager,
    send_queue: SendQueue,
    release_queues: ReleaseQueueCollection,
}

impl AsdStream {
    pub fn new(connect_handle: ConnectHandle, remote_configured: bool, params: AsdParams) -> Self {
        return Self {
            params,
            connect: ConnectManager::new(connect_handle, remote_configured),
            send_queue: SendQueue::new(),
            release_queues: ReleaseQueueCollection::new(),
        };
    }

    pub fn mark_connected(&mut self) {
        self.connect.mark_connected();
    }

    /// Queues `holder` for reliable delivery and returns its allocated
    /// `message_id`.
    pub fn send(&mut self, holder: MessageHolder, now_ms: u64) -> u32 {
        self.send_queue.enqueue(holder, now_ms)
    }

    /// Applies an inbound control frame to whichever side it targets:
    /// `DACK`/`RACK`/`CACK` advance this stream's own outbound entries;
    /// `RST` clears the sender's release queue (the peer is telling us it
    /// reconnected and its old ids are meaningless, §4.5).
    pub fn on_control(&mut self, from: ConnectHandle, frame: ControlFrame) {
        if frame.has(RST) {
            self.release_queues.reset(from);
            return;
        }
        if frame.flags & (DACK | RACK | CACK) != 0 {
            self.send_queue.on_ack(frame);
        }
    }

    /// A decoded data frame arrived from `from` carrying `message_id`;
    /// allocates a release-queue entry via `allocate` unless it is already
    /// known (new arrival or within-grace retransmission both tolerated).
    pub fn on_data(&mut self, from: ConnectHandle, message_id: u32, allocate: impl FnOnce() -> MessageHolder) {
        self.release_queues.queue_mut(from).receive(message_id, allocate);
    }

    /// Marks `message_id` on `from`'s release queue as delivered to the
    /// application, starting its grace countdown.
    pub fn deliver(&mut self, from: ConnectHandle, message_id: u32) -> Option<&MessageHolder> {
        self.release_queues.queue_mut(from).deliver(message_id, &self.params)
    }

    /// Runs one full tick: connect management, outbound resend pass,
    /// inbound DACK pass and window regulation, for every known peer.
    pub fn tick(&mut self, now_ms: u64, peers: &[ConnectHandle], transport: &mut impl Transport) -> Result<TickReport, AsdError> {
        let mut report = TickReport::default();
        let params = self.params;
        let connect_handle = self.connect.connect_handle();

        self.connect.tick(now_ms, &params, transport, |frame| {
            let _ = transport.send_control(connect_handle, frame);
        })?;

        self.send_queue.tick(now_ms, &params, |message_id, action| match action {
            SendAction::Data { holder } => {
                if transport.send_data(connect_handle, holder).is_ok() {
                    report.data_sent += 1;
                }
                let _ = transport.send_control(connect_handle, ControlFrame::new(MSG, message_id));
            }
            SendAction::Release => {
                if transport.send_control(connect_handle, ControlFrame::new(RACK, message_id)).is_ok() {
                    report.releases_sent += 1;
                }
            }
        });

        for &peer in peers {
            let queue = self.release_queues.queue_mut(peer);
            queue.tick(1, |message_id| {
                if transport.send_control(peer, ControlFrame::new(DACK, message_id)).is_ok() {
                    report.dacks_sent += 1;
                }
            });

            if self.release_queues.needs_window_reduction(peer, &params) {
                transport.shrink_window(peer, params.window_size_reduction_amount);
                report.window_reduction_requested = true;
            }
        }

        return Ok(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrr_broker::Protocol;
    use rrr_types::{Array, Message, MessageClass};

    struct RecordingTransport {
        connected: bool,
        data_calls: Vec<ConnectHandle>,
        control_calls: Vec<(ConnectHandle, ControlFrame)>,
    }

    impl ConnectAttempt for RecordingTransport {
        fn try_connect(&mut self, _connect_handle: ConnectHandle) -> Result<bool, AsdError> {
            Ok(self.connected)
        }
    }

    impl Transport for RecordingTransport {
        fn send_data(&mut self, connect_handle: ConnectHandle, _holder: &MessageHolder) -> Result<(), AsdError> {
            self.data_calls.push(connect_handle);
            Ok(())
        }

        fn send_control(&mut self, connect_handle: ConnectHandle, frame: ControlFrame) -> Result<(), AsdError> {
            self.control_calls.push((connect_handle, frame));
            Ok(())
        }

        fn shrink_window(&mut self, _connect_handle: ConnectHandle, _amount: u32) {}
    }

    fn holder() -> MessageHolder {
        MessageHolder::new(Message::new(1, MessageClass::Msg, Array::new()), None, Protocol::Udp)
    }

    #[test]
    fn tick_sends_data_frame_for_new_entry() {
        let mut stream = AsdStream::new(5, true, AsdParams { resend_interval_ms: 0, ..AsdParams::default() });
        stream.mark_connected();
        let id = stream.send(holder(), 0);

        let mut transport = RecordingTransport {
            connected: true,
            data_calls: Vec::new(),
            control_calls: Vec::new(),
        };

        let report = stream.tick(0, &[], &mut transport).unwrap();
        assert_eq!(report.data_sent, 1);
        assert_eq!(transport.data_calls, vec![5]);
        assert!(transport.control_calls.contains(&(5, ControlFrame::new(MSG, id))));
    }

    #[test]
    fn rst_clears_release_queue() {
        let mut stream = AsdStream::new(5, false, AsdParams::default());
        stream.on_data(9, 3, holder);
        assert!(stream.release_queues.queue(9).unwrap().is_known(3));

        stream.on_control(9, ControlFrame::new(RST, 0));
        assert!(!stream.release_queues.queue(9).unwrap().is_known(3));
    }
}
