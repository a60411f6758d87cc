//! Tunables the original hard-codes as literals in
//! `udpstream/udpstream_asd.c`; per §9 Open Questions / REDESIGN FLAGS these
//! are exposed as a configurable struct rather than baked-in constants.

#[derive(Clone, Copy, Debug)]
pub struct AsdParams {
    /// Minimum interval between resends of an unacknowledged send-queue
    /// entry.
    pub resend_interval_ms: u64,
    /// How long a connect attempt may remain outstanding before it is
    /// cleared and retried.
    pub connect_timeout_ms: u64,
    /// Number of future ticks a delivered release-queue entry remains
    /// known, to reject stale retransmissions of the same id.
    pub delivery_grace_counter: u32,
    /// Non-graced release-queue entry count above which the stream is
    /// asked to shrink its receive window.
    pub release_queue_window_size_reduction_threshold: usize,
    /// Amount by which the receive window shrinks when the threshold is
    /// crossed.
    pub window_size_reduction_amount: u32,
}

impl Default for AsdParams {
    fn default() -> Self {
        return Self {
            resend_interval_ms: 500,
            connect_timeout_ms: 5000,
            delivery_grace_counter: 100,
            release_queue_window_size_reduction_threshold: 500,
            window_size_reduction_amount: 10,
        };
    }
}
