//! Queued, CRC-protected link to the robot controller.
//!
//! [`RobotLink`] owns one connection and one background thread running the
//! communication cycle:
//!
//! 1. If frames are queued and the controller reports room in its motion
//!    queue, send the oldest one; otherwise send a request-data heartbeat.
//! 2. Poll for the reply, resending heartbeats periodically, and give up
//!    after a fixed number of polls.
//! 3. Validate the reply (our CRC, the controller's CRC verdict, the serial
//!    echo) and publish the decoded [`RobotStatus`].
//! 4. Sleep, repeat.
//!
//! Communication faults never stop the cycle.  They are visible only through
//! [`RobotLink::comm_status`] and [`RobotLink::data_status`].
//!
//! The outgoing queue and the published status sit behind separate locks and
//! no lock is held while acquiring the other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use seamtrack_types::{CommStatus, DataStatus, INCREMENT_BATCH, IO_PORTS, Increment, RobotStatus};

use crate::transport::{TcpTransport, Transport};
use crate::wire::{IncomingFrame, IncrementEntry, OutgoingFrame};

/// Upper bound of the random frame serial number.
pub const MAX_SERIAL: i32 = 10_000;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

fn default_controller_addr() -> String {
    "192.168.255.101:50240".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_send_timeout_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_resend_every_polls() -> u32 {
    10
}

fn default_reply_timeout_polls() -> u32 {
    100
}

fn default_cycle_sleep_ms() -> u64 {
    10
}

fn default_queue_capacity() -> i32 {
    50
}

fn default_tool_number() -> i32 {
    15
}

fn default_stop_repeats() -> u32 {
    2
}

fn default_stop_interval_ms() -> u64 {
    100
}

fn default_check_serial_echo() -> bool {
    true
}

/// Connection parameters and cycle timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Controller `host:port`.
    #[serde(default = "default_controller_addr")]
    pub controller_addr: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Write timeout of a single frame.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Bounded wait of one reply poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Heartbeats are resent every this many unanswered polls.
    #[serde(default = "default_resend_every_polls")]
    pub resend_every_polls: u32,
    /// Polls after which the reply is declared missing.
    #[serde(default = "default_reply_timeout_polls")]
    pub reply_timeout_polls: u32,
    #[serde(default = "default_cycle_sleep_ms")]
    pub cycle_sleep_ms: u64,
    /// Queued frames are held back while the controller reports at least
    /// this many entries in its own motion queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: i32,
    /// Tool frame number attached to every motion increment.
    #[serde(default = "default_tool_number")]
    pub tool_number: i32,
    #[serde(default = "default_stop_repeats")]
    pub stop_repeats: u32,
    #[serde(default = "default_stop_interval_ms")]
    pub stop_interval_ms: u64,
    /// Discard replies whose serial differs from the request.
    #[serde(default = "default_check_serial_echo")]
    pub check_serial_echo: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            controller_addr: default_controller_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            resend_every_polls: default_resend_every_polls(),
            reply_timeout_polls: default_reply_timeout_polls(),
            cycle_sleep_ms: default_cycle_sleep_ms(),
            queue_capacity: default_queue_capacity(),
            tool_number: default_tool_number(),
            stop_repeats: default_stop_repeats(),
            stop_interval_ms: default_stop_interval_ms(),
            check_serial_echo: default_check_serial_echo(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

struct Shared {
    queue: Mutex<VecDeque<OutgoingFrame>>,
    status: RwLock<RobotStatus>,
    comm: AtomicU8,
    data: AtomicU8,
    running: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            status: RwLock::new(RobotStatus::default()),
            comm: AtomicU8::new(CommStatus::Uninitialized as u8),
            data: AtomicU8::new(DataStatus::NoData as u8),
            running: AtomicBool::new(false),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<OutgoingFrame>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> RobotStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, status: RobotStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn comm(&self) -> CommStatus {
        CommStatus::from_u8(self.comm.load(Ordering::Acquire))
    }

    fn set_comm(&self, status: CommStatus) {
        let prev = CommStatus::from_u8(self.comm.swap(status as u8, Ordering::AcqRel));
        if prev != status {
            match status {
                CommStatus::Ok | CommStatus::Connecting => info!(?prev, ?status, "link state"),
                _ => warn!(?prev, ?status, "link state"),
            }
        }
    }

    fn data(&self) -> DataStatus {
        DataStatus::from_u8(self.data.load(Ordering::Acquire))
    }

    fn set_data(&self, status: DataStatus) {
        let prev = DataStatus::from_u8(self.data.swap(status as u8, Ordering::AcqRel));
        if prev != status {
            match status {
                DataStatus::Ok => info!(?prev, ?status, "data state"),
                _ => warn!(?prev, ?status, "data state"),
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

fn next_serial() -> i32 {
    rand::thread_rng().gen_range(0..=MAX_SERIAL)
}

fn serial_other_than(prev: i32) -> i32 {
    loop {
        let serial = next_serial();
        if serial != prev {
            return serial;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MotionLink
// ────────────────────────────────────────────────────────────────────────────

/// What the tracking supervisor needs from a robot connection.
pub trait MotionLink: Send + Sync {
    /// Most recent validated controller status.
    fn robot_status(&self) -> RobotStatus;

    /// Whether the controller's motion queue can take more increments.
    fn has_room(&self) -> bool;

    /// Queue motion increments for delivery; returns the number of frames
    /// created.
    fn queue_increments(&self, increments: &[Increment]) -> usize;
}

// ────────────────────────────────────────────────────────────────────────────
// RobotLink
// ────────────────────────────────────────────────────────────────────────────

/// Handle to the controller connection and its communication thread.
///
/// Frames may be queued at any time, including before [`start`](Self::start);
/// they are sent once the cycle runs.  Dropping a running link shuts it down.
pub struct RobotLink {
    config: LinkConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Box<dyn Transport>>>,
}

impl RobotLink {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            worker: None,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Connect over TCP and start the communication cycle.
    ///
    /// On failure the link stays stopped with [`CommStatus::NotConnected`];
    /// calling `start` again retries.
    pub fn start(&mut self) -> CommStatus {
        if self.is_running() {
            warn!("robot link already running");
            return self.comm_status();
        }
        self.shared.set_comm(CommStatus::Connecting);
        let connected = TcpTransport::connect(
            &self.config.controller_addr,
            Duration::from_millis(self.config.connect_timeout_ms),
            Duration::from_millis(self.config.send_timeout_ms),
        );
        match connected {
            Ok(transport) => self.start_with(Box::new(transport)),
            Err(e) => {
                warn!(addr = %self.config.controller_addr, error = %e, "controller connection failed");
                self.shared.set_comm(CommStatus::NotConnected);
                CommStatus::NotConnected
            }
        }
    }

    /// Start the communication cycle over an already connected transport.
    pub fn start_with(&mut self, transport: Box<dyn Transport>) -> CommStatus {
        if self.is_running() {
            warn!("robot link already running");
            return self.comm_status();
        }
        self.shared.set_comm(CommStatus::Ok);
        self.shared.running.store(true, Ordering::Release);

        let cycle = CommCycle::new(self.config.clone(), Arc::clone(&self.shared), transport);
        let spawned = thread::Builder::new()
            .name("seamtrack-link".into())
            .spawn(move || cycle.run());
        match spawned {
            Ok(handle) => {
                info!(addr = %self.config.controller_addr, "robot link started");
                self.worker = Some(handle);
                CommStatus::Ok
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn link thread");
                self.shared.running.store(false, Ordering::Release);
                self.shared.set_comm(CommStatus::NotConnected);
                CommStatus::NotConnected
            }
        }
    }

    /// Stop the cycle, ask the controller to drop the connection and close
    /// it.  Does nothing if the link is not running.
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let Some(handle) = self.worker.take() else {
            return;
        };
        let mut transport = match handle.join() {
            Ok(transport) => transport,
            Err(_) => {
                warn!("link thread panicked; skipping stop frames");
                return;
            }
        };

        let stop = OutgoingFrame {
            stop: 1,
            ..OutgoingFrame::new(next_serial())
        }
        .seal();
        let bytes = stop.encode();
        for _ in 0..self.config.stop_repeats {
            if let Err(e) = transport.send(&bytes) {
                debug!(error = %e, "stop frame not delivered");
            }
            thread::sleep(Duration::from_millis(self.config.stop_interval_ms));
        }
        transport.close();
        info!("robot link shut down");
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.shared.is_running()
    }

    pub fn comm_status(&self) -> CommStatus {
        self.shared.comm()
    }

    pub fn data_status(&self) -> DataStatus {
        self.shared.data()
    }

    /// Snapshot of the last validated controller status.
    pub fn status(&self) -> RobotStatus {
        self.shared.status()
    }

    /// Queue a frame that sets digital output `port` to `value`.
    ///
    /// Ports outside `0..8` leave every output untouched; the frame is still
    /// queued.
    pub fn enqueue_output(&self, port: usize, value: i32) {
        let mut frame = OutgoingFrame::new(next_serial());
        match frame.output_io.get_mut(port) {
            Some(slot) => *slot = value,
            None => warn!(port, ports = IO_PORTS, "output port out of range; ignored"),
        }
        frame.set_io = 1;
        self.shared.queue().push_back(frame.seal());
    }

    /// Split `rows` into frames of up to ten increments and queue them.
    ///
    /// Rows with fewer than six components are skipped; extra components
    /// are ignored.  Returns the number of frames queued.
    pub fn enqueue_increments<R: AsRef<[i32]>>(&self, rows: &[R]) -> usize {
        let mut usable: Vec<Increment> = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.as_ref();
            match row.get(..6) {
                Some(head) => {
                    let mut inc = [0; 6];
                    inc.copy_from_slice(head);
                    usable.push(inc);
                }
                None => warn!(len = row.len(), "increment row too short; skipped"),
            }
        }

        let frames: Vec<OutgoingFrame> = usable
            .chunks(INCREMENT_BATCH)
            .map(|chunk| {
                let mut frame = OutgoingFrame::new(next_serial());
                for (entry, inc) in frame.entries.iter_mut().zip(chunk) {
                    *entry = IncrementEntry::motion(inc, self.config.tool_number);
                }
                frame.count = chunk.len() as i32;
                frame.seal()
            })
            .collect();

        let queued = frames.len();
        self.shared.queue().extend(frames);
        debug!(rows = rows.len(), frames = queued, "increments queued");
        queued
    }

    /// Queue a frame asking the controller to flush its motion queue.
    pub fn enqueue_clear_queue(&self) {
        let frame = OutgoingFrame {
            enqueue_flag: 0,
            ..OutgoingFrame::new(next_serial())
        };
        self.shared.queue().push_back(frame.seal());
    }

    /// Frames waiting to be sent.
    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    /// Drop every frame not yet sent; returns how many were dropped.
    pub fn clear_pending(&self) -> usize {
        let mut queue = self.shared.queue();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

impl MotionLink for RobotLink {
    fn robot_status(&self) -> RobotStatus {
        self.status()
    }

    fn has_room(&self) -> bool {
        self.status().queue_count < self.config.queue_capacity
    }

    fn queue_increments(&self, increments: &[Increment]) -> usize {
        self.enqueue_increments(increments)
    }
}

impl Drop for RobotLink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CommCycle
// ────────────────────────────────────────────────────────────────────────────

struct CommCycle {
    config: LinkConfig,
    shared: Arc<Shared>,
    transport: Box<dyn Transport>,
    last_serial: Option<i32>,
}

/// Outcome of checking one received record against the frame just sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accepted,
    Rejected,
    /// Valid reply to an earlier frame; the reply to this one may follow.
    Stale,
}

impl CommCycle {
    fn new(config: LinkConfig, shared: Arc<Shared>, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            shared,
            transport,
            last_serial: None,
        }
    }

    /// Loop until the running flag clears; hands the transport back for the
    /// stop handshake.
    fn run(mut self) -> Box<dyn Transport> {
        let pause = Duration::from_millis(self.config.cycle_sleep_ms);
        while self.shared.is_running() {
            self.step();
            thread::sleep(pause);
        }
        debug!("communication cycle exited");
        self.transport
    }

    /// One send / receive / validate round.
    fn step(&mut self) {
        let frame = self.next_frame();
        self.send(&frame);
        self.await_reply(&frame);
    }

    /// Next queued frame, or a heartbeat.  Consecutive frames never share a
    /// serial, so a late reply cannot pass for the current one.
    fn next_frame(&mut self) -> OutgoingFrame {
        // Read the controller depth before taking the queue lock.
        let depth = self.shared.status().queue_count;
        let queued = if depth < self.config.queue_capacity {
            self.shared.queue().pop_front()
        } else {
            None
        };
        let mut frame = queued.unwrap_or_else(|| OutgoingFrame::new(next_serial()).seal());

        if let Some(prev) = self.last_serial
            && frame.serial == prev
        {
            frame = OutgoingFrame {
                serial: serial_other_than(prev),
                ..frame
            }
            .seal();
        }
        self.last_serial = Some(frame.serial);
        frame
    }

    fn send(&mut self, frame: &OutgoingFrame) {
        match self.transport.send(&frame.encode()) {
            Ok(()) => {
                trace!(serial = frame.serial, count = frame.count, "frame sent");
                self.shared.set_comm(CommStatus::Ok);
            }
            Err(e) => {
                warn!(serial = frame.serial, error = %e, "frame send failed");
                self.shared.set_comm(CommStatus::SendTimedOut);
            }
        }
    }

    /// Poll until a record answering `frame` has been evaluated or the poll
    /// budget runs out.  Stale replies are skipped within the same budget.
    fn await_reply(&mut self, frame: &OutgoingFrame) {
        let wait = Duration::from_millis(self.config.poll_interval_ms);
        let resend_every = self.config.resend_every_polls.max(1);
        let mut polls: u32 = 0;
        let mut skipped: u32 = 0;

        while self.shared.is_running() {
            match self.transport.poll_record(IncomingFrame::BYTES, wait) {
                Ok(Some(bytes)) => match self.evaluate(frame, &bytes) {
                    Verdict::Stale => skipped += 1,
                    Verdict::Accepted | Verdict::Rejected => return,
                },
                Ok(None) => {}
                Err(e) => {
                    trace!(error = %e, "reply poll failed");
                    thread::sleep(wait);
                }
            }

            polls += 1;
            if polls % resend_every == 0 && frame.is_heartbeat() {
                self.send(frame);
            }
            if polls > self.config.reply_timeout_polls {
                if skipped > 0 {
                    warn!(serial = frame.serial, skipped, "no reply echoed the request serial");
                    self.shared.set_data(DataStatus::SerialMismatch);
                } else {
                    self.shared.set_data(DataStatus::NoData);
                }
                return;
            }
        }
    }

    fn evaluate(&self, sent: &OutgoingFrame, bytes: &[u8]) -> Verdict {
        let reply = match IncomingFrame::decode(bytes) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "undecodable reply");
                self.shared.set_data(DataStatus::RecvCrcError);
                return Verdict::Rejected;
            }
        };

        if !reply.crc_valid() {
            warn!(expected = reply.compute_crc(), got = reply.crc, "reply CRC mismatch; dropped");
            self.shared.set_data(DataStatus::RecvCrcError);
            Verdict::Rejected
        } else if reply.crc_ok == 0 {
            warn!(serial = sent.serial, "controller rejected frame CRC; reply dropped");
            self.shared.set_data(DataStatus::SenderCrcError);
            Verdict::Rejected
        } else if self.config.check_serial_echo && reply.serial != sent.serial {
            debug!(sent = sent.serial, echoed = reply.serial, "stale reply skipped");
            Verdict::Stale
        } else {
            self.shared.publish(reply.to_status(Utc::now()));
            self.shared.set_data(DataStatus::Ok);
            Verdict::Accepted
        }
    }
}
