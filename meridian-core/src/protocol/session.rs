use crate::protocol::config::{SessionConfig, DEFAULT_RTO, MIN_SSTHRESH, PROBE_INTERVAL, PROBE_LIMIT};
use crate::protocol::error::{Error, Result};
use crate::protocol::segment::{Command, Segment, OVERHEAD};
use slog::{debug, o, warn, Logger};
use std::collections::VecDeque;
use std::io;

const ASK_SEND: u8 = 1;
const ASK_TELL: u8 = 2;

/// Signed wraparound comparison: `true` if `later` is after `earlier` on a 32-bit
/// sequence/timestamp space that wraps around.
#[inline]
fn time_after(later: u32, earlier: u32) -> bool {
    (later.wrapping_sub(earlier) as i32) > 0
}

/// Same as [`time_after`] but also true when `later == earlier` — for deadlines that
/// must fire the instant they're reached, not strictly after.
#[inline]
fn time_after_eq(later: u32, earlier: u32) -> bool {
    (later.wrapping_sub(earlier) as i32) >= 0
}

#[inline]
fn time_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

/// A single reliable-datagram session. Transport agnostic: the caller supplies an
/// `output` callback (usually a UDP socket send) to `flush`/`update`, and feeds inbound
/// raw packets to `input`. See spec's external-collaborator contract for the I/O boundary.
pub struct Session {
    conv: u32,
    mtu: u32,
    mss: u32,
    state: bool,

    snd_una: u32,
    snd_nxt: u32,
    rcv_nxt: u32,

    ssthresh: u32,
    rx_rttval: i32,
    rx_srtt: i32,
    rx_rto: u32,
    rx_minrto: u32,

    snd_wnd: u16,
    rcv_wnd: u16,
    rmt_wnd: u16,
    cwnd: u32,
    probe: u8,

    current: u32,
    interval: u32,
    ts_flush: u32,
    xmit: u32,

    nodelay: bool,
    updated: bool,
    ts_probe: u32,
    probe_wait: u32,
    dead_link: u32,
    incr: u32,

    snd_queue: VecDeque<Segment>,
    rcv_queue: VecDeque<Segment>,
    snd_buf: VecDeque<Segment>,
    rcv_buf: VecDeque<Segment>,

    ack_list: Vec<(u32, u32)>,

    fast_resend: u32,
    no_congestion_control: bool,
    stream_mode: bool,

    dead: bool,
    logger: Logger,
}

impl Session {
    pub fn new(conv: u32, config: &SessionConfig) -> Session {
        Self::with_logger(conv, config, Logger::root(slog::Discard, o!()))
    }

    pub fn with_logger(conv: u32, config: &SessionConfig, logger: Logger) -> Session {
        let logger = logger.new(o!("conv" => conv));
        debug!(logger, "session created"; "mtu" => config.mtu, "interval" => config.interval_ms);

        Session {
            conv,
            mtu: config.mtu,
            mss: config.mss(),
            state: true,

            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,

            ssthresh: crate::protocol::config::DEFAULT_SSTHRESH,
            rx_rttval: 0,
            rx_srtt: 0,
            rx_rto: DEFAULT_RTO,
            rx_minrto: config.min_rto,

            snd_wnd: config.send_window,
            rcv_wnd: config.receive_window,
            rmt_wnd: config.receive_window,
            cwnd: 0,
            probe: 0,

            current: 0,
            interval: config.interval_ms,
            ts_flush: config.interval_ms,
            xmit: 0,

            nodelay: config.nodelay,
            updated: false,
            ts_probe: 0,
            probe_wait: 0,
            dead_link: config.dead_link,
            incr: 0,

            snd_queue: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_buf: VecDeque::new(),

            ack_list: Vec::new(),

            fast_resend: config.fast_resend,
            no_congestion_control: config.no_congestion_control,
            stream_mode: config.stream_mode,

            dead: false,
            logger,
        }
    }

    pub fn conv(&self) -> u32 {
        self.conv
    }

    /// Read the 4 leading conv bytes off a wire packet without fully decoding it.
    pub fn peek_conv(buf: &[u8]) -> Option<u32> {
        if buf.len() < 4 {
            return None;
        }
        Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
    }

    pub fn set_mtu(&mut self, mtu: u32) -> Result<()> {
        if mtu < OVERHEAD as u32 + 4 {
            return Err(Error::MtuTooSmall);
        }
        self.mtu = mtu;
        self.mss = mtu - OVERHEAD as u32;
        Ok(())
    }

    pub fn set_window_size(&mut self, send: u16, receive: u16) {
        self.snd_wnd = send;
        if receive > 0 {
            self.rcv_wnd = receive;
        }
    }

    pub fn set_nodelay(&mut self, nodelay: bool, interval: u32, fast_resend: u32, no_congestion_control: bool) {
        self.nodelay = nodelay;
        self.rx_minrto = if nodelay {
            crate::protocol::config::NODELAY_MIN_RTO
        } else {
            crate::protocol::config::NORMAL_MIN_RTO
        };
        self.interval = interval.clamp(10, 5000);
        self.fast_resend = fast_resend;
        self.no_congestion_control = no_congestion_control;
    }

    /// Number of bytes waiting to be sent (queued or in-flight, unacknowledged).
    pub fn wait_send(&self) -> usize {
        self.snd_buf.len() + self.snd_queue.len()
    }

    /// Size of the next fully-reassembled message in the receive queue, if any.
    pub fn peek_size(&self) -> Option<usize> {
        let first = self.rcv_queue.front()?;

        if first.frag == 0 {
            return Some(first.data.len());
        }

        if self.rcv_queue.len() < (first.frag as usize + 1) {
            return None;
        }

        let mut len = 0;
        for seg in self.rcv_queue.iter() {
            len += seg.data.len();
            if seg.frag == 0 {
                break;
            }
        }
        Some(len)
    }

    /// Drain one reassembled message into `buf`. Returns the number of bytes written.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let peeksize = self
            .peek_size()
            .ok_or_else(|| Error::Io(io::ErrorKind::WouldBlock))?;

        if peeksize > buf.len() {
            return Err(Error::PayloadTooLarge);
        }

        let recover = self.rcv_queue.len() >= self.rcv_wnd as usize;

        let mut written = 0;
        while let Some(seg) = self.rcv_queue.pop_front() {
            buf[written..written + seg.data.len()].copy_from_slice(&seg.data);
            written += seg.data.len();
            let fragmented = seg.frag != 0;
            if !fragmented {
                break;
            }
        }

        self.move_receive_buffer_to_queue();

        if self.rcv_queue.len() < self.rcv_wnd as usize && recover {
            self.probe |= ASK_TELL;
        }

        Ok(written)
    }

    /// Queue `data` for sending, fragmenting across segments of at most `mss` bytes.
    pub fn send(&mut self, mut data: &[u8]) -> Result<()> {
        if self.dead {
            return Err(Error::DeadLink);
        }
        if data.is_empty() {
            return Ok(());
        }

        if self.stream_mode {
            if let Some(last) = self.snd_queue.back_mut() {
                if last.data.len() < self.mss as usize {
                    let capacity = self.mss as usize - last.data.len();
                    let take = capacity.min(data.len());
                    last.data.extend_from_slice(&data[..take]);
                    last.frag = 0;
                    data = &data[take..];
                    if data.is_empty() {
                        return Ok(());
                    }
                }
            }
        }

        let count = if data.len() <= self.mss as usize {
            1
        } else {
            (data.len() + self.mss as usize - 1) / self.mss as usize
        };

        if count > 255 {
            return Err(Error::TooManyFragments);
        }

        for i in 0..count {
            let size = (self.mss as usize).min(data.len());
            let chunk = data[..size].to_vec();
            data = &data[size..];

            let frag = if self.stream_mode {
                0
            } else {
                (count - i - 1) as u8
            };

            let mut seg = Segment::new(self.conv, Command::Push, chunk);
            seg.frag = frag;
            self.snd_queue.push_back(seg);
        }

        Ok(())
    }

    fn update_ack(&mut self, rtt: i32) {
        if self.rx_srtt == 0 {
            self.rx_srtt = rtt;
            self.rx_rttval = rtt / 2;
        } else {
            let delta = (rtt - self.rx_srtt).abs();
            self.rx_rttval = (3 * self.rx_rttval + delta) / 4;
            self.rx_srtt = (7 * self.rx_srtt + rtt) / 8;
            if self.rx_srtt < 1 {
                self.rx_srtt = 1;
            }
        }

        let rto = self.rx_srtt + (4 * self.rx_rttval).max(self.interval as i32);
        self.rx_rto = (rto as u32).clamp(self.rx_minrto, crate::protocol::config::MAX_RTO);
    }

    fn shrink_buffer(&mut self) {
        self.snd_una = self.snd_buf.front().map(|s| s.sn).unwrap_or(self.snd_nxt);
    }

    fn parse_ack(&mut self, sn: u32) {
        if time_diff(sn, self.snd_una) < 0 || time_diff(sn, self.snd_nxt) >= 0 {
            return;
        }
        if let Some(pos) = self.snd_buf.iter().position(|s| s.sn == sn) {
            self.snd_buf.remove(pos);
        }
    }

    fn parse_una(&mut self, una: u32) {
        while let Some(seg) = self.snd_buf.front() {
            if time_diff(una, seg.sn) > 0 {
                self.snd_buf.pop_front();
            } else {
                break;
            }
        }
    }

    fn parse_fast_ack(&mut self, sn: u32, ts: u32) {
        if time_diff(sn, self.snd_una) < 0 || time_diff(sn, self.snd_nxt) >= 0 {
            return;
        }

        for seg in self.snd_buf.iter_mut() {
            if time_diff(sn, seg.sn) < 0 {
                break;
            }
            if seg.sn != sn && time_diff(seg.timestamp, ts) <= 0 {
                seg.fast_ack += 1;
            }
        }
    }

    fn ack_push(&mut self, sn: u32, ts: u32) {
        self.ack_list.push((sn, ts));
    }

    /// Move contiguous fragments from the (sequence-ordered) receive buffer into the
    /// externally visible receive queue.
    fn move_receive_buffer_to_queue(&mut self) {
        loop {
            let ready = match self.rcv_buf.front() {
                Some(seg) => seg.sn == self.rcv_nxt && (self.rcv_queue.len() as u16) < self.rcv_wnd,
                None => false,
            };

            if !ready {
                break;
            }

            let seg = self.rcv_buf.pop_front().unwrap();
            self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
            self.rcv_queue.push_back(seg);
        }
    }

    fn parse_data(&mut self, newseg: Segment) {
        let sn = newseg.sn;

        if time_diff(sn, self.rcv_nxt.wrapping_add(self.rcv_wnd as u32)) >= 0 || time_diff(sn, self.rcv_nxt) < 0 {
            return;
        }

        let mut insert_at = self.rcv_buf.len();
        let mut duplicate = false;

        for (i, seg) in self.rcv_buf.iter().enumerate().rev() {
            if seg.sn == sn {
                duplicate = true;
                break;
            }
            if time_diff(sn, seg.sn) > 0 {
                insert_at = i + 1;
                break;
            }
            insert_at = i;
        }

        if !duplicate {
            self.rcv_buf.insert(insert_at, newseg);
        }

        self.move_receive_buffer_to_queue();
    }

    /// Feed a raw inbound packet (possibly containing several segments back to back).
    pub fn input(&mut self, data: &[u8]) -> Result<()> {
        if self.dead {
            return Err(Error::DeadLink);
        }
        if data.len() < OVERHEAD {
            return Err(Error::Truncated);
        }

        let old_una = self.snd_una;
        let mut flag_ack = false;
        let mut max_ack_sn = 0u32;
        let mut max_ack_ts = 0u32;
        let mut cursor = data;

        loop {
            if cursor.len() < OVERHEAD {
                break;
            }

            let (seg, consumed) = match Segment::decode(cursor)? {
                Some(pair) => pair,
                None => break,
            };

            if seg.conv != self.conv {
                return Err(Error::BadConv);
            }

            cursor = &cursor[consumed..];
            self.rmt_wnd = seg.window;
            self.parse_una(seg.una);
            self.shrink_buffer();

            match seg.cmd {
                Command::Ack => {
                    if time_after_eq(self.current, seg.timestamp) {
                        self.update_ack(time_diff(self.current, seg.timestamp));
                    }
                    self.parse_ack(seg.sn);
                    self.shrink_buffer();

                    if !flag_ack || time_after(seg.sn, max_ack_sn) {
                        flag_ack = true;
                        max_ack_sn = seg.sn;
                        max_ack_ts = seg.timestamp;
                    }
                }
                Command::Push => {
                    if time_diff(seg.sn, self.rcv_nxt.wrapping_add(self.rcv_wnd as u32)) < 0 {
                        self.ack_push(seg.sn, seg.timestamp);
                        if time_diff(seg.sn, self.rcv_nxt) >= 0 {
                            self.parse_data(seg);
                        }
                    }
                }
                Command::AskWindow => {
                    self.probe |= ASK_TELL;
                }
                Command::TellWindow => {}
            }
        }

        if flag_ack {
            self.parse_fast_ack(max_ack_sn, max_ack_ts);
        }

        if time_diff(self.snd_una, old_una) > 0 && self.cwnd < self.rmt_wnd as u32 {
            let mss = self.mss;
            if self.cwnd < self.ssthresh {
                self.cwnd += 1;
                self.incr += mss;
            } else {
                self.incr = self.incr.max(mss);
                self.incr += (mss * mss) / self.incr.max(1) + mss / 16;
                if (self.cwnd + 1) * mss <= self.incr {
                    self.cwnd += 1;
                }
            }
            self.cwnd = self.cwnd.min(self.rmt_wnd as u32);
        }

        Ok(())
    }

    fn flush_ack(&mut self, buffer: &mut Vec<u8>, output: &mut dyn FnMut(&[u8]) -> io::Result<()>) -> io::Result<()> {
        let window = self.unused_receive_window();
        let acks = std::mem::take(&mut self.ack_list);

        for (sn, ts) in acks {
            if buffer.len() + OVERHEAD > self.mtu as usize {
                output(buffer)?;
                buffer.clear();
            }

            let mut seg = Segment::new(self.conv, Command::Ack, Vec::new());
            seg.sn = sn;
            seg.timestamp = ts;
            seg.window = window;
            seg.una = self.rcv_nxt;
            seg.encode(buffer)?;
        }

        Ok(())
    }

    fn unused_receive_window(&self) -> u16 {
        if (self.rcv_queue.len() as u16) < self.rcv_wnd {
            self.rcv_wnd - self.rcv_queue.len() as u16
        } else {
            0
        }
    }

    fn probe_window(&mut self) {
        if self.rmt_wnd == 0 {
            if self.probe_wait == 0 {
                self.probe_wait = PROBE_INTERVAL;
                self.ts_probe = self.current.wrapping_add(self.probe_wait);
            } else if time_after_eq(self.current, self.ts_probe) {
                self.probe_wait = (self.probe_wait + self.probe_wait / 2).max(PROBE_INTERVAL).min(PROBE_LIMIT);
                self.ts_probe = self.current.wrapping_add(self.probe_wait);
                self.probe |= ASK_SEND;
            }
        } else {
            self.ts_probe = 0;
            self.probe_wait = 0;
        }
    }

    fn flush_probes(&mut self, buffer: &mut Vec<u8>, output: &mut dyn FnMut(&[u8]) -> io::Result<()>) -> io::Result<()> {
        let window = self.unused_receive_window();

        if self.probe & ASK_SEND != 0 {
            let mut seg = Segment::new(self.conv, Command::AskWindow, Vec::new());
            seg.window = window;
            seg.una = self.rcv_nxt;
            seg.encode(buffer)?;
        }

        if self.probe & ASK_TELL != 0 {
            let mut seg = Segment::new(self.conv, Command::TellWindow, Vec::new());
            seg.window = window;
            seg.una = self.rcv_nxt;
            seg.encode(buffer)?;
        }

        self.probe = 0;
        Ok(())
    }

    /// Emit any pending acknowledgements, probes and retransmits. Called by `update`; can
    /// also be invoked directly after a burst of `send()` calls to push data out sooner.
    pub fn flush(&mut self, output: &mut dyn FnMut(&[u8]) -> io::Result<()>) -> Result<()> {
        if self.dead {
            return Err(Error::DeadLink);
        }
        if !self.updated {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(self.mtu as usize * 3);

        self.flush_ack(&mut buffer, output)?;
        self.probe_window();
        self.flush_probes(&mut buffer, output)?;

        let cwnd = if self.no_congestion_control {
            self.snd_wnd.min(self.rmt_wnd) as u32
        } else {
            self.snd_wnd.min(self.rmt_wnd).min(self.cwnd as u16) as u32
        };

        while time_diff(self.snd_nxt, self.snd_una + cwnd) < 0 {
            let mut seg = match self.snd_queue.pop_front() {
                Some(seg) => seg,
                None => break,
            };
            seg.conv = self.conv;
            seg.sn = self.snd_nxt;
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
            seg.una = self.rcv_nxt;
            seg.resend_ts = self.current;
            seg.rto = self.rx_rto;
            seg.fast_ack = 0;
            seg.transmit_count = 0;
            self.snd_buf.push_back(seg);
        }

        let resent = if self.fast_resend > 0 { self.fast_resend } else { u32::MAX };
        let mut lost = false;
        let window = self.unused_receive_window();

        for seg in self.snd_buf.iter_mut() {
            let mut needs_send = false;

            if seg.transmit_count == 0 {
                needs_send = true;
                seg.transmit_count += 1;
                seg.resend_ts = self.current.wrapping_add(seg.rto);
            } else if time_after_eq(self.current, seg.resend_ts) {
                needs_send = true;
                seg.transmit_count += 1;
                seg.rto = if self.nodelay {
                    seg.rto + seg.rto / 2
                } else {
                    seg.rto + seg.rto
                };
                seg.resend_ts = self.current.wrapping_add(seg.rto);
                lost = true;
            } else if seg.fast_ack >= resent {
                needs_send = true;
                seg.transmit_count += 1;
                seg.fast_ack = 0;
                seg.resend_ts = self.current.wrapping_add(seg.rto);
            }

            if needs_send {
                seg.timestamp = self.current;
                seg.window = window;
                seg.una = self.rcv_nxt;

                if buffer.len() + seg.encoded_len() > self.mtu as usize {
                    output(&buffer)?;
                    buffer.clear();
                }
                seg.encode(&mut buffer)?;

                if seg.transmit_count as u32 >= self.dead_link {
                    self.dead = true;
                    warn!(self.logger, "dead link detected"; "sn" => seg.sn, "transmits" => seg.transmit_count);
                }
            }
        }

        if !buffer.is_empty() {
            output(&buffer)?;
        }

        if lost {
            self.ssthresh = (self.cwnd / 2).max(MIN_SSTHRESH);
            self.cwnd = 1;
            self.incr = self.mss;
        }

        if self.cwnd < 1 {
            self.cwnd = 1;
            self.incr = self.mss;
        }

        if self.dead {
            return Err(Error::DeadLink);
        }

        Ok(())
    }

    /// Advance session clock to `current` (ms), flushing output via `output`.
    pub fn update(&mut self, current: u32, output: &mut dyn FnMut(&[u8]) -> io::Result<()>) -> Result<()> {
        if self.dead {
            return Err(Error::DeadLink);
        }

        self.current = current;

        if !self.updated {
            self.updated = true;
            self.ts_flush = self.current;
        }

        let mut slap = time_diff(self.current, self.ts_flush);

        if slap >= 10000 || slap < -10000 {
            self.ts_flush = self.current;
            slap = 0;
        }

        if slap >= 0 {
            self.ts_flush = self.ts_flush.wrapping_add(self.interval);
            if time_diff(self.current, self.ts_flush) >= 0 {
                self.ts_flush = self.current.wrapping_add(self.interval);
            }
            self.flush(output)?;
        }

        Ok(())
    }

    /// Milliseconds until the caller should next invoke `update`, given no further
    /// `send()`/`input()` calls in the meantime. Avoids needless busy-polling.
    pub fn check(&self, current: u32) -> u32 {
        if !self.updated {
            return 0;
        }

        let mut ts_flush = self.ts_flush;

        if time_diff(current, ts_flush) >= 10000 || time_diff(current, ts_flush) < -10000 {
            ts_flush = current;
        }

        if time_diff(current, ts_flush) >= 0 {
            return 0;
        }

        let mut tm_flush = time_diff(ts_flush, current);

        for seg in self.snd_buf.iter() {
            let diff = time_diff(seg.resend_ts, current);
            if diff <= 0 {
                return 0;
            }
            if diff < tm_flush {
                tm_flush = diff;
            }
        }

        tm_flush.max(0) as u32
    }

    /// `true` once a segment has crossed the dead-link retransmit threshold.
    pub fn is_dead_link(&self) -> bool {
        self.dead
    }
}
