//! The capture pipeline: one producer thread feeding an unbounded MPMC
//! queue, a fixed pool of worker threads draining it through the
//! classify → resolve → state-engine chain, and a cooperative completion
//! flag for graceful drain. Batches can reach the sink out of capture order
//! when several workers race; consumers re-derive causal order from each
//! entity's `last_update`.

use crate::addresses::AddressFilter;
use crate::changelog::UpdateSink;
use crate::classify;
use crate::engine;
use crate::frame::{self, Frame};
use crate::models::{now_millis, ChangeBatch, Millis};
use crate::store::TopologyStore;
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use pcap::{Capture, Error as PcapError, Linktype};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One captured frame as delivered by a producer: raw 802.11 MAC header plus
/// body (link-layer preamble already stripped) and the receipt timestamp.
#[derive(Debug)]
pub struct FrameMessage {
    pub bytes: Vec<u8>,
    pub rcvd: Millis,
}

/// Pipeline counters: dropped frames are tolerated but never invisible.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_seen: AtomicU64,
    preamble_drops: AtomicU64,
    decode_drops: AtomicU64,
    classify_drops: AtomicU64,
    batches_published: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub frames_seen: u64,
    pub preamble_drops: u64,
    pub decode_drops: u64,
    pub classify_drops: u64,
    pub batches_published: u64,
}

impl PipelineStats {
    pub fn view(&self) -> StatsView {
        StatsView {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            preamble_drops: self.preamble_drops.load(Ordering::Relaxed),
            decode_drops: self.decode_drops.load(Ordering::Relaxed),
            classify_drops: self.classify_drops.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
        }
    }
}

/// Everything a worker needs, constructed once and shared by `Arc`; there is
/// no hidden global state anywhere in the pipeline.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<TopologyStore>,
    pub filter: Arc<AddressFilter>,
    pub sink: UpdateSink,
    pub stats: Arc<PipelineStats>,
}

const WORKER_BACKOFF: Duration = Duration::from_millis(10);

/// Spawns `count` worker threads draining `rx`. A worker exits once the
/// queue is empty *and* the completion flag is raised; raising the flag is
/// cooperative, so no worker is ever stopped mid-critical-section.
pub fn spawn_workers(
    rx: Receiver<FrameMessage>,
    done: Arc<AtomicBool>,
    ctx: WorkerContext,
    count: usize,
) -> Vec<thread::JoinHandle<()>> {
    (0..count)
        .map(|i| {
            let rx = rx.clone();
            let done = Arc::clone(&done);
            let ctx = ctx.clone();
            thread::Builder::new()
                .name(format!("wavemap-worker-{i}"))
                .spawn(move || worker_loop(&rx, &done, &ctx))
                .expect("failed to spawn worker thread")
        })
        .collect()
}

fn worker_loop(rx: &Receiver<FrameMessage>, done: &AtomicBool, ctx: &WorkerContext) {
    loop {
        match rx.try_recv() {
            Ok(message) => process_message(&message, ctx),
            Err(TryRecvError::Empty) => {
                if done.load(Ordering::Acquire) {
                    tracing::debug!("queue drained, worker exiting");
                    return;
                }
                thread::sleep(WORKER_BACKOFF);
            }
            Err(TryRecvError::Disconnected) => return,
        }
    }
}

/// The per-frame chain: decode, classify, hand to the state engine, publish
/// the resulting batch. Every failure here is fatal for the frame only.
fn process_message(message: &FrameMessage, ctx: &WorkerContext) {
    ctx.stats.frames_seen.fetch_add(1, Ordering::Relaxed);

    let Some(frame) = Frame::parse(&message.bytes) else {
        ctx.stats.decode_drops.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(len = message.bytes.len(), "dropping undecodable frame");
        return;
    };

    let class = match classify::classify(frame.frame_type, frame.subtype) {
        Ok(class) => class,
        Err(err) => {
            ctx.stats.classify_drops.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("dropping frame: {err}");
            return;
        }
    };

    let changes = engine::handle_frame(class, &frame, message.rcvd, &ctx.store, &ctx.filter);
    let batch = ChangeBatch::from_changes(changes);
    if !batch.is_empty() {
        ctx.sink.publish(batch);
        ctx.stats.batches_published.fetch_add(1, Ordering::Relaxed);
    }
}

/// Live capture producer. Never raises completion on its own except on a
/// fatal capture error; external shutdown raises the flag instead.
pub fn spawn_capture(
    interface: String,
    tx: Sender<FrameMessage>,
    done: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Err(err) = run_capture(&interface, &tx, &done, &stats) {
            tracing::error!("capture on {interface} failed: {err:?}");
        }
        done.store(true, Ordering::Release);
    })
}

fn run_capture(
    interface: &str,
    tx: &Sender<FrameMessage>,
    done: &AtomicBool,
    stats: &PipelineStats,
) -> Result<()> {
    let mut cap = Capture::from_device(interface)
        .with_context(|| format!("unable to open device {interface}"))?
        .promisc(true)
        .immediate_mode(true)
        .timeout(1_000)
        .open()
        .with_context(|| format!("failed to start capture on {interface}"))?;

    let linktype = cap.get_datalink();
    loop {
        if done.load(Ordering::Acquire) {
            return Ok(());
        }
        match cap.next_packet() {
            Ok(packet) => enqueue(packet.data, linktype, tx, stats),
            Err(PcapError::TimeoutExpired) => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("capture error on {interface}"));
            }
        }
    }
}

/// File replay producer: enqueues every frame, then raises the completion
/// flag so workers drain and exit.
pub fn spawn_replay(
    path: String,
    tx: Sender<FrameMessage>,
    done: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        match run_replay(&path, &tx, &stats) {
            Ok(count) => tracing::info!("replayed {count} frames from {path}"),
            Err(err) => tracing::error!("replay of {path} failed: {err:?}"),
        }
        done.store(true, Ordering::Release);
    })
}

fn run_replay(path: &str, tx: &Sender<FrameMessage>, stats: &PipelineStats) -> Result<u64> {
    let mut cap =
        Capture::from_file(path).with_context(|| format!("unable to open pcap file {path}"))?;
    let linktype = cap.get_datalink();
    let mut count = 0u64;
    loop {
        match cap.next_packet() {
            Ok(packet) => {
                enqueue(packet.data, linktype, tx, stats);
                count += 1;
            }
            Err(PcapError::NoMorePackets) => return Ok(count),
            Err(err) => return Err(err).with_context(|| format!("error reading {path}")),
        }
    }
}

/// Strips whatever link preamble the capture carries so only the 802.11 MAC
/// header and body enter the queue. Sends are non-blocking by construction
/// (the channel is unbounded), so the capture path never stalls.
fn enqueue(data: &[u8], linktype: Linktype, tx: &Sender<FrameMessage>, stats: &PipelineStats) {
    let bytes = match linktype {
        Linktype::IEEE802_11_RADIOTAP => match frame::strip_radiotap(data) {
            Some(inner) => inner.to_vec(),
            None => {
                stats.preamble_drops.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(len = data.len(), "dropping frame with unusable link preamble");
                return;
            }
        },
        _ => data.to_vec(),
    };
    let _ = tx.send(FrameMessage {
        bytes,
        rcvd: now_millis(),
    });
}

/// Worker-pool sizing: available parallelism, with a small ceiling in replay
/// mode where the producer outruns the workers anyway.
pub fn worker_count(configured: Option<usize>, replay: bool) -> usize {
    let available = thread::available_parallelism().map_or(2, usize::from);
    let count = configured.unwrap_or(available).max(1);
    if replay { count.min(4) } else { count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::build;
    use crate::models::{parse_mac, Connection, Mac};
    use crossbeam_channel::unbounded;

    fn context(store: Arc<TopologyStore>) -> WorkerContext {
        WorkerContext {
            store,
            filter: Arc::new(AddressFilter::default()),
            sink: UpdateSink::new(1024),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    fn mac(s: &str) -> Mac {
        parse_mac(s).unwrap()
    }

    /// A small synthetic capture: three APs with clients, some beacons, a
    /// deauth, and junk that must be dropped.
    fn frame_set() -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for ap_byte in [0x10u8, 0x20, 0x30] {
            let ap = Mac([ap_byte, 0, 0, 0, 0, 1]);
            frames.push(build::beacon(ap, ap, &format!("net-{ap_byte:02x}"), 6));
            for client_byte in 1..=5u8 {
                let client = Mac([0xc0, ap_byte, 0, 0, 0, client_byte]);
                frames.push(build::data_frame(true, false, ap, client, ap));
                frames.push(build::data_frame(false, true, client, ap, ap));
            }
        }
        let ap = Mac([0x10, 0, 0, 0, 0, 1]);
        frames.push(build::deauth(Mac([0xc0, 0x10, 0, 0, 0, 1]), ap, ap));
        frames.push(vec![0xff; 5]); // undecodable
        frames
    }

    fn run_pool(frames: &[Vec<u8>], workers: usize) -> Arc<TopologyStore> {
        let store = Arc::new(TopologyStore::new());
        let ctx = context(Arc::clone(&store));
        let (tx, rx) = unbounded();
        let done = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(rx, Arc::clone(&done), ctx, workers);
        for (i, bytes) in frames.iter().enumerate() {
            tx.send(FrameMessage {
                bytes: bytes.clone(),
                rcvd: i as u64,
            })
            .unwrap();
        }
        done.store(true, Ordering::Release);
        drop(tx);
        for handle in handles {
            handle.join().unwrap();
        }
        store
    }

    #[test]
    fn workers_drain_queue_and_exit_on_completion() {
        let store = run_pool(&frame_set(), 2);
        let (stations, networks, _) = store.snapshot();
        assert_eq!(networks.len(), 3);
        // 3 APs + 15 clients.
        assert_eq!(stations.len(), 18);
    }

    #[test]
    fn parallel_run_matches_single_worker_run() {
        let mut frames = frame_set();
        let single = run_pool(&frames, 1);
        // Shuffle deterministically so the orderings genuinely differ.
        frames.reverse();
        frames.rotate_left(7);
        let parallel = run_pool(&frames, 4);

        let (s1, n1, c1) = single.snapshot();
        let (s2, n2, c2) = parallel.snapshot();
        assert_eq!(
            s1.iter().map(|s| (s.mac, s.is_ap)).collect::<Vec<_>>(),
            s2.iter().map(|s| (s.mac, s.is_ap)).collect::<Vec<_>>()
        );
        assert_eq!(
            n1.iter().map(|n| n.ssid.clone()).collect::<Vec<_>>(),
            n2.iter().map(|n| n.ssid.clone()).collect::<Vec<_>>()
        );
        assert_eq!(
            c1.iter().map(Connection::key).collect::<Vec<_>>(),
            c2.iter().map(Connection::key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn undecodable_frames_are_counted_not_fatal() {
        let store = Arc::new(TopologyStore::new());
        let ctx = context(Arc::clone(&store));
        process_message(
            &FrameMessage {
                bytes: vec![0x00, 0x01, 0x02],
                rcvd: 1,
            },
            &ctx,
        );
        let stats = ctx.stats.view();
        assert_eq!(stats.frames_seen, 1);
        assert_eq!(stats.decode_drops, 1);
        assert_eq!(stats.batches_published, 0);
    }

    #[test]
    fn unusable_radiotap_preamble_is_counted_not_enqueued() {
        let stats = PipelineStats::default();
        let (tx, rx) = unbounded();

        // Claims a 4-byte radiotap header, which is below the minimum.
        enqueue(&[0u8, 0, 4, 0], Linktype::IEEE802_11_RADIOTAP, &tx, &stats);
        assert_eq!(stats.view().preamble_drops, 1);
        assert!(rx.try_recv().is_err());

        let a = mac("aa:aa:aa:aa:aa:aa");
        let inner = build::data_frame(false, false, a, a, a);
        let mut capture = vec![0u8, 0, 10, 0, 0, 0, 0, 0, 0, 0];
        capture.extend_from_slice(&inner);
        enqueue(&capture, Linktype::IEEE802_11_RADIOTAP, &tx, &stats);
        assert_eq!(stats.view().preamble_drops, 1);
        assert_eq!(rx.try_recv().unwrap().bytes, inner);
    }

    #[test]
    fn nonempty_changes_publish_one_batch() {
        let store = Arc::new(TopologyStore::new());
        let ctx = context(Arc::clone(&store));
        let mut rx = ctx.sink.subscribe();
        let bytes = build::data_frame(
            true,
            false,
            mac("aa:aa:aa:aa:aa:aa"),
            mac("bb:bb:bb:bb:bb:bb"),
            mac("cc:cc:cc:cc:cc:cc"),
        );
        process_message(&FrameMessage { bytes, rcvd: 9 }, &ctx);
        assert_eq!(ctx.stats.view().batches_published, 1);
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 5);
    }

    #[test]
    fn worker_count_ceiling_applies_to_replay() {
        assert_eq!(worker_count(Some(16), true), 4);
        assert_eq!(worker_count(Some(16), false), 16);
        assert_eq!(worker_count(Some(0), false), 1);
    }
}
