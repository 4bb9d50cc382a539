//! The simulator.
//!
//! `Simulator` owns the event queue, the node registry, the channels, and
//! the run metrics, and drives every long-lived node process (traffic
//! generator, transmit dispatcher, Hello beaconing, routing sweep, energy
//! ticks, mobility steps) as typed wakeups on the shared timeline.
//! Everything between two wakeups executes atomically; protocol handlers
//! live next to their state in the `mac`, `routing`, and `phy` modules.
//!
//! Given a configuration and its seed, a run is fully deterministic:
//! same-instant wakeups dispatch FIFO, every table iterated for decisions
//! is ordered, and all randomness flows through named sub-streams.

use fanetsim_common::{NodeId, PacketId, Point3, RngStreams, SimTime};
use fanetsim_config::{MacKind, MobilityKind, SimulationConfig};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use tracing::{debug, info};

use crate::energy::{CommPower, EnergyModel, ENERGY_TICK};
use crate::error::SimError;
use crate::mac::{Mac, MacProtocol, MacState};
use crate::metrics::{DropCause, RunMetrics, SeriesSample};
use crate::mobility::{GaussMarkov3D, LeaderFollower, MobilityModel, RandomWaypoint3D};
use crate::node::Node;
use crate::packet::{Packet, PacketBody};
use crate::phy::Frame;
use crate::routing::Aodv;
use crate::scheduler::EventQueue;
use crate::snapshot::{MetricsSummary, NodeSnapshot, WorldSnapshot};
use crate::world::{self, Channel};

/// Cadence of the routing sweep.
const SWEEP_INTERVAL: SimTime = SimTime::from_secs(1);
/// Cadence of the metrics time series.
const SAMPLE_INTERVAL: SimTime = SimTime::from_secs(1);

/// MAC timing wakeups; all carry the MAC epoch they were scheduled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MacWakeKind {
    /// The instant a full DIFS of idle can first have elapsed.
    Difs,
    /// One backoff slot elapsed.
    Slot,
    /// The channel token was handed over.
    Granted,
    /// The frame has fully left the air.
    TxComplete,
    /// The ACK wait ran out.
    AckTimeout,
    /// Pure ALOHA retransmission wait expired.
    AlohaRetry,
}

/// Everything that can resume a process on the timeline.
#[derive(Debug)]
pub(crate) enum Wakeup {
    Generate { node: NodeId },
    MobilityStep { node: NodeId, epoch: u64 },
    EnergyTick { node: NodeId },
    HelloBeacon { node: NodeId },
    RoutingSweep { node: NodeId },
    MetricsSample,
    Mac { node: NodeId, epoch: u64, kind: MacWakeKind },
    FrameStart { node: NodeId },
    FrameArrival { node: NodeId, frame: Frame },
    AckSend { node: NodeId, to: NodeId, acked: PacketId },
    AckTxDone { node: NodeId },
}

pub struct Simulator {
    pub(crate) config: SimulationConfig,
    pub(crate) queue: EventQueue<Wakeup>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) channels: Vec<Channel>,
    pub(crate) bbox: fanetsim_common::BoundingBox,
    pub(crate) metrics: RunMetrics,
    pub(crate) next_packet_id: u64,
    pub(crate) phy_rng: ChaCha8Rng,
    /// Geometric receive range derived from the link budget.
    pub(crate) max_range: f64,
    horizon: SimTime,
}

impl Simulator {
    /// Builds a simulator from a validated configuration and schedules
    /// every node's initial wakeups.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        config.validate().map_err(SimError::Config)?;

        let streams = RngStreams::new(config.seed);
        let bbox = fanetsim_common::BoundingBox::new(
            config.map_length,
            config.map_width,
            config.map_height,
        );
        let powers = CommPower {
            tx: config.power_tx,
            rx: config.power_rx,
            idle: config.power_idle,
            sleep: config.power_sleep,
        };
        let max_range = world::max_receive_range(
            config.transmitting_power,
            config.carrier_frequency,
            config.noise_power,
            config.snr_threshold,
        );

        let mut topology_rng = streams.global_stream("topology");
        let mut nodes = Vec::with_capacity(config.number_of_drones as usize);
        for i in 0..config.number_of_drones {
            let id = NodeId(i);
            let position = Point3::new(
                topology_rng.gen_range(0.0..=config.map_length),
                topology_rng.gen_range(0.0..=config.map_width),
                topology_rng.gen_range(0.0..=config.map_height),
            );
            let mobility = match config.mobility_model {
                MobilityKind::RandomWaypoint => {
                    MobilityModel::RandomWaypoint3D(RandomWaypoint3D::new())
                }
                MobilityKind::GaussMarkov => MobilityModel::GaussMarkov3D(GaussMarkov3D::new()),
            };
            let protocol = match config.mac_protocol {
                MacKind::CsmaCa => MacProtocol::CsmaCa,
                MacKind::PureAloha => MacProtocol::PureAloha,
            };
            nodes.push(Node {
                id,
                position,
                speed: config.default_speed,
                sleeping: false,
                energy: EnergyModel::new(config.initial_energy, powers),
                mobility,
                mobility_epoch: 0,
                queue: std::collections::VecDeque::new(),
                mac: Mac::new(protocol, config.cw_min),
                aodv: Aodv::default(),
                seen_data: std::collections::BTreeMap::new(),
                incoming_frames: 0,
                channel: (i % config.channel_count) as usize,
                traffic_rng: streams.node_stream("traffic", id),
                mobility_rng: streams.node_stream("mobility", id),
                mac_rng: streams.node_stream("mac", id),
            });
        }

        let channels = (0..config.channel_count).map(|_| Channel::new()).collect();
        let horizon = config.horizon();
        let mut sim = Simulator {
            queue: EventQueue::new(),
            nodes,
            channels,
            bbox,
            metrics: RunMetrics::default(),
            next_packet_id: 0,
            phy_rng: streams.global_stream("phy"),
            max_range,
            horizon,
            config,
        };

        info!(
            nodes = sim.nodes.len(),
            horizon = %sim.horizon,
            range_m = sim.max_range,
            seed = sim.config.seed,
            "simulator built"
        );

        let step = SimTime::from_micros(sim.config.mobility_step_interval);
        let traffic_possible =
            sim.config.packet_generation_rate > 0.0 && sim.config.number_of_drones > 1;
        for i in 0..sim.nodes.len() {
            let node = NodeId(i as u32);
            let hello_jitter = streams
                .node_stream("hello", node)
                .gen_range(0..sim.config.hello_interval.max(1));

            sim.queue.schedule_in(ENERGY_TICK, Wakeup::EnergyTick { node });
            sim.queue
                .schedule_in(step, Wakeup::MobilityStep { node, epoch: 0 });
            sim.queue.schedule_in(
                SimTime::from_micros(hello_jitter),
                Wakeup::HelloBeacon { node },
            );
            sim.queue
                .schedule_in(SWEEP_INTERVAL, Wakeup::RoutingSweep { node });
            if traffic_possible {
                let dt = sim.next_interarrival(node);
                sim.queue.schedule_in(dt, Wakeup::Generate { node });
            }
        }
        sim.queue.schedule_in(SAMPLE_INTERVAL, Wakeup::MetricsSample);

        Ok(sim)
    }

    // ------------------------------------------------------------------
    // Public interface
    // ------------------------------------------------------------------

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Runs to the configured horizon.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.run_until(self.horizon)
    }

    /// Runs until `until` (capped at the horizon), leaving the clock
    /// exactly there. Callers may interleave snapshots and commands
    /// between slices.
    pub fn run_until(&mut self, until: SimTime) -> Result<(), SimError> {
        let until = until.min(self.horizon);
        while let Some((_, wakeup)) = self.queue.pop_until(until) {
            self.dispatch(wakeup)?;
        }
        self.queue.advance_to(until);
        Ok(())
    }

    /// Swaps every node except `leader` to a leader-follower wedge around
    /// it, effective at the current instant. The old mobility models stop
    /// producing updates; followers expose their convergence target in
    /// snapshots.
    pub fn trigger_formation_change(&mut self, leader: NodeId) {
        let step = SimTime::from_micros(self.config.mobility_step_interval);
        info!(leader = %leader, time = %self.queue.now(), "formation change");
        let mut rank = 0u32;
        for i in 0..self.nodes.len() {
            let id = NodeId(i as u32);
            if id == leader {
                continue;
            }
            rank += 1;
            // Wedge behind the leader, alternating sides.
            let row = rank.div_ceil(2) as f64;
            let side = if rank % 2 == 0 { 1.0 } else { -1.0 };
            let offset = Point3::new(-25.0 * row, side * 25.0 * row, 0.0);

            let node = &mut self.nodes[i];
            node.mobility = MobilityModel::LeaderFollower(LeaderFollower::new(leader, offset));
            node.mobility_epoch += 1;
            let epoch = node.mobility_epoch;
            self.queue
                .schedule_in(step, Wakeup::MobilityStep { node: id, epoch });
        }
    }

    /// A read-only view for external observers.
    pub fn snapshot(&self) -> WorldSnapshot {
        let now = self.queue.now();
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                let target = match &n.mobility {
                    MobilityModel::LeaderFollower(f) => {
                        Some(f.target_position(self.nodes[f.leader.index()].position))
                    }
                    _ => None,
                };
                NodeSnapshot {
                    id: n.id,
                    position: n.position,
                    speed: n.speed,
                    residual_energy: n.energy.residual(),
                    sleeping: n.sleeping,
                    target,
                }
            })
            .collect();
        let mut neighbor_edges = Vec::new();
        for n in &self.nodes {
            for (peer, expiry) in &n.aodv.neighbors {
                if *expiry > now {
                    neighbor_edges.push((n.id, *peer));
                }
            }
        }
        let elapsed = if now.is_zero() { SimTime::from_micros(1) } else { now };
        WorldSnapshot {
            time: now,
            nodes,
            neighbor_edges,
            metrics: MetricsSummary {
                generated: self.metrics.data_generated,
                delivered: self.metrics.data_delivered,
                pdr: self.metrics.pdr(),
                dropped_queue: self.metrics.dropped_queue,
                dropped_ttl: self.metrics.dropped_ttl,
                dropped_retry: self.metrics.dropped_retry,
                collisions: self.metrics.collisions,
                control_sent: self.metrics.control_sent_total(),
                avg_latency_us: self.metrics.avg_latency_us(),
                throughput_bps: self.metrics.throughput_bps(elapsed),
            },
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch(&mut self, wakeup: Wakeup) -> Result<(), SimError> {
        match wakeup {
            Wakeup::Generate { node } => self.generate_packet(node),
            Wakeup::MobilityStep { node, epoch } => self.mobility_step(node, epoch),
            Wakeup::EnergyTick { node } => self.energy_tick(node),
            Wakeup::HelloBeacon { node } => {
                if !self.nodes[node.index()].sleeping {
                    self.hello_beacon(node)?;
                    self.queue.schedule_in(
                        SimTime::from_micros(self.config.hello_interval),
                        Wakeup::HelloBeacon { node },
                    );
                }
                Ok(())
            }
            Wakeup::RoutingSweep { node } => {
                self.routing_sweep(node)?;
                self.queue
                    .schedule_in(SWEEP_INTERVAL, Wakeup::RoutingSweep { node });
                Ok(())
            }
            Wakeup::MetricsSample => self.metrics_sample(),
            Wakeup::Mac { node, epoch, kind } => {
                let stale = self.nodes[node.index()].mac.epoch != epoch;
                match kind {
                    // A granted token must be handed back even by a waiter
                    // that has since moved on.
                    MacWakeKind::Granted => self.mac_granted(node, stale),
                    _ if stale => Ok(()),
                    MacWakeKind::Difs => self.mac_sense(node),
                    MacWakeKind::Slot => self.mac_slot(node),
                    MacWakeKind::TxComplete => self.mac_tx_complete(node),
                    MacWakeKind::AckTimeout => self.mac_ack_timeout(node),
                    MacWakeKind::AlohaRetry => self.mac_aloha_retry(node),
                }
            }
            Wakeup::FrameStart { node } => {
                self.frame_start(node);
                Ok(())
            }
            Wakeup::FrameArrival { node, frame } => self.frame_arrival(node, frame),
            Wakeup::AckSend { node, to, acked } => self.ack_send(node, to, acked),
            Wakeup::AckTxDone { node } => {
                self.ack_tx_done(node);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Packet plumbing
    // ------------------------------------------------------------------

    /// Allocates a packet with a fresh globally-unique id.
    pub(crate) fn make_packet(&mut self, src: NodeId, dst: NodeId, body: PacketBody) -> Packet {
        self.next_packet_id += 1;
        Packet::new(
            PacketId(self.next_packet_id),
            src,
            dst,
            self.queue.now(),
            self.config.max_ttl,
            body,
        )
    }

    /// Admits a packet to the node's transmit queue (counted tail-drop on
    /// overflow) and kicks the dispatcher.
    pub(crate) fn enqueue_packet(&mut self, n: NodeId, packet: Packet) -> Result<(), SimError> {
        let is_data = packet.is_data();
        let admitted = self.nodes[n.index()].try_enqueue(packet, self.config.max_queue_size);
        if !admitted {
            if is_data {
                self.metrics.record_drop(n, DropCause::Queue);
            }
            debug!(node = %n, "transmit queue full, tail-dropping");
            return Ok(());
        }
        self.pump_queue(n)
    }

    /// The transmit dispatcher: pops queued packets, resolves their next
    /// hop, and hands them to the MAC. Packets with no route are parked
    /// in the discovery buffer; the loop continues until the MAC is busy
    /// or the queue empties.
    pub(crate) fn pump_queue(&mut self, n: NodeId) -> Result<(), SimError> {
        loop {
            {
                let node = &self.nodes[n.index()];
                if node.sleeping || !node.mac.is_idle() {
                    return Ok(());
                }
            }
            let Some(mut packet) = self.nodes[n.index()].queue.pop_front() else {
                return Ok(());
            };

            if packet.dst.is_broadcast() {
                packet.next_hop = Some(NodeId::BROADCAST);
            } else {
                match self.route_resolve(n, packet.dst) {
                    Some(hop) => packet.next_hop = Some(hop),
                    None => {
                        if packet.is_data() {
                            self.route_buffer_and_discover(n, packet)?;
                        } else {
                            // A control packet that lost its reverse route
                            // has nowhere to go.
                            debug!(node = %n, kind = packet.body.kind(), "no route for control packet");
                        }
                        continue;
                    }
                }
            }
            self.nodes[n.index()].mac.current = Some(packet);
            self.mac_begin(n)?;
        }
    }

    /// Receive-side dispatch after a successful PHY decode.
    pub(crate) fn receive_dispatch(&mut self, n: NodeId, frame: Frame) -> Result<(), SimError> {
        let sender = frame.sender;
        match &frame.packet.body {
            PacketBody::Hello => {
                self.routing_on_hello(n, frame.packet.src);
                Ok(())
            }
            PacketBody::Ack { acked } => self.mac_on_ack(n, *acked),
            PacketBody::RouteRequest(rreq) => {
                let rreq = rreq.clone();
                self.routing_on_rreq(n, &frame.packet, &rreq, sender)
            }
            PacketBody::RouteReply(rrep) => {
                let rrep = rrep.clone();
                self.routing_on_rrep(n, &frame.packet, &rrep, sender)
            }
            PacketBody::RouteError(rerr) => {
                let rerr = rerr.clone();
                self.routing_on_rerr(n, &rerr, sender)
            }
            PacketBody::Data { .. } => self.receive_data(n, frame),
        }
    }

    /// Local delivery or store-and-forward for a data frame.
    fn receive_data(&mut self, n: NodeId, frame: Frame) -> Result<(), SimError> {
        let now = self.queue.now();
        let mut packet = frame.packet;

        // A retransmission after a lost ACK reaches us again; the ACK was
        // already re-sent, so the payload is simply discarded.
        let node = &mut self.nodes[n.index()];
        if node.seen_data.contains_key(&packet.id) {
            debug!(node = %n, packet = %packet.id, "duplicate data frame");
            return Ok(());
        }
        node.seen_data.insert(packet.id, now);

        if packet.dst == n {
            let latency = now - packet.created_at;
            debug!(node = %n, packet = %packet.id, latency = %latency, "delivered");
            self.metrics
                .record_delivered(n, latency, packet.payload_bits());
            return Ok(());
        }

        packet.ttl = packet.ttl.saturating_sub(1);
        if packet.ttl == 0 {
            self.metrics.record_drop(n, DropCause::Ttl);
            return Ok(());
        }
        // A new node traversed: its attempt count starts fresh.
        packet.attempts = 0;
        packet.next_hop = None;
        self.enqueue_packet(n, packet)
    }

    // ------------------------------------------------------------------
    // Node processes
    // ------------------------------------------------------------------

    /// Traffic generator: one data packet to a random peer, then sleep an
    /// exponential interarrival.
    fn generate_packet(&mut self, n: NodeId) -> Result<(), SimError> {
        if self.nodes[n.index()].sleeping {
            return Ok(());
        }
        let peers = self.nodes.len() as u32;
        let dst = {
            let rng = &mut self.nodes[n.index()].traffic_rng;
            let mut dst = NodeId(rng.gen_range(0..peers));
            while dst == n {
                dst = NodeId(rng.gen_range(0..peers));
            }
            dst
        };
        let payload_bits = self.config.average_payload_length;
        let packet = self.make_packet(n, dst, PacketBody::Data { payload_bits });
        self.metrics.record_generated(n);
        self.enqueue_packet(n, packet)?;

        let dt = self.next_interarrival(n);
        self.queue.schedule_in(dt, Wakeup::Generate { node: n });
        Ok(())
    }

    fn next_interarrival(&mut self, n: NodeId) -> SimTime {
        let exp = Exp::new(self.config.packet_generation_rate).expect("positive rate");
        let secs: f64 = exp.sample(&mut self.nodes[n.index()].traffic_rng);
        SimTime::from_micros(((secs * 1e6) as u64).max(1))
    }

    /// One mobility step, guarded by the node's mobility epoch so a
    /// swapped-out model never writes coordinates again.
    fn mobility_step(&mut self, n: NodeId, epoch: u64) -> Result<(), SimError> {
        {
            let node = &self.nodes[n.index()];
            if node.mobility_epoch != epoch || node.sleeping {
                return Ok(());
            }
        }
        let leader_position = self.nodes[n.index()]
            .mobility
            .leader_id()
            .map(|l| self.nodes[l.index()].position);
        let dt = SimTime::from_micros(self.config.mobility_step_interval);
        let bbox = self.bbox;
        let step = {
            let node = &mut self.nodes[n.index()];
            let position = node.position;
            let speed = node.speed;
            node.mobility
                .step(position, speed, &bbox, dt, &mut node.mobility_rng, leader_position)
        };
        self.nodes[n.index()].position = step.position;
        self.queue
            .schedule_in(step.next_in, Wakeup::MobilityStep { node: n, epoch });
        Ok(())
    }

    /// 100 ms energy settlement; sleep transition on exhaustion.
    fn energy_tick(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        if self.nodes[n.index()].sleeping {
            return Ok(());
        }
        let (residual, tolerance) = {
            let node = &mut self.nodes[n.index()];
            let speed = node.speed;
            let residual = node.energy.tick(now, speed);
            (residual, node.energy.tick_tolerance(speed))
        };
        if residual < -tolerance {
            return Err(SimError::invariant("residual-energy-nonnegative", n, now));
        }
        if residual <= 0.0 {
            return self.enter_sleep(n);
        }
        self.queue.schedule_in(ENERGY_TICK, Wakeup::EnergyTick { node: n });
        Ok(())
    }

    /// Terminal sleep: no new traffic, no new transmissions; queued and
    /// buffered packets are drained as counted drops; an in-flight frame
    /// is allowed to finish so the channel token is never leaked.
    fn enter_sleep(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        info!(node = %n, time = %now, "energy exhausted, entering sleep");
        self.metrics.record_exhausted();

        let (queued, buffered) = {
            let node = &mut self.nodes[n.index()];
            node.sleeping = true;
            node.mobility_epoch += 1;
            node.energy.exhaust(now);

            let transmitting = node.mac.state == MacState::Transmitting;
            if !transmitting {
                node.mac.cancel_pending();
                node.mac.current = None;
                node.mac.state = MacState::Idle;
            }

            let queued: Vec<Packet> = node.queue.drain(..).collect();
            let buffered: Vec<Packet> = std::mem::take(&mut node.aodv.buffer)
                .into_values()
                .flatten()
                .map(|b| b.packet)
                .collect();
            (queued, buffered)
        };
        for packet in queued.into_iter().chain(buffered) {
            if packet.is_data() {
                self.metrics.record_drop(n, DropCause::Queue);
            }
        }
        Ok(())
    }

    /// Appends one entry to the 1 s metrics time series.
    fn metrics_sample(&mut self) -> Result<(), SimError> {
        let now = self.queue.now();
        let residual_energy: Vec<f64> = self.nodes.iter().map(|n| n.energy.residual()).collect();
        let sample = SeriesSample {
            time: now,
            pdr: self.metrics.pdr(),
            control_sent: self.metrics.control_sent_total(),
            delivered: self.metrics.data_delivered,
            residual_energy,
        };
        self.metrics.push_sample(sample);
        self.queue.schedule_in(SAMPLE_INTERVAL, Wakeup::MetricsSample);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scheduling helpers
    // ------------------------------------------------------------------

    /// Absolute-time scheduling; a target in the past is a bug.
    pub(crate) fn schedule_at(
        &mut self,
        at: SimTime,
        wakeup: Wakeup,
        node: NodeId,
    ) -> Result<(), SimError> {
        self.queue
            .schedule_at(at, wakeup)
            .map_err(|_| SimError::invariant("schedule-not-in-past", node, self.queue.now()))
    }
}
