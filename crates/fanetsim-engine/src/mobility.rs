//! Mobility models.
//!
//! Every model produces a sequence of small position steps separated by a
//! fixed virtual-time delay and clipped to the bounding box. Models are a
//! closed variant set dispatched by match; a follower references its
//! leader by id, never by handle, and the simulator resolves the leader's
//! position before stepping.
//!
//! A node's mobility can be swapped mid-run: the node's mobility epoch is
//! bumped, stale step wakeups are discarded on dispatch, and the new model
//! becomes the sole author of the node's coordinates.

use fanetsim_common::{BoundingBox, NodeId, Point3, SimTime};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Gauss-Markov velocity memory factor.
const GAUSS_MARKOV_ALPHA: f64 = 0.85;
/// Standard deviation of the per-axis Gauss-Markov perturbation, m/s.
const GAUSS_MARKOV_SIGMA: f64 = 1.0;

/// Outcome of one mobility step.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub position: Point3,
    /// Delay until the model wants its next step; pauses stretch it.
    pub next_in: SimTime,
}

/// 3D random waypoint: travel to a uniform waypoint at the node's scalar
/// speed, pause up to a second on arrival, repeat.
#[derive(Debug, Clone)]
pub struct RandomWaypoint3D {
    waypoint: Option<Point3>,
}

impl RandomWaypoint3D {
    pub fn new() -> Self {
        RandomWaypoint3D { waypoint: None }
    }

    fn step(
        &mut self,
        position: Point3,
        speed: f64,
        bbox: &BoundingBox,
        dt: SimTime,
        rng: &mut ChaCha8Rng,
    ) -> Step {
        let waypoint = *self.waypoint.get_or_insert_with(|| {
            Point3::new(
                rng.gen_range(0.0..=bbox.length),
                rng.gen_range(0.0..=bbox.width),
                rng.gen_range(0.0..=bbox.height),
            )
        });

        let max_step = speed * dt.as_secs_f64();
        let (next, arrived) = position.step_toward(&waypoint, max_step);
        if arrived {
            self.waypoint = None;
            let pause = SimTime::from_micros(rng.gen_range(0..=1_000_000u64));
            Step {
                position: bbox.clamp(next),
                next_in: dt + pause,
            }
        } else {
            Step {
                position: bbox.clamp(next),
                next_in: dt,
            }
        }
    }
}

impl Default for RandomWaypoint3D {
    fn default() -> Self {
        Self::new()
    }
}

/// Follows `leader_position + offset` with a bounded step per tick.
#[derive(Debug, Clone)]
pub struct LeaderFollower {
    pub leader: NodeId,
    pub offset: Point3,
}

impl LeaderFollower {
    pub fn new(leader: NodeId, offset: Point3) -> Self {
        LeaderFollower { leader, offset }
    }

    /// The point this follower is converging to.
    pub fn target_position(&self, leader_position: Point3) -> Point3 {
        leader_position.offset(&self.offset)
    }

    fn step(
        &mut self,
        position: Point3,
        speed: f64,
        bbox: &BoundingBox,
        dt: SimTime,
        leader_position: Point3,
    ) -> Step {
        let target = self.target_position(leader_position);
        let max_step = speed * dt.as_secs_f64();
        let (next, _) = position.step_toward(&target, max_step);
        Step {
            position: bbox.clamp(next),
            next_in: dt,
        }
    }
}

/// Gauss-Markov 3D: per-axis AR(1) velocity with memory `alpha`, mean
/// magnitude pinned to the node's scalar speed along a drifting heading.
#[derive(Debug, Clone)]
pub struct GaussMarkov3D {
    velocity: Point3,
}

impl GaussMarkov3D {
    pub fn new() -> Self {
        GaussMarkov3D {
            velocity: Point3::default(),
        }
    }

    fn step(
        &mut self,
        position: Point3,
        speed: f64,
        bbox: &BoundingBox,
        dt: SimTime,
        rng: &mut ChaCha8Rng,
    ) -> Step {
        let normal = Normal::new(0.0, GAUSS_MARKOV_SIGMA).expect("valid sigma");
        let a = GAUSS_MARKOV_ALPHA;
        let drift = (1.0 - a * a).sqrt();
        // Mean velocity splits the scalar speed evenly across axes.
        let mean = speed / 3f64.sqrt();
        let next_axis = |v: f64, rng: &mut ChaCha8Rng| {
            a * v + (1.0 - a) * mean + drift * normal.sample(rng)
        };
        self.velocity = Point3::new(
            next_axis(self.velocity.x, rng),
            next_axis(self.velocity.y, rng),
            next_axis(self.velocity.z, rng),
        );

        let dt_s = dt.as_secs_f64();
        let next = Point3::new(
            position.x + self.velocity.x * dt_s,
            position.y + self.velocity.y * dt_s,
            position.z + self.velocity.z * dt_s,
        );
        Step {
            position: bbox.clamp(next),
            next_in: dt,
        }
    }
}

impl Default for GaussMarkov3D {
    fn default() -> Self {
        Self::new()
    }
}

/// The closed set of mobility models.
#[derive(Debug, Clone)]
pub enum MobilityModel {
    RandomWaypoint3D(RandomWaypoint3D),
    LeaderFollower(LeaderFollower),
    GaussMarkov3D(GaussMarkov3D),
}

impl MobilityModel {
    /// The leader this model tracks, if any; the simulator resolves it to
    /// a position before calling [`MobilityModel::step`].
    pub fn leader_id(&self) -> Option<NodeId> {
        match self {
            MobilityModel::LeaderFollower(f) => Some(f.leader),
            _ => None,
        }
    }

    pub fn step(
        &mut self,
        position: Point3,
        speed: f64,
        bbox: &BoundingBox,
        dt: SimTime,
        rng: &mut ChaCha8Rng,
        leader_position: Option<Point3>,
    ) -> Step {
        match self {
            MobilityModel::RandomWaypoint3D(m) => m.step(position, speed, bbox, dt, rng),
            MobilityModel::LeaderFollower(m) => {
                let leader = leader_position.unwrap_or(position);
                m.step(position, speed, bbox, dt, leader)
            }
            MobilityModel::GaussMarkov3D(m) => m.step(position, speed, bbox, dt, rng),
        }
    }
}
