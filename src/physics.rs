//! Boundary to the rigid-body simulation, plus a small reference world.
//!
//! The controller only ever talks to a [`Physics`] implementation through a [`BodyHandle`]; it
//! never owns the body itself.

use super::{config::WorldConfig, Orientation, Point, Vector};
use nalgebra as na;

/// Index of a body inside a [`Physics`] world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub usize);

/// Instantaneous state of a body as reported by the physics world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawKinematics {
    pub position: Point,
    pub orientation: Orientation,
    pub linear_velocity: Vector,
    pub angular_velocity: Vector,
}

impl RawKinematics {
    /// A body at rest at `position`, level with the world axes.
    pub fn at_rest(position: Point) -> Self {
        RawKinematics {
            position,
            orientation: Orientation::identity(),
            linear_velocity: Vector::zeros(),
            angular_velocity: Vector::zeros(),
        }
    }

    /// Whether every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|x| x.is_finite())
            && self.orientation.coords.iter().all(|x| x.is_finite())
            && self.linear_velocity.iter().all(|x| x.is_finite())
            && self.angular_velocity.iter().all(|x| x.is_finite())
    }
}

/// Provides the operations the controller needs from a rigid-body simulation.
pub trait Physics {
    /// Returns the current state of a body.
    fn kinematics(&self, body: BodyHandle) -> RawKinematics;
    /// Overwrites the state of a body; used when respawning.
    fn set_kinematics(&mut self, body: BodyHandle, kinematics: RawKinematics);
    /// Applies a force, given in the body's local frame, at a point in the body's local frame.
    ///
    /// Forces accumulate until the next [`step`](Physics::step).
    fn apply_local_force(&mut self, body: BodyHandle, force: Vector, point: Vector);
    /// Advances the whole world by `dt` seconds.
    fn step(&mut self, dt: f64);
}

/// A single rigid body with a diagonal inertia tensor.
#[derive(Debug, Clone)]
pub struct RigidBody {
    kinematics: RawKinematics,
    inv_mass: f64,
    /// Inverse of the principal moments of inertia, in the local frame.
    inv_inertia: Vector,
    /// Lowest extent of the body below its center, for ground contact.
    radius: f64,
    force: Vector,
    torque: Vector,
}

impl RigidBody {
    /// Constructs a body at the origin, using the inertia of a solid box with the given
    /// half-extents.
    pub fn new(mass: f64, half_extents: Vector, radius: f64) -> Self {
        let size = half_extents * 2.0;
        let sq = size.component_mul(&size);
        let inertia = Vector::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 12.0);
        RigidBody {
            kinematics: RawKinematics::at_rest(Point::origin()),
            inv_mass: 1.0 / mass,
            inv_inertia: inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 }),
            radius,
            force: Vector::zeros(),
            torque: Vector::zeros(),
        }
    }

    /// Angular acceleration from the accumulated torque, using the world-frame inertia.
    fn angular_acceleration(&self) -> Vector {
        let rot = self.kinematics.orientation.to_rotation_matrix();
        let r = rot.matrix();
        let inv_world = r * na::Matrix3::from_diagonal(&self.inv_inertia) * r.transpose();
        inv_world * self.torque
    }
}

/// A minimal world: gravity, an optional ground plane and semi-implicit Euler integration.
#[derive(Debug, Clone)]
pub struct World {
    bodies: Vec<RigidBody>,
    gravity: Vector,
    ground_height: Option<f64>,
    restitution: f64,
    ground_friction: f64,
}

impl World {
    /// Constructs an empty world.
    pub fn new(config: &WorldConfig) -> Self {
        World {
            bodies: Vec::new(),
            gravity: Vector::from(config.gravity),
            ground_height: config.ground_height,
            restitution: config.restitution,
            ground_friction: config.ground_friction,
        }
    }

    /// Adds a body and returns its handle.
    pub fn add_body(&mut self, body: RigidBody) -> BodyHandle {
        self.bodies.push(body);
        BodyHandle(self.bodies.len() - 1)
    }

    /// Keeps a body above the ground plane, bouncing it with the configured restitution.
    fn resolve_ground(&self, body: &mut RigidBody) {
        let ground = match self.ground_height {
            Some(h) => h,
            None => return,
        };
        let floor = ground + body.radius;
        let kin = &mut body.kinematics;
        if kin.position.y < floor {
            kin.position.y = floor;
            if kin.linear_velocity.y < 0.0 {
                kin.linear_velocity.y *= -self.restitution;
            }
            kin.linear_velocity.x *= self.ground_friction;
            kin.linear_velocity.z *= self.ground_friction;
            kin.angular_velocity *= self.ground_friction;
        }
    }
}

impl Physics for World {
    fn kinematics(&self, body: BodyHandle) -> RawKinematics {
        self.bodies[body.0].kinematics
    }

    fn set_kinematics(&mut self, body: BodyHandle, kinematics: RawKinematics) {
        let b = &mut self.bodies[body.0];
        b.kinematics = kinematics;
        b.force = Vector::zeros();
        b.torque = Vector::zeros();
    }

    fn apply_local_force(&mut self, body: BodyHandle, force: Vector, point: Vector) {
        let b = &mut self.bodies[body.0];
        let rot = b.kinematics.orientation;
        let world_force = rot * force;
        let world_point = rot * point;
        b.force += world_force;
        b.torque += world_point.cross(&world_force);
    }

    fn step(&mut self, dt: f64) {
        let mut bodies = std::mem::take(&mut self.bodies);
        for body in bodies.iter_mut() {
            let accel = body.force * body.inv_mass + self.gravity;
            let ang_accel = body.angular_acceleration();
            let kin = &mut body.kinematics;
            kin.linear_velocity += accel * dt;
            kin.angular_velocity += ang_accel * dt;
            kin.position += kin.linear_velocity * dt;

            let w = kin.angular_velocity;
            let spin = na::Quaternion::new(0.0, w.x, w.y, w.z) * kin.orientation.into_inner();
            let q = kin.orientation.into_inner() + spin * (0.5 * dt);
            kin.orientation = Orientation::from_quaternion(q);

            body.force = Vector::zeros();
            body.torque = Vector::zeros();
            self.resolve_ground(body);
        }
        self.bodies = bodies;
    }
}
