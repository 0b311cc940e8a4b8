use crate::chain::{Chain, Segment};
use nalgebra::Vector3;
use spatial_algebra::{Acceleration, Force, SpatialInertia, SpatialTransform, Velocity};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum RneErrors {
    #[error("{input} has {actual} entries, the chain expects {expected}")]
    SizeMismatch {
        input: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("torque at joint {0} is not finite")]
    NonFiniteTorque(usize),
}

/// Per segment quantities, all in the segment frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct RneCache {
    pub v: Velocity,
    pub a: Acceleration,
    pub f: Force,
    pub parent_from_child: SpatialTransform,
}

pub trait RecursiveNewtonEuler {
    /// Outward pass: velocity, acceleration and net force of the segment.
    fn rne_first_pass(
        &self,
        cache: &mut RneCache,
        v_parent: Velocity,
        a_parent: Acceleration,
        joint: (f64, f64, f64),
        f_ext: Force,
    );
    /// Inward pass: joint torque from the accumulated segment force.
    fn rne_second_pass(&self, cache: &RneCache) -> Option<f64>;
    /// The segment force expressed in the parent frame.
    fn rne_get_force(&self, cache: &RneCache) -> Force;
}

impl RecursiveNewtonEuler for Segment {
    fn rne_first_pass(
        &self,
        cache: &mut RneCache,
        v_parent: Velocity,
        a_parent: Acceleration,
        (q, q_dot, q_ddot): (f64, f64, f64),
        f_ext: Force,
    ) {
        let parent_from_child = SpatialTransform::from(self.pose(q));
        let child_from_parent = parent_from_child.inv();
        let inertia = SpatialInertia::from(self.mass_properties);

        let (v, a) = match self.motion_subspace() {
            Some(s) => {
                let vj = Velocity::from(s * q_dot);
                let v = child_from_parent * v_parent + vj;
                let a = child_from_parent * a_parent
                    + Acceleration::from(s * q_ddot)
                    + v.cross_motion(vj);
                (v, a)
            }
            None => (child_from_parent * v_parent, child_from_parent * a_parent),
        };

        cache.v = v;
        cache.a = a;
        cache.f = inertia * a + v.cross_force(inertia * v) + f_ext;
        cache.parent_from_child = parent_from_child;
    }

    fn rne_second_pass(&self, cache: &RneCache) -> Option<f64> {
        self.motion_subspace()
            .map(|s| s.dot(cache.f.force_vector()))
    }

    fn rne_get_force(&self, cache: &RneCache) -> Force {
        cache.parent_from_child * cache.f
    }
}

/// Inverse dynamics of an unbranched chain. Trees need a different
/// propagation and do not implement this.
pub trait ChainInverseDynamics {
    fn from_chain(chain: Chain, gravity: Vector3<f64>) -> Self
    where
        Self: Sized;
    fn chain(&self) -> &Chain;
    fn gravity(&self) -> &Vector3<f64>;
    /// Writes the torque of each actuated joint into `torques`.
    ///
    /// `f_ext` holds one wrench per segment, in the segment frame at its
    /// origin, being the wrench the segment exerts on its environment.
    fn joint_torques(
        &self,
        q: &[f64],
        q_dot: &[f64],
        q_ddot: &[f64],
        f_ext: &[Force],
        torques: &mut [f64],
    ) -> Result<(), RneErrors>;
}

/// Two pass recursive Newton-Euler over a [`Chain`].
#[derive(Clone, Debug)]
pub struct ChainIdSolverRne {
    chain: Chain,
    gravity: Vector3<f64>,
}

impl ChainIdSolverRne {
    fn check(input: &'static str, expected: usize, actual: usize) -> Result<(), RneErrors> {
        if expected != actual {
            return Err(RneErrors::SizeMismatch {
                input,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl ChainInverseDynamics for ChainIdSolverRne {
    fn from_chain(chain: Chain, gravity: Vector3<f64>) -> Self {
        Self { chain, gravity }
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }

    fn joint_torques(
        &self,
        q: &[f64],
        q_dot: &[f64],
        q_ddot: &[f64],
        f_ext: &[Force],
        torques: &mut [f64],
    ) -> Result<(), RneErrors> {
        let nj = self.chain.num_joints();
        let ns = self.chain.num_segments();
        Self::check("q", nj, q.len())?;
        Self::check("q_dot", nj, q_dot.len())?;
        Self::check("q_ddot", nj, q_ddot.len())?;
        Self::check("f_ext", ns, f_ext.len())?;
        Self::check("torques", nj, torques.len())?;

        let segments = self.chain.segments();
        let mut caches = vec![RneCache::default(); ns];

        // the base accelerates upward to stand in for gravity
        let mut v_parent = Velocity::zeros();
        let mut a_parent = Acceleration::linear(-self.gravity);
        let mut j = 0;
        for (i, segment) in segments.iter().enumerate() {
            let joint = if segment.is_actuated() {
                j += 1;
                (q[j - 1], q_dot[j - 1], q_ddot[j - 1])
            } else {
                (0.0, 0.0, 0.0)
            };
            segment.rne_first_pass(&mut caches[i], v_parent, a_parent, joint, f_ext[i]);
            v_parent = caches[i].v;
            a_parent = caches[i].a;
        }

        let mut tau = vec![0.0; nj];
        for i in (0..ns).rev() {
            let segment = &segments[i];
            if let Some(t) = segment.rne_second_pass(&caches[i]) {
                j -= 1;
                if !t.is_finite() {
                    return Err(RneErrors::NonFiniteTorque(j));
                }
                tau[j] = t;
            }
            if i > 0 {
                let f = segment.rne_get_force(&caches[i]);
                caches[i - 1].f += f;
            }
        }

        torques.copy_from_slice(&tau);
        Ok(())
    }
}
