//! Inverse dynamics and payload limits for a serial joint group.
//!
//! [`DynamicsSolver`] is built once per (model, group, gravity) and queried
//! repeatedly. Construction either yields a [`ChainDynamicsSolver`] bound to
//! the group's base to tip chain, or an [`InvalidSolver`] that carries the
//! reason and rejects every query.

use multibody::{
    Chain, ChainIdSolverRne, ChainInverseDynamics, JointGroup, MultibodyErrors, RneErrors,
    RobotModel, RobotState,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use spatial_algebra::Force;
use std::{cell::RefCell, sync::Arc};
use thiserror::Error;
use tracing::{debug, error};

/// Response differences at or below this are treated as no response.
const UNIT_LOAD_EPSILON: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum ConstructionErrors {
    #[error("group '{0}' does not exist in the robot model")]
    GroupNotFound(String),
    #[error("group '{0}' is not a chain")]
    NotAChain(String),
    #[error("group '{group}' has mimic joints {joints:?}")]
    MimicJoint { group: String, joints: Vec<String> },
    #[error("group '{group}' does not have a parent link above joint '{joint}'")]
    NoParentLink { group: String, joint: String },
    #[error("could not extract a chain from '{base}' to '{tip}': {source}")]
    ChainExtraction {
        base: String,
        tip: String,
        source: MultibodyErrors,
    },
    #[error("chain joints {chain:?} do not match the variables of group '{group}'")]
    ChainGroupMismatch { group: String, chain: Vec<String> },
    #[error("gravity vector {0:?} is not finite")]
    InvalidGravity([f64; 3]),
}

#[derive(Debug, Error)]
pub enum DynamicsErrors {
    #[error("dynamics solver for group '{group}' was not constructed: {reason}")]
    InvalidSolver { group: String, reason: String },
    #[error("{input} should have {expected} entries, got {actual}")]
    InputSize {
        input: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("payload mass {0} must be finite and non-negative")]
    InvalidPayload(f64),
    #[error("something went wrong computing torques: {0}")]
    Kernel(#[from] RneErrors),
    #[error(transparent)]
    State(#[from] MultibodyErrors),
}

/// A force and a moment at a segment frame origin, in that frame.
///
/// The wrench is the load the segment exerts on its environment, which is the
/// opposite sign of a force applied to the segment. A segment holding a mass
/// `m` against gravity `-g z` therefore carries the support force `+m g z`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Wrench {
    pub force: Vector3<f64>,
    pub torque: Vector3<f64>,
}

impl Wrench {
    pub fn new(force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self { force, torque }
    }

    pub fn zeros() -> Self {
        Self::default()
    }
}

impl From<Wrench> for Force {
    fn from(wrench: Wrench) -> Force {
        Force::from_wrench(wrench.force, wrench.torque)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PayloadResult {
    /// Largest tip point mass (kg) that keeps every joint within its limit.
    pub mass: f64,
    /// The joint that reaches its limit first. `None` when no joint responds
    /// to a tip load, in which case `mass` is infinite.
    pub saturated_joint: Option<usize>,
}

/// Dynamics solver bound to a valid chain group.
///
/// Queries take `&self`; the frame lookups go through a private [`RobotState`]
/// cache, so a solver must not be shared between threads.
#[derive(Debug)]
pub struct ChainDynamicsSolver<K = ChainIdSolverRne> {
    group: JointGroup,
    base_name: String,
    tip_name: String,
    kernel: K,
    max_torques: Vec<f64>,
    gravity_norm: f64,
    state: RefCell<RobotState>,
}

impl<K: ChainInverseDynamics> ChainDynamicsSolver<K> {
    pub fn new(
        model: Arc<RobotModel>,
        group_name: &str,
        gravity: Vector3<f64>,
    ) -> Result<Self, ConstructionErrors> {
        Self::build(model, group_name, gravity)
            .inspect_err(|e| error!(group = group_name, "will not initialize dynamics solver: {e}"))
    }

    fn build(
        model: Arc<RobotModel>,
        group_name: &str,
        gravity: Vector3<f64>,
    ) -> Result<Self, ConstructionErrors> {
        let group = model
            .joint_group(group_name)
            .ok_or_else(|| ConstructionErrors::GroupNotFound(group_name.to_string()))?;
        if !group.is_chain() {
            return Err(ConstructionErrors::NotAChain(group_name.to_string()));
        }
        if !group.mimic_joint_names().is_empty() {
            return Err(ConstructionErrors::MimicJoint {
                group: group_name.to_string(),
                joints: group.mimic_joint_names().to_vec(),
            });
        }

        // a chain group has exactly one root
        let root = &group.joint_roots()[0];
        let base_name = model
            .joint(root)
            .map(|joint| joint.parent.as_str())
            .filter(|parent| model.link(parent).is_some())
            .ok_or_else(|| ConstructionErrors::NoParentLink {
                group: group_name.to_string(),
                joint: root.clone(),
            })?
            .to_string();
        let tip_name = group.link_names().last().cloned().unwrap_or_default();
        debug!("base name: '{base_name}', tip name: '{tip_name}'");

        let chain = model.chain(&base_name, &tip_name).map_err(|source| {
            ConstructionErrors::ChainExtraction {
                base: base_name.clone(),
                tip: tip_name.clone(),
                source,
            }
        })?;
        if chain.joint_names() != group.active_joint_names() {
            return Err(ConstructionErrors::ChainGroupMismatch {
                group: group_name.to_string(),
                chain: chain.joint_names().iter().map(|j| j.to_string()).collect(),
            });
        }
        if !gravity.iter().all(|g| g.is_finite()) {
            return Err(ConstructionErrors::InvalidGravity(gravity.into()));
        }

        let max_torques = chain
            .joint_names()
            .iter()
            .map(|joint| model.max_effort(joint).unwrap_or(0.0))
            .collect();
        let gravity_norm = gravity.norm();
        debug!("gravity norm set to {gravity_norm}");

        Ok(Self {
            group: group.clone(),
            base_name,
            tip_name,
            kernel: K::from_chain(chain, gravity),
            max_torques,
            gravity_norm,
            state: RefCell::new(RobotState::new(Arc::clone(&model))),
        })
    }

    pub fn group_name(&self) -> &str {
        self.group.name()
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn tip_name(&self) -> &str {
        &self.tip_name
    }

    pub fn num_joints(&self) -> usize {
        self.kernel.chain().num_joints()
    }

    pub fn num_segments(&self) -> usize {
        self.kernel.chain().num_segments()
    }

    /// Torque limits in chain order, `0.0` for joints without limits.
    pub fn max_torques(&self) -> &[f64] {
        &self.max_torques
    }

    pub fn gravity_norm(&self) -> f64 {
        self.gravity_norm
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn chain(&self) -> &Chain {
        self.kernel.chain()
    }

    fn check_size(
        input: &'static str,
        expected: usize,
        actual: usize,
    ) -> Result<(), DynamicsErrors> {
        if expected != actual {
            error!("{input} vector should be size {expected}, got {actual}");
            return Err(DynamicsErrors::InputSize {
                input,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Joint torques for the given motion and per segment wrenches.
    /// `torques` is only written on success.
    pub fn torques(
        &self,
        positions: &[f64],
        velocities: &[f64],
        accelerations: &[f64],
        wrenches: &[Wrench],
        torques: &mut [f64],
    ) -> Result<(), DynamicsErrors> {
        let nj = self.num_joints();
        Self::check_size("positions", nj, positions.len())?;
        Self::check_size("velocities", nj, velocities.len())?;
        Self::check_size("accelerations", nj, accelerations.len())?;
        Self::check_size("wrenches", self.num_segments(), wrenches.len())?;
        Self::check_size("torques", nj, torques.len())?;

        let f_ext: Vec<Force> = wrenches.iter().map(|&w| Force::from(w)).collect();
        let mut tau = vec![0.0; nj];
        self.kernel
            .joint_torques(positions, velocities, accelerations, &f_ext, &mut tau)
            .inspect_err(|e| error!("something went wrong computing torques: {e}"))?;
        torques.copy_from_slice(&tau);
        Ok(())
    }

    /// Largest tip point mass the chain can hold at `positions`.
    pub fn max_payload(&self, positions: &[f64]) -> Result<PayloadResult, DynamicsErrors> {
        let nj = self.num_joints();
        Self::check_size("positions", nj, positions.len())?;
        let zeros = vec![0.0; nj];
        let mut wrenches = vec![Wrench::zeros(); self.num_segments()];

        let mut zero_torques = vec![0.0; nj];
        self.torques(positions, &zeros, &zeros, &wrenches, &mut zero_torques)?;
        for (i, (tau, limit)) in zero_torques.iter().zip(&self.max_torques).enumerate() {
            if tau.abs() >= *limit {
                debug!(joint = i, "torque {tau} already at limit {limit} without payload");
                return Ok(PayloadResult {
                    mass: 0.0,
                    saturated_joint: Some(i),
                });
            }
        }

        if let Some(tip) = wrenches.last_mut() {
            *tip = self.tip_wrench(positions, 1.0)?;
        }
        let mut unit_torques = vec![0.0; nj];
        self.torques(positions, &zeros, &zeros, &wrenches, &mut unit_torques)?;

        let mut result = PayloadResult {
            mass: f64::INFINITY,
            saturated_joint: None,
        };
        for i in 0..nj {
            let (tau_0, limit) = (zero_torques[i], self.max_torques[i]);
            let response = unit_torques[i] - tau_0;
            debug!(
                joint = i,
                "actual torque {}, max allowed {limit}, gravity {tau_0}", unit_torques[i]
            );
            if response.abs() <= UNIT_LOAD_EPSILON {
                continue;
            }
            let payload_joint = f64::max((limit - tau_0) / response, (-limit - tau_0) / response);
            debug!(joint = i, "payload allowed (N): {payload_joint}");
            if payload_joint < result.mass {
                result.mass = payload_joint;
                result.saturated_joint = Some(i);
            }
        }
        result.mass /= self.gravity_norm;
        debug!("max payload (kg): {}", result.mass);
        Ok(result)
    }

    /// Joint torques to hold a point mass at the tip, at rest.
    pub fn payload_torques(
        &self,
        positions: &[f64],
        payload: f64,
        torques: &mut [f64],
    ) -> Result<(), DynamicsErrors> {
        let nj = self.num_joints();
        Self::check_size("positions", nj, positions.len())?;
        Self::check_size("torques", nj, torques.len())?;
        if !payload.is_finite() || payload < 0.0 {
            error!("payload mass {payload} is not valid");
            return Err(DynamicsErrors::InvalidPayload(payload));
        }
        let zeros = vec![0.0; nj];
        let mut wrenches = vec![Wrench::zeros(); self.num_segments()];
        if let Some(tip) = wrenches.last_mut() {
            *tip = self.tip_wrench(positions, payload * self.gravity_norm)?;
        }
        self.torques(positions, &zeros, &zeros, &wrenches, torques)
    }

    /// Support force of `magnitude` along the base +z axis, in the tip frame.
    fn tip_wrench(&self, positions: &[f64], magnitude: f64) -> Result<Wrench, DynamicsErrors> {
        let mut state = self.state.borrow_mut();
        state.set_joint_group_positions(&self.group, positions)?;
        let base = state.frame_transform(&self.base_name)?;
        let tip = state.frame_transform(&self.tip_name)?;
        let tip_from_base = tip.inverse() * base;
        let wrench = Wrench::new(
            tip_from_base.rotation * Vector3::new(0.0, 0.0, magnitude),
            Vector3::zeros(),
        );
        debug!(
            "new wrench (local frame): {} {} {}",
            wrench.force.x, wrench.force.y, wrench.force.z
        );
        Ok(wrench)
    }
}

/// Why a solver could not be built, kept for reporting.
#[derive(Debug)]
pub struct InvalidSolver {
    pub group: String,
    pub reason: ConstructionErrors,
}

#[derive(Debug)]
pub enum DynamicsSolver<K = ChainIdSolverRne> {
    Valid(ChainDynamicsSolver<K>),
    Invalid(InvalidSolver),
}

impl<K: ChainInverseDynamics> DynamicsSolver<K> {
    pub fn new(model: Arc<RobotModel>, group_name: &str, gravity: Vector3<f64>) -> Self {
        match ChainDynamicsSolver::new(model, group_name, gravity) {
            Ok(solver) => Self::Valid(solver),
            Err(reason) => Self::Invalid(InvalidSolver {
                group: group_name.to_string(),
                reason,
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn solver(&self) -> Result<&ChainDynamicsSolver<K>, DynamicsErrors> {
        match self {
            Self::Valid(solver) => Ok(solver),
            Self::Invalid(InvalidSolver { group, reason }) => {
                debug!(
                    "did not construct dynamics solver for '{group}' properly, check error logs"
                );
                Err(DynamicsErrors::InvalidSolver {
                    group: group.clone(),
                    reason: reason.to_string(),
                })
            }
        }
    }

    pub fn torques(
        &self,
        positions: &[f64],
        velocities: &[f64],
        accelerations: &[f64],
        wrenches: &[Wrench],
        torques: &mut [f64],
    ) -> Result<(), DynamicsErrors> {
        self.solver()?
            .torques(positions, velocities, accelerations, wrenches, torques)
    }

    pub fn max_payload(&self, positions: &[f64]) -> Result<PayloadResult, DynamicsErrors> {
        self.solver()?.max_payload(positions)
    }

    pub fn payload_torques(
        &self,
        positions: &[f64],
        payload: f64,
        torques: &mut [f64],
    ) -> Result<(), DynamicsErrors> {
        self.solver()?.payload_torques(positions, payload, torques)
    }

    pub fn max_torques(&self) -> Result<&[f64], DynamicsErrors> {
        Ok(self.solver()?.max_torques())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use mass_properties::Inertia;
    use multibody::{Inertial, Joint, JointKind, JointLimits, Link, Origin, RobotModelBuilder};
    use rand::{Rng, SeedableRng, rngs::SmallRng};
    use std::f64::consts::FRAC_PI_2;

    const G: f64 = 9.8;
    const M1: f64 = 0.4;
    const M2: f64 = 0.2;
    const L1: f64 = 1.0;
    const L2: f64 = 0.5;

    fn gravity() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -G)
    }

    /// Two revolute joints about y, point mass links centered along local z,
    /// a fixed tip frame at the end of the second link.
    fn planar_builder(limits: [f64; 2]) -> RobotModelBuilder {
        let link = |name: &str, mass: f64, length: f64| {
            Link::new(name).with_inertial(Inertial::new(
                Origin::translation(0.0, 0.0, length / 2.0),
                mass,
                Inertia::ZERO,
            ))
        };
        let mut builder = RobotModelBuilder::new("planar", "base");
        builder
            .add_link(link("link1", M1, L1))
            .add_link(link("link2", M2, L2))
            .add_link(Link::new("tip"))
            .add_joint(
                Joint::new("joint1", JointKind::Revolute, "base", "link1")
                    .with_axis([0.0, 1.0, 0.0])
                    .with_limits(JointLimits::effort(limits[0])),
            )
            .add_joint(
                Joint::new("joint2", JointKind::Revolute, "link1", "link2")
                    .with_origin(Origin::translation(0.0, 0.0, L1))
                    .with_axis([0.0, 1.0, 0.0])
                    .with_limits(JointLimits::effort(limits[1])),
            )
            .add_joint(
                Joint::new("tip_joint", JointKind::Fixed, "link2", "tip")
                    .with_origin(Origin::translation(0.0, 0.0, L2)),
            )
            .add_group("arm", &["joint1", "joint2", "tip_joint"]);
        builder
    }

    fn planar_solver(limits: [f64; 2]) -> ChainDynamicsSolver {
        let model = Arc::new(planar_builder(limits).build().unwrap());
        ChainDynamicsSolver::new(model, "arm", gravity()).unwrap()
    }

    /// Static holding torques from moment arms in the xz plane.
    fn static_torques(q: [f64; 2]) -> [f64; 2] {
        let x1 = L1 / 2.0 * q[0].sin();
        let x_elbow = L1 * q[0].sin();
        let x2 = L2 / 2.0 * (q[0] + q[1]).sin();
        [-G * (M1 * x1 + M2 * (x_elbow + x2)), -G * M2 * x2]
    }

    fn random_positions(rng: &mut SmallRng) -> [f64; 2] {
        [rng.random_range(-3.0..3.0), rng.random_range(-3.0..3.0)]
    }

    #[test]
    fn test_construction() {
        let solver = planar_solver([10.0, 10.0]);
        assert_eq!(solver.group_name(), "arm");
        assert_eq!(solver.base_name(), "base");
        assert_eq!(solver.tip_name(), "tip");
        assert_eq!(solver.num_joints(), 2);
        assert_eq!(solver.num_segments(), 3);
        assert_eq!(solver.max_torques(), [10.0, 10.0]);
        assert_abs_diff_eq!(solver.gravity_norm(), G);
        assert_eq!(solver.kernel().gravity(), &gravity());
        assert_eq!(solver.chain().joint_names(), vec!["joint1", "joint2"]);
    }

    #[test]
    fn test_static_gravity_oracle() {
        let solver = planar_solver([10.0, 10.0]);
        let wrenches = [Wrench::zeros(); 3];
        let mut tau = [0.0; 2];
        for q in [[0.0, 0.0], [FRAC_PI_2, 0.0], [0.3, 0.4], [-1.2, 2.5]] {
            solver
                .torques(&q, &[0.0; 2], &[0.0; 2], &wrenches, &mut tau)
                .unwrap();
            let expected = static_torques(q);
            assert_abs_diff_eq!(tau[0], expected[0], epsilon = 1e-10);
            assert_abs_diff_eq!(tau[1], expected[1], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_zero_gravity_rest_is_zero() {
        let model = Arc::new(planar_builder([10.0, 10.0]).build().unwrap());
        let solver: ChainDynamicsSolver =
            ChainDynamicsSolver::new(model, "arm", Vector3::zeros()).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut tau = [1.0; 2];
        for _ in 0..20 {
            let q = random_positions(&mut rng);
            solver
                .torques(&q, &[0.0; 2], &[0.0; 2], &[Wrench::zeros(); 3], &mut tau)
                .unwrap();
            assert_abs_diff_eq!(tau[0], 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(tau[1], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_input_size_leaves_output() {
        let solver = planar_solver([10.0, 10.0]);
        let mut tau = [42.0; 2];
        let result = solver.torques(&[0.0], &[0.0; 2], &[0.0; 2], &[Wrench::zeros(); 3], &mut tau);
        assert!(matches!(
            result,
            Err(DynamicsErrors::InputSize {
                input: "positions",
                expected: 2,
                actual: 1
            })
        ));
        let wrenches = [Wrench::zeros(); 2];
        let result = solver.torques(&[0.0; 2], &[0.0; 2], &[0.0; 2], &wrenches, &mut tau);
        assert!(matches!(
            result,
            Err(DynamicsErrors::InputSize { input: "wrenches", expected: 3, .. })
        ));
        let mut short = [42.0];
        let wrenches = [Wrench::zeros(); 3];
        let result = solver.torques(&[0.0; 2], &[0.0; 2], &[0.0; 2], &wrenches, &mut short);
        assert!(matches!(result, Err(DynamicsErrors::InputSize { input: "torques", .. })));
        assert_eq!(tau, [42.0; 2]);
        assert_eq!(short, [42.0]);
        assert!(matches!(
            solver.max_payload(&[0.0; 3]),
            Err(DynamicsErrors::InputSize { input: "positions", .. })
        ));
    }

    #[test]
    fn test_max_payload_oracle() {
        let solver = planar_solver([10.0, 10.0]);
        let q = [FRAC_PI_2, 0.0];
        let tau_0 = static_torques(q);
        // a unit support force at the tip holds the arm up by its lever arm
        let per_joint = [(10.0 + tau_0[0]) / (L1 + L2), (10.0 + tau_0[1]) / L2];
        let result = solver.max_payload(&q).unwrap();
        assert_eq!(result.saturated_joint, Some(0));
        assert_abs_diff_eq!(result.mass, per_joint[0].min(per_joint[1]) / G, epsilon = 1e-10);
    }

    #[test]
    fn test_payload_torques_match_point_mass() {
        let solver = planar_solver([10.0, 10.0]);
        let q = [0.3, 0.4];
        let mass = 0.7;
        let mut tau = [0.0; 2];
        solver.payload_torques(&q, mass, &mut tau).unwrap();
        let tau_0 = static_torques(q);
        let x_tip = L1 * q[0].sin() + L2 * (q[0] + q[1]).sin();
        let x_tip_from_elbow = L2 * (q[0] + q[1]).sin();
        assert_abs_diff_eq!(tau[0], tau_0[0] - G * mass * x_tip, epsilon = 1e-10);
        assert_abs_diff_eq!(tau[1], tau_0[1] - G * mass * x_tip_from_elbow, epsilon = 1e-10);
    }

    #[test]
    fn test_payload_round_trip() {
        let solver = planar_solver([10.0, 6.0]);
        let mut rng = SmallRng::seed_from_u64(11);
        let mut tau = [0.0; 2];
        for _ in 0..50 {
            let q = random_positions(&mut rng);
            let result = solver.max_payload(&q).unwrap();
            let Some(joint) = result.saturated_joint else {
                continue;
            };
            if result.mass == 0.0 {
                continue;
            }
            solver.payload_torques(&q, result.mass, &mut tau).unwrap();
            let limits = solver.max_torques();
            assert_abs_diff_eq!(tau[joint].abs(), limits[joint], epsilon = 1e-8);
            for (t, limit) in tau.iter().zip(limits) {
                assert!(t.abs() <= limit + 1e-8, "{t} exceeds {limit} at {q:?}");
            }
        }
    }

    #[test]
    fn test_max_payload_monotonic_in_limits() {
        let full = planar_solver([10.0, 6.0]);
        let lowered = [planar_solver([7.0, 6.0]), planar_solver([10.0, 3.0])];
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..50 {
            let q = random_positions(&mut rng);
            let reference = full.max_payload(&q).unwrap().mass;
            for solver in &lowered {
                let mass = solver.max_payload(&q).unwrap().mass;
                assert!(mass <= reference + 1e-12, "{mass} > {reference} at {q:?}");
            }
        }
    }

    #[test]
    fn test_saturated_without_payload() {
        // the horizontal arm needs more than 2 N*m at the first joint
        let solver = planar_solver([2.0, 10.0]);
        let result = solver.max_payload(&[FRAC_PI_2, 0.0]).unwrap();
        assert_eq!(
            result,
            PayloadResult {
                mass: 0.0,
                saturated_joint: Some(0)
            }
        );
    }

    #[test]
    fn test_missing_limit_is_zero_capacity() {
        let mut builder = planar_builder([10.0, 10.0]);
        builder.joints[1].limits = None;
        let solver: ChainDynamicsSolver =
            ChainDynamicsSolver::new(Arc::new(builder.build().unwrap()), "arm", gravity()).unwrap();
        assert_eq!(solver.max_torques(), [10.0, 0.0]);
        // even upright, |0| >= 0 saturates the second joint
        let result = solver.max_payload(&[0.0, 0.0]).unwrap();
        assert_eq!(result.mass, 0.0);
        assert_eq!(result.saturated_joint, Some(1));
    }

    #[test]
    fn test_invalid_effort_rejected_before_solver() {
        for effort in [f64::NAN, -10.0] {
            assert!(matches!(
                planar_builder([effort, 10.0]).build(),
                Err(MultibodyErrors::InvalidEffort(joint)) if joint == "joint1"
            ));
        }
    }

    #[test]
    fn test_unlimited_joint_never_binds() {
        let solver = planar_solver([f64::INFINITY, 6.0]);
        let q = [FRAC_PI_2, 0.0];
        let result = solver.max_payload(&q).unwrap();
        assert_eq!(result.saturated_joint, Some(1));
        let tau_0 = static_torques(q);
        assert_abs_diff_eq!(result.mass, (6.0 + tau_0[1]) / L2 / G, epsilon = 1e-10);
    }

    #[test]
    fn test_support_wrench_holds_mass() {
        let solver = planar_solver([10.0, 10.0]);
        let q: [f64; 2] = [0.3, 0.4];
        let mass = 0.7;
        // base +z seen from the tip frame, which is rotated about y by q1 + q2
        let theta = q[0] + q[1];
        let support = Vector3::new(-theta.sin(), 0.0, theta.cos()) * mass * G;
        let mut wrenches = [Wrench::zeros(); 3];
        wrenches[2] = Wrench::new(support, Vector3::zeros());

        let mut held = [0.0; 2];
        solver
            .torques(&q, &[0.0; 2], &[0.0; 2], &wrenches, &mut held)
            .unwrap();
        let mut expected = [0.0; 2];
        solver.payload_torques(&q, mass, &mut expected).unwrap();
        assert_abs_diff_eq!(held[0], expected[0], epsilon = 1e-10);
        assert_abs_diff_eq!(held[1], expected[1], epsilon = 1e-10);

        // the mass pulls the arm further down its gravity torque
        let tau_0 = static_torques(q);
        let x_tip = L1 * q[0].sin() + L2 * theta.sin();
        assert_abs_diff_eq!(held[0], tau_0[0] - G * mass * x_tip, epsilon = 1e-10);
    }

    #[test]
    fn test_unresponsive_joints_are_excluded() {
        let solver = planar_solver([10.0, 10.0]);
        // upright, a vertical load passes through both joint axes
        let result = solver.max_payload(&[0.0, 0.0]).unwrap();
        assert_eq!(result.saturated_joint, None);
        assert!(result.mass.is_infinite());

        // only the elbow is upright relative to the load: the shoulder binds
        let result = solver.max_payload(&[FRAC_PI_2, -FRAC_PI_2]).unwrap();
        assert_eq!(result.saturated_joint, Some(0));
        assert!(result.mass.is_finite());
    }

    #[test]
    fn test_invalid_payload_mass() {
        let solver = planar_solver([10.0, 10.0]);
        let mut tau = [3.0; 2];
        for mass in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                solver.payload_torques(&[0.0; 2], mass, &mut tau),
                Err(DynamicsErrors::InvalidPayload(_))
            ));
        }
        assert_eq!(tau, [3.0; 2]);
    }

    fn arm_model() -> Arc<RobotModel> {
        let mut builder = planar_builder([10.0, 10.0]);
        builder
            .with_virtual_joint("world_joint", JointKind::Fixed, "world")
            .add_link(Link::new("jaw"))
            .add_joint(
                Joint::new("jaw_joint", JointKind::Prismatic, "link2", "jaw")
                    .with_axis([1.0, 0.0, 0.0])
                    .with_limits(JointLimits::effort(5.0))
                    .with_mimic("joint2", 0.1, 0.0),
            )
            .add_group("branched", &["joint2", "tip_joint", "jaw_joint"])
            .add_group("coupled", &["joint2", "jaw_joint"])
            .add_group("from_world", &["world_joint", "joint1", "joint2"])
            .add_group("skipping", &["joint1", "tip_joint"])
            .add_group("fixed", &["tip_joint"]);
        Arc::new(builder.build().unwrap())
    }

    fn rejection(group: &str) -> ConstructionErrors {
        match ChainDynamicsSolver::<ChainIdSolverRne>::new(arm_model(), group, gravity()) {
            Ok(_) => panic!("group '{group}' should be rejected"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_construction_rejections() {
        assert!(matches!(rejection("missing"), ConstructionErrors::GroupNotFound(_)));
        assert!(matches!(rejection("branched"), ConstructionErrors::NotAChain(_)));
        assert!(matches!(rejection("fixed"), ConstructionErrors::NotAChain(_)));
        assert!(matches!(
            rejection("coupled"),
            ConstructionErrors::MimicJoint { joints, .. } if joints == ["jaw_joint"]
        ));
        assert!(matches!(
            rejection("from_world"),
            ConstructionErrors::NoParentLink { joint, .. } if joint == "world_joint"
        ));
        assert!(matches!(
            rejection("skipping"),
            ConstructionErrors::ChainGroupMismatch { chain, .. } if chain == ["joint1", "joint2"]
        ));
        assert!(matches!(
            ChainDynamicsSolver::<ChainIdSolverRne>::new(
                arm_model(),
                "arm",
                Vector3::new(0.0, f64::NAN, -G)
            ),
            Err(ConstructionErrors::InvalidGravity(_))
        ));
    }

    #[test]
    fn test_invalid_solver_rejects_queries() {
        let solver: DynamicsSolver = DynamicsSolver::new(arm_model(), "missing", gravity());
        assert!(!solver.is_valid());
        let mut tau = [5.0; 2];
        assert!(matches!(
            solver.torques(&[0.0; 2], &[0.0; 2], &[0.0; 2], &[Wrench::zeros(); 3], &mut tau),
            Err(DynamicsErrors::InvalidSolver { group, .. }) if group == "missing"
        ));
        assert!(matches!(
            solver.max_payload(&[0.0; 2]),
            Err(DynamicsErrors::InvalidSolver { .. })
        ));
        assert!(matches!(
            solver.payload_torques(&[0.0; 2], 1.0, &mut tau),
            Err(DynamicsErrors::InvalidSolver { .. })
        ));
        assert!(solver.max_torques().is_err());
        assert_eq!(tau, [5.0; 2]);

        let solver: DynamicsSolver = DynamicsSolver::new(arm_model(), "arm", gravity());
        assert!(solver.is_valid());
        assert_eq!(solver.max_torques().unwrap(), [10.0, 10.0]);
    }

    /// A kernel that always reports a numerical failure.
    struct FailingKernel {
        chain: Chain,
        gravity: Vector3<f64>,
    }

    impl ChainInverseDynamics for FailingKernel {
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
            _q: &[f64],
            _q_dot: &[f64],
            _q_ddot: &[f64],
            _f_ext: &[Force],
            _torques: &mut [f64],
        ) -> Result<(), RneErrors> {
            Err(RneErrors::NonFiniteTorque(1))
        }
    }

    #[test]
    fn test_kernel_failure_surfaces() {
        let model = Arc::new(planar_builder([10.0, 10.0]).build().unwrap());
        let solver: DynamicsSolver<FailingKernel> = DynamicsSolver::new(model, "arm", gravity());
        let mut tau = [9.0; 2];
        assert!(matches!(
            solver.torques(&[0.0; 2], &[0.0; 2], &[0.0; 2], &[Wrench::zeros(); 3], &mut tau),
            Err(DynamicsErrors::Kernel(RneErrors::NonFiniteTorque(1)))
        ));
        assert!(matches!(
            solver.max_payload(&[0.0; 2]),
            Err(DynamicsErrors::Kernel(_))
        ));
        assert_eq!(tau, [9.0; 2]);
    }

    #[test]
    fn test_sample_model() {
        let path =
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/two_link_arm.ron");
        let model = Arc::new(RobotModel::load(&path).unwrap());
        let g = Vector3::new(0.0, 0.0, -9.81);

        let arm: DynamicsSolver = DynamicsSolver::new(Arc::clone(&model), "arm", g);
        let solver = arm.solver().unwrap();
        assert_eq!(solver.base_name(), "base");
        assert_eq!(solver.tip_name(), "tool");
        assert_eq!(solver.max_torques(), [40.0, 15.0]);
        let result = solver.max_payload(&[1.0, 0.5]).unwrap();
        assert!(result.mass > 0.0 && result.mass.is_finite());

        let gripper: DynamicsSolver = DynamicsSolver::new(model, "gripper", g);
        assert!(matches!(
            gripper,
            DynamicsSolver::Invalid(InvalidSolver {
                reason: ConstructionErrors::NotAChain(_),
                ..
            })
        ));
    }

    #[test]
    fn test_wrench_serde() {
        let wrench = Wrench::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.0, -1.0, 0.5));
        let text = ron::to_string(&wrench).unwrap();
        let back: Wrench = ron::from_str(&text).unwrap();
        assert_eq!(back, wrench);
    }
}
