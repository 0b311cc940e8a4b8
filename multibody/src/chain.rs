//! Serial chains of rigid segments extracted from a [`RobotModel`].
//!
//! A segment is a joint together with the link it moves. Segment frames are
//! the child link frames, so a segment's pose relative to its parent is
//! `origin * joint_motion(q)`.

use crate::{
    MultibodyErrors,
    model::{Joint, JointKind, RobotModel},
};
use mass_properties::MassProperties;
use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use spatial_algebra::MotionVector;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentJointKind {
    Revolute,
    Prismatic,
    Fixed,
}

impl From<JointKind> for SegmentJointKind {
    fn from(kind: JointKind) -> Self {
        match kind {
            JointKind::Revolute | JointKind::Continuous => Self::Revolute,
            JointKind::Prismatic => Self::Prismatic,
            JointKind::Fixed | JointKind::Floating | JointKind::Planar => Self::Fixed,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentJoint {
    pub name: String,
    pub kind: SegmentJointKind,
    pub axis: Unit<Vector3<f64>>,
}

impl SegmentJoint {
    pub fn from_joint(joint: &Joint) -> Self {
        let kind = SegmentJointKind::from(joint.kind);
        // fixed joints may carry any axis, it is never used
        let axis = joint.unit_axis().unwrap_or_else(Vector3::x_axis);
        Self {
            name: joint.name.clone(),
            kind,
            axis,
        }
    }

    /// Joint frame to child frame displacement at position `q`.
    pub fn transform(&self, q: f64) -> Isometry3<f64> {
        match self.kind {
            SegmentJointKind::Revolute => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&self.axis, q),
            ),
            SegmentJointKind::Prismatic => Isometry3::from_parts(
                Translation3::from(self.axis.into_inner() * q),
                UnitQuaternion::identity(),
            ),
            SegmentJointKind::Fixed => Isometry3::identity(),
        }
    }

    pub fn is_actuated(&self) -> bool {
        self.kind != SegmentJointKind::Fixed
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Name of the child link.
    pub name: String,
    pub joint: SegmentJoint,
    /// Parent link frame to joint frame at zero position.
    pub origin: Isometry3<f64>,
    /// Mass properties of the child link in its own frame.
    pub mass_properties: MassProperties,
}

impl Segment {
    /// Pose of this segment's frame in its parent's frame (parent_from_child).
    pub fn pose(&self, q: f64) -> Isometry3<f64> {
        self.origin * self.joint.transform(q)
    }

    /// The joint's motion subspace in the segment frame, `None` for fixed joints.
    pub fn motion_subspace(&self) -> Option<MotionVector> {
        let axis = self.joint.axis.into_inner();
        match self.joint.kind {
            SegmentJointKind::Revolute => Some(MotionVector::new(axis, Vector3::zeros())),
            SegmentJointKind::Prismatic => Some(MotionVector::new(Vector3::zeros(), axis)),
            SegmentJointKind::Fixed => None,
        }
    }

    pub fn is_actuated(&self) -> bool {
        self.joint.is_actuated()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chain {
    segments: Vec<Segment>,
    num_joints: usize,
}

impl Chain {
    pub fn new(segments: Vec<Segment>) -> Self {
        let num_joints = segments.iter().filter(|s| s.is_actuated()).count();
        Self {
            segments,
            num_joints,
        }
    }

    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the actuated joints, in chain order.
    pub fn joint_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter(|s| s.is_actuated())
            .map(|s| s.joint.name.as_str())
            .collect()
    }

    /// Pose of the tip frame in the base frame.
    pub fn forward_kinematics(&self, q: &[f64]) -> Result<Isometry3<f64>, MultibodyErrors> {
        if q.len() != self.num_joints {
            return Err(MultibodyErrors::SizeMismatch {
                expected: self.num_joints,
                actual: q.len(),
            });
        }
        let mut base_from_tip = Isometry3::identity();
        let mut j = 0;
        for segment in &self.segments {
            let position = if segment.is_actuated() {
                j += 1;
                q[j - 1]
            } else {
                0.0
            };
            base_from_tip *= segment.pose(position);
        }
        Ok(base_from_tip)
    }
}

impl RobotModel {
    /// Extracts the serial chain from link `base` down to link `tip`.
    pub fn chain(&self, base: &str, tip: &str) -> Result<Chain, MultibodyErrors> {
        for link in [base, tip] {
            if self.link(link).is_none() {
                return Err(MultibodyErrors::LinkNotFound(link.to_string()));
            }
        }
        let not_found = || MultibodyErrors::ChainNotFound {
            base: base.to_string(),
            tip: tip.to_string(),
        };
        if base == tip {
            return Err(not_found());
        }

        let mut joints = Vec::new();
        let mut link = tip;
        while link != base {
            let joint = self.parent_joint(link).ok_or_else(not_found)?;
            // the virtual joint hangs from a frame that is not a link
            if self.link(&joint.parent).is_none() {
                return Err(not_found());
            }
            joints.push(joint);
            link = joint.parent.as_str();
        }

        let mut segments = Vec::with_capacity(joints.len());
        for joint in joints.into_iter().rev() {
            if matches!(joint.kind, JointKind::Floating | JointKind::Planar) {
                warn!(
                    joint = joint.name.as_str(),
                    "treating {:?} joint as fixed in chain {} -> {}", joint.kind, base, tip
                );
            }
            let child = self
                .link(&joint.child)
                .ok_or_else(|| MultibodyErrors::LinkNotFound(joint.child.clone()))?;
            segments.push(Segment {
                name: child.name.clone(),
                joint: SegmentJoint::from_joint(joint),
                origin: joint.origin.isometry(),
                mass_properties: child.mass_properties()?,
            });
        }
        Ok(Chain::new(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, tests::arm_builder};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_arm_chain() {
        let model = arm_builder().build().unwrap();
        let chain = model.chain("base", "tool").unwrap();
        assert_eq!(chain.num_segments(), 3);
        assert_eq!(chain.num_joints(), 2);
        assert_eq!(chain.joint_names(), vec!["shoulder", "elbow"]);
        let names: Vec<&str> = chain.segments().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["upper_arm", "forearm", "tool"]);
        assert_eq!(chain.segments()[0].mass_properties.mass, 2.0);
        assert!(chain.segments()[2].mass_properties.is_massless());
    }

    #[test]
    fn test_partial_chain() {
        let model = arm_builder().build().unwrap();
        let chain = model.chain("upper_arm", "finger_left").unwrap();
        assert_eq!(chain.joint_names(), vec!["elbow", "finger_left_joint"]);
    }

    #[test]
    fn test_chain_requires_descendant() {
        let model = arm_builder().build().unwrap();
        assert!(matches!(
            model.chain("tool", "base"),
            Err(MultibodyErrors::ChainNotFound { .. })
        ));
        assert!(matches!(
            model.chain("finger_left", "tool"),
            Err(MultibodyErrors::ChainNotFound { .. })
        ));
        assert!(matches!(
            model.chain("tool", "tool"),
            Err(MultibodyErrors::ChainNotFound { .. })
        ));
        assert!(matches!(
            model.chain("world", "tool"),
            Err(MultibodyErrors::LinkNotFound(link)) if link == "world"
        ));
    }

    #[test]
    fn test_forward_kinematics() {
        let model = arm_builder().build().unwrap();
        let chain = model.chain("base", "tool").unwrap();

        let home = chain.forward_kinematics(&[0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(
            home.translation.vector,
            Vector3::new(0.0, 0.0, 1.6),
            epsilon = 1e-12
        );

        // rotating +y tips the arm toward +x
        let bent = chain.forward_kinematics(&[FRAC_PI_2, 0.0]).unwrap();
        assert_abs_diff_eq!(
            bent.translation.vector,
            Vector3::new(1.5, 0.0, 0.1),
            epsilon = 1e-12
        );

        assert!(matches!(
            chain.forward_kinematics(&[0.0]),
            Err(MultibodyErrors::SizeMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_prismatic_segment_pose() {
        let model = arm_builder().build().unwrap();
        let chain = model.chain("forearm", "finger_right").unwrap();
        let pose = chain.forward_kinematics(&[0.02]).unwrap();
        assert_abs_diff_eq!(
            pose.translation.vector,
            Vector3::new(0.0, -0.02, 0.0),
            epsilon = 1e-12
        );
        let subspace = chain.segments()[0].motion_subspace().unwrap();
        assert_abs_diff_eq!(*subspace.translation(), -Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_floating_joint_folded_as_fixed() {
        let mut builder = arm_builder();
        builder
            .add_link(Link::new("camera"))
            .add_joint(Joint::new("camera_mount", JointKind::Floating, "tool", "camera"));
        let model = builder.build().unwrap();
        let chain = model.chain("base", "camera").unwrap();
        assert_eq!(chain.num_segments(), 4);
        assert_eq!(chain.num_joints(), 2);
        assert!(chain.segments()[3].motion_subspace().is_none());
    }
}
