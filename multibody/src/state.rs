use crate::{MultibodyErrors, chain::SegmentJoint, group::JointGroup, model::RobotModel};
use nalgebra::Isometry3;
use std::sync::Arc;

/// Joint positions of a whole robot plus the link poses they produce.
///
/// Link poses are relative to the world frame of the virtual joint, or to the
/// root link when the model has none. They are recomputed lazily on the first
/// lookup after a position change.
#[derive(Clone, Debug)]
pub struct RobotState {
    model: Arc<RobotModel>,
    // indexed like model.joints()
    positions: Vec<f64>,
    // indexed like model.links()
    link_transforms: Vec<Isometry3<f64>>,
    dirty: bool,
}

impl RobotState {
    pub fn new(model: Arc<RobotModel>) -> Self {
        let positions = model.joints().iter().map(|j| j.default_position()).collect();
        let link_transforms = vec![Isometry3::identity(); model.links().len()];
        let mut state = Self {
            model,
            positions,
            link_transforms,
            dirty: true,
        };
        state.update_mimic_joints();
        state
    }

    pub fn model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    /// Sets the group's active joints, in the group's order. Mimic joints follow.
    pub fn set_joint_group_positions(
        &mut self,
        group: &JointGroup,
        values: &[f64],
    ) -> Result<(), MultibodyErrors> {
        let names = group.active_joint_names();
        if values.len() != names.len() {
            return Err(MultibodyErrors::GroupSizeMismatch {
                group: group.name().to_string(),
                expected: names.len(),
                actual: values.len(),
            });
        }
        // check everything before writing anything
        let mut indices = Vec::with_capacity(names.len());
        for (name, value) in names.iter().zip(values) {
            indices.push(self.settable_index(name, *value)?);
        }
        for (i, value) in indices.into_iter().zip(values) {
            self.positions[i] = *value;
        }
        self.update_mimic_joints();
        self.dirty = true;
        Ok(())
    }

    pub fn joint_position(&self, joint: &str) -> Result<f64, MultibodyErrors> {
        self.model
            .joint_index(joint)
            .map(|i| self.positions[i])
            .ok_or_else(|| MultibodyErrors::JointNotFound(joint.to_string()))
    }

    /// Pose of `link` in the reference frame.
    pub fn frame_transform(&mut self, link: &str) -> Result<Isometry3<f64>, MultibodyErrors> {
        let index = self
            .model
            .link_index(link)
            .ok_or_else(|| MultibodyErrors::LinkNotFound(link.to_string()))?;
        if self.dirty {
            self.update_link_transforms();
        }
        Ok(self.link_transforms[index])
    }

    fn settable_index(&self, name: &str, value: f64) -> Result<usize, MultibodyErrors> {
        let i = self
            .model
            .joint_index(name)
            .ok_or_else(|| MultibodyErrors::JointNotFound(name.to_string()))?;
        let joint = &self.model.joints()[i];
        if joint.mimic.is_some() {
            return Err(MultibodyErrors::MimicNotSettable(name.to_string()));
        }
        if !joint.kind.is_actuated() {
            return Err(MultibodyErrors::JointNotActuated(name.to_string()));
        }
        if !value.is_finite() {
            return Err(MultibodyErrors::NonFiniteValue(name.to_string()));
        }
        Ok(i)
    }

    fn update_mimic_joints(&mut self) {
        let model = Arc::clone(&self.model);
        for (i, joint) in model.joints().iter().enumerate() {
            let Some(mimic) = &joint.mimic else {
                continue;
            };
            if let Some(target) = model.joint_index(&mimic.joint) {
                self.positions[i] = mimic.multiplier * self.positions[target] + mimic.offset;
            }
        }
    }

    fn update_link_transforms(&mut self) {
        let model = Arc::clone(&self.model);
        self.link_transforms.fill(Isometry3::identity());
        for &j in model.tree_order() {
            let joint = &model.joints()[j];
            let parent = model
                .link_index(&joint.parent)
                .map(|p| self.link_transforms[p])
                .unwrap_or_else(Isometry3::identity);
            let motion = SegmentJoint::from_joint(joint).transform(self.positions[j]);
            if let Some(child) = model.link_index(&joint.child) {
                self.link_transforms[child] = parent * joint.origin.isometry() * motion;
            }
        }
        self.dirty = false;
    }
}
