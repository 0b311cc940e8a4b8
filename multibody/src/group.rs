use crate::{
    MultibodyErrors,
    model::{GroupDefinition, RobotModel},
};

/// A named set of joints resolved against the model tree.
#[derive(Clone, Debug, PartialEq)]
pub struct JointGroup {
    name: String,
    // all joints, depth-first tree order
    joints: Vec<String>,
    // actuated joints that are not mimics, the group's variables
    active_joints: Vec<String>,
    mimic_joints: Vec<String>,
    // joints with no ancestor joint in the group
    joint_roots: Vec<String>,
    // child links of the group's joints, same order as `joints`
    link_names: Vec<String>,
    is_chain: bool,
}

impl JointGroup {
    pub(crate) fn resolve(
        model: &RobotModel,
        definition: &GroupDefinition,
    ) -> Result<Self, MultibodyErrors> {
        if definition.joints.is_empty() {
            return Err(MultibodyErrors::EmptyGroup(definition.name.clone()));
        }
        let mut members = Vec::with_capacity(definition.joints.len());
        for name in &definition.joints {
            let index = model
                .joint_index(name)
                .ok_or_else(|| MultibodyErrors::JointNotFound(name.clone()))?;
            if !members.contains(&index) {
                members.push(index);
            }
        }
        let ordered: Vec<usize> = model
            .tree_order()
            .iter()
            .copied()
            .filter(|j| members.contains(j))
            .collect();

        let joints = model.joints();
        let roots: Vec<usize> = ordered
            .iter()
            .copied()
            .filter(|&j| !ordered.iter().any(|&other| model.is_ancestor(other, j)))
            .collect();
        let active: Vec<usize> = ordered
            .iter()
            .copied()
            .filter(|&j| joints[j].kind.is_actuated() && joints[j].mimic.is_none())
            .collect();

        let is_chain = roots.len() == 1
            && !active.is_empty()
            && ordered
                .windows(2)
                .all(|pair| model.is_ancestor(pair[0], pair[1]));

        let names = |indices: &[usize]| -> Vec<String> {
            indices.iter().map(|&j| joints[j].name.clone()).collect()
        };

        Ok(Self {
            name: definition.name.clone(),
            joints: names(&ordered),
            active_joints: names(&active),
            mimic_joints: ordered
                .iter()
                .filter(|&&j| joints[j].mimic.is_some())
                .map(|&j| joints[j].name.clone())
                .collect(),
            joint_roots: names(&roots),
            link_names: ordered.iter().map(|&j| joints[j].child.clone()).collect(),
            is_chain,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joints
    }

    pub fn active_joint_names(&self) -> &[String] {
        &self.active_joints
    }

    pub fn mimic_joint_names(&self) -> &[String] {
        &self.mimic_joints
    }

    pub fn joint_roots(&self) -> &[String] {
        &self.joint_roots
    }

    pub fn link_names(&self) -> &[String] {
        &self.link_names
    }

    /// Single root, at least one variable, and every joint the ancestor of the next.
    pub fn is_chain(&self) -> bool {
        self.is_chain
    }

    pub fn variable_count(&self) -> usize {
        self.active_joints.len()
    }
}
