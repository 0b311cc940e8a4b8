//! Robot description: links, joints, limits and named joint groups.
//!
//! A [`RobotModelBuilder`] is the serializable description (it is what lives in
//! a `.ron` file). [`RobotModelBuilder::build`] validates it into a
//! [`RobotModel`], a tree rooted at `root_link` with lookup tables for the
//! parent/child relations the chain and state code walk.
//!
//! The root link may hang from an optional virtual joint whose parent is a
//! world frame rather than a link. Groups that start at the virtual joint have
//! no parent link to anchor a dynamics chain on.

use crate::{MultibodyErrors, group::JointGroup};
use mass_properties::{CenterOfMass, Inertia, MassProperties, MassPropertiesErrors};
use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use ron::{
    de::from_str,
    ser::{PrettyConfig, to_string_pretty},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fs,
    path::Path,
};

/// A pose given as translation plus fixed-axis roll, pitch, yaw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub xyz: [f64; 3],
    #[serde(default)]
    pub rpy: [f64; 3],
}

impl Origin {
    pub fn new(xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        Self { xyz, rpy }
    }

    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self::new([x, y, z], [0.0; 3])
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(self.rpy[0], self.rpy[1], self.rpy[2])
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.xyz[0], self.xyz[1], self.xyz[2]),
            self.rotation(),
        )
    }
}

/// Inertial data of a link. `origin` locates the center of mass in the link
/// frame and orients the axes `inertia` is given in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inertial {
    #[serde(default)]
    pub origin: Origin,
    pub mass: f64,
    pub inertia: Inertia,
}

impl Inertial {
    pub fn new(origin: Origin, mass: f64, inertia: Inertia) -> Self {
        Self {
            origin,
            mass,
            inertia,
        }
    }

    /// Mass properties expressed in the link frame.
    pub fn mass_properties(&self) -> Result<MassProperties, MassPropertiesErrors> {
        let Inertia {
            ixx,
            iyy,
            izz,
            ixy,
            ixz,
            iyz,
        } = self.inertia;
        let inertia = Inertia::new(ixx, iyy, izz, ixy, ixz, iyz)?
            .rotate(&self.origin.rotation().to_rotation_matrix());
        let [x, y, z] = self.origin.xyz;
        MassProperties::new(self.mass, CenterOfMass::new(x, y, z), inertia)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    #[serde(default)]
    pub inertial: Option<Inertial>,
}

impl Link {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inertial: None,
        }
    }

    pub fn with_inertial(mut self, inertial: Inertial) -> Self {
        self.inertial = Some(inertial);
        self
    }

    /// Links without inertial data are massless.
    pub fn mass_properties(&self) -> Result<MassProperties, MultibodyErrors> {
        match &self.inertial {
            Some(inertial) => {
                inertial
                    .mass_properties()
                    .map_err(|source| MultibodyErrors::MassProperties {
                        link: self.name.clone(),
                        source,
                    })
            }
            None => Ok(MassProperties::ZERO),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointKind {
    Revolute,
    Continuous,
    Prismatic,
    Fixed,
    Floating,
    Planar,
}

impl JointKind {
    /// Whether the joint contributes a single actuated degree of freedom.
    pub const fn is_actuated(self) -> bool {
        matches!(self, Self::Revolute | Self::Continuous | Self::Prismatic)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
    /// Maximum effort (N*m or N). Must not be negative or NaN.
    pub effort: f64,
    #[serde(default)]
    pub velocity: f64,
}

impl JointLimits {
    pub fn effort(effort: f64) -> Self {
        Self {
            effort,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }
}

fn default_multiplier() -> f64 {
    1.0
}

/// Slaves a joint to `joint`: q = multiplier * q_joint + offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mimic {
    pub joint: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_axis() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    pub parent: String,
    pub child: String,
    /// Parent link frame to joint frame at zero position.
    #[serde(default)]
    pub origin: Origin,
    /// Axis in the joint frame.
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],
    #[serde(default)]
    pub limits: Option<JointLimits>,
    #[serde(default)]
    pub mimic: Option<Mimic>,
}

impl Joint {
    pub fn new(name: &str, kind: JointKind, parent: &str, child: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent: parent.to_string(),
            child: child.to_string(),
            origin: Origin::default(),
            axis: default_axis(),
            limits: None,
            mimic: None,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_axis(mut self, axis: [f64; 3]) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_limits(mut self, limits: JointLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_mimic(mut self, joint: &str, multiplier: f64, offset: f64) -> Self {
        self.mimic = Some(Mimic {
            joint: joint.to_string(),
            multiplier,
            offset,
        });
        self
    }

    pub fn unit_axis(&self) -> Option<Unit<Vector3<f64>>> {
        let axis = Vector3::from(self.axis);
        if !axis.iter().all(|v| v.is_finite()) {
            return None;
        }
        Unit::try_new(axis, 1e-10)
    }

    /// Zero, moved inside the position bounds when zero is outside them.
    pub fn default_position(&self) -> f64 {
        if self.kind == JointKind::Continuous {
            return 0.0;
        }
        match self.limits {
            Some(JointLimits {
                lower: Some(lower),
                upper: Some(upper),
                ..
            }) if lower > 0.0 || upper < 0.0 => (lower + upper) / 2.0,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    pub joints: Vec<String>,
}

/// Serializable robot description. Build it into a [`RobotModel`] before use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotModelBuilder {
    pub name: String,
    pub root_link: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub joints: Vec<Joint>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
    /// Attaches `root_link` to a world frame; `parent` names that frame.
    #[serde(default)]
    pub virtual_joint: Option<Joint>,
}

impl RobotModelBuilder {
    pub fn new(name: &str, root_link: &str) -> Self {
        Self {
            name: name.to_string(),
            root_link: root_link.to_string(),
            links: vec![Link::new(root_link)],
            joints: Vec::new(),
            groups: Vec::new(),
            virtual_joint: None,
        }
    }

    pub fn with_virtual_joint(
        &mut self,
        name: &str,
        kind: JointKind,
        world_frame: &str,
    ) -> &mut Self {
        let root_link = self.root_link.clone();
        self.virtual_joint = Some(Joint::new(name, kind, world_frame, &root_link));
        self
    }

    pub fn add_link(&mut self, link: Link) -> &mut Self {
        self.links.push(link);
        self
    }

    pub fn add_joint(&mut self, joint: Joint) -> &mut Self {
        self.joints.push(joint);
        self
    }

    pub fn add_group(&mut self, name: &str, joints: &[&str]) -> &mut Self {
        self.groups.push(GroupDefinition {
            name: name.to_string(),
            joints: joints.iter().map(|j| j.to_string()).collect(),
        });
        self
    }

    pub fn from_ron(contents: &str) -> Result<Self, MultibodyErrors> {
        Ok(from_str(contents)?)
    }

    pub fn to_ron(&self) -> Result<String, MultibodyErrors> {
        Ok(to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn load(path: &Path) -> Result<Self, MultibodyErrors> {
        let contents = fs::read_to_string(path).map_err(|source| MultibodyErrors::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<(), MultibodyErrors> {
        let ron_string = self.to_ron()?;
        fs::write(path, ron_string).map_err(|source| MultibodyErrors::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn build(self) -> Result<RobotModel, MultibodyErrors> {
        RobotModel::try_from(self)
    }
}

/// Validated robot description.
#[derive(Clone, Debug)]
pub struct RobotModel {
    name: String,
    root_link: String,
    links: Vec<Link>,
    joints: Vec<Joint>,
    groups: HashMap<String, JointGroup>,
    link_index: HashMap<String, usize>,
    joint_index: HashMap<String, usize>,
    // child link -> joint index
    parent_joint: HashMap<String, usize>,
    // joints in depth-first order from the root
    tree_order: Vec<usize>,
}

impl TryFrom<RobotModelBuilder> for RobotModel {
    type Error = MultibodyErrors;

    fn try_from(builder: RobotModelBuilder) -> Result<Self, Self::Error> {
        let RobotModelBuilder {
            name,
            root_link,
            links,
            joints,
            groups: group_definitions,
            virtual_joint,
        } = builder;

        let mut link_index = HashMap::new();
        for (i, link) in links.iter().enumerate() {
            if link_index.insert(link.name.clone(), i).is_some() {
                return Err(MultibodyErrors::DuplicateLink(link.name.clone()));
            }
            link.mass_properties()?;
        }
        if !link_index.contains_key(&root_link) {
            return Err(MultibodyErrors::LinkNotFound(root_link));
        }

        if let Some(joint) = &virtual_joint {
            if joint.child != root_link
                || link_index.contains_key(&joint.parent)
                || joint.kind.is_actuated()
            {
                return Err(MultibodyErrors::InvalidVirtualJoint(joint.name.clone()));
            }
        }
        let has_virtual_joint = virtual_joint.is_some();
        let joints: Vec<Joint> = virtual_joint.into_iter().chain(joints).collect();

        let mut joint_index = HashMap::new();
        let mut parent_joint = HashMap::new();
        let mut child_joints: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, joint) in joints.iter().enumerate() {
            if joint_index.insert(joint.name.clone(), i).is_some() {
                return Err(MultibodyErrors::DuplicateJoint(joint.name.clone()));
            }
            // +inf reads as unlimited
            if let Some(limits) = &joint.limits {
                if limits.effort.is_nan() || limits.effort < 0.0 {
                    return Err(MultibodyErrors::InvalidEffort(joint.name.clone()));
                }
            }
            if has_virtual_joint && i == 0 {
                parent_joint.insert(joint.child.clone(), i);
                continue;
            }
            for link in [&joint.parent, &joint.child] {
                if !link_index.contains_key(link) {
                    return Err(MultibodyErrors::LinkNotFound(link.clone()));
                }
            }
            if joint.child == root_link {
                return Err(MultibodyErrors::RootHasParent(
                    root_link.clone(),
                    joint.name.clone(),
                ));
            }
            if let Some(&other) = parent_joint.get(&joint.child) {
                let other: &Joint = &joints[other];
                return Err(MultibodyErrors::LinkHasTwoParents(
                    joint.child.clone(),
                    other.name.clone(),
                ));
            }
            if joint.kind.is_actuated() && joint.unit_axis().is_none() {
                return Err(MultibodyErrors::DegenerateAxis(joint.name.clone()));
            }
            parent_joint.insert(joint.child.clone(), i);
            child_joints.entry(joint.parent.as_str()).or_default().push(i);
        }

        for joint in &joints {
            let Some(mimic) = &joint.mimic else {
                continue;
            };
            let target = joint_index
                .get(&mimic.joint)
                .map(|&i| &joints[i])
                .ok_or_else(|| MultibodyErrors::JointNotFound(mimic.joint.clone()))?;
            if !joint.kind.is_actuated() || !target.kind.is_actuated() {
                return Err(MultibodyErrors::MimicTargetNotActuated {
                    joint: joint.name.clone(),
                    target: target.name.clone(),
                });
            }
            if target.name == joint.name || target.mimic.is_some() {
                return Err(MultibodyErrors::MimicChain(joint.name.clone()));
            }
        }

        // depth-first walk; with one parent per link this also rules out cycles
        let mut tree_order = Vec::with_capacity(joints.len());
        let mut visited = HashSet::new();
        let mut stack = VecDeque::from([root_link.as_str()]);
        while let Some(link) = stack.pop_back() {
            visited.insert(link);
            if let Some(children) = child_joints.get(link) {
                for &j in children.iter().rev() {
                    stack.push_back(joints[j].child.as_str());
                }
            }
            if let Some(&j) = parent_joint.get(link) {
                tree_order.push(j);
            }
        }
        if let Some(link) = links.iter().find(|l| !visited.contains(l.name.as_str())) {
            return Err(MultibodyErrors::Disconnected(link.name.clone()));
        }

        let mut model = RobotModel {
            name,
            root_link,
            links,
            joints,
            groups: HashMap::new(),
            link_index,
            joint_index,
            parent_joint,
            tree_order,
        };

        for definition in &group_definitions {
            if model.groups.contains_key(&definition.name) {
                return Err(MultibodyErrors::DuplicateGroup(definition.name.clone()));
            }
            let group = JointGroup::resolve(&model, definition)?;
            model.groups.insert(definition.name.clone(), group);
        }

        Ok(model)
    }
}

impl RobotModel {
    /// Reads and validates a RON robot description.
    pub fn load(path: &Path) -> Result<Self, MultibodyErrors> {
        RobotModelBuilder::load(path)?.build()
    }

    pub fn from_ron(contents: &str) -> Result<Self, MultibodyErrors> {
        RobotModelBuilder::from_ron(contents)?.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_link(&self) -> &str {
        &self.root_link
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.link_index.get(name).map(|&i| &self.links[i])
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joint_index.get(name).map(|&i| &self.joints[i])
    }

    pub fn joint_group(&self, name: &str) -> Option<&JointGroup> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Torque (or force) limit of a joint, `None` when the joint declares no limits.
    pub fn max_effort(&self, joint: &str) -> Option<f64> {
        self.joint(joint)
            .and_then(|j| j.limits.as_ref())
            .map(|limits| limits.effort)
    }

    /// The joint whose child is `link`; for the root link this is the virtual
    /// joint, if any.
    pub fn parent_joint(&self, link: &str) -> Option<&Joint> {
        self.parent_joint.get(link).map(|&i| &self.joints[i])
    }

    pub(crate) fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_index.get(name).copied()
    }

    pub(crate) fn link_index(&self, name: &str) -> Option<usize> {
        self.link_index.get(name).copied()
    }

    pub(crate) fn tree_order(&self) -> &[usize] {
        &self.tree_order
    }

    /// True when joint `ancestor` lies on the path from the root to joint `joint`.
    pub(crate) fn is_ancestor(&self, ancestor: usize, joint: usize) -> bool {
        let mut link = self.joints[joint].parent.as_str();
        while let Some(&j) = self.parent_joint.get(link) {
            if j == ancestor {
                return true;
            }
            link = self.joints[j].parent.as_str();
        }
        false
    }
}
