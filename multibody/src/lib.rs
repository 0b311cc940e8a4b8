pub mod algorithms;
pub mod chain;
pub mod group;
pub mod model;
pub mod state;

use mass_properties::MassPropertiesErrors;
use std::path::PathBuf;
use thiserror::Error;

pub use algorithms::recursive_newton_euler::{ChainIdSolverRne, ChainInverseDynamics, RneErrors};
pub use chain::{Chain, Segment, SegmentJoint, SegmentJointKind};
pub use group::JointGroup;
pub use model::{
    GroupDefinition, Inertial, Joint, JointKind, JointLimits, Link, Mimic, Origin, RobotModel,
    RobotModelBuilder,
};
pub use state::RobotState;

#[derive(Debug, Error)]
pub enum MultibodyErrors {
    #[error("could not extract a chain from '{base}' to '{tip}'")]
    ChainNotFound { base: String, tip: String },
    #[error("joint '{0}' is actuated but its axis is zero or not finite")]
    DegenerateAxis(String),
    #[error("link '{0}' is not reachable from the root link")]
    Disconnected(String),
    #[error("group '{0}' is defined more than once")]
    DuplicateGroup(String),
    #[error("joint '{0}' is defined more than once")]
    DuplicateJoint(String),
    #[error("link '{0}' is defined more than once")]
    DuplicateLink(String),
    #[error("group '{0}' does not contain any joints")]
    EmptyGroup(String),
    #[error("could not find group '{0}' in the model")]
    GroupNotFound(String),
    #[error("{group} expects {expected} joint values, got {actual}")]
    GroupSizeMismatch {
        group: String,
        expected: usize,
        actual: usize,
    },
    #[error("joint '{0}' has an effort limit that is negative or NaN")]
    InvalidEffort(String),
    #[error("virtual joint '{0}' must be a passive joint from a world frame to the root link")]
    InvalidVirtualJoint(String),
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("joint '{0}' has no degree of freedom to set")]
    JointNotActuated(String),
    #[error("could not find joint '{0}' in the model")]
    JointNotFound(String),
    #[error("link '{0}' already has parent joint '{1}'")]
    LinkHasTwoParents(String, String),
    #[error("could not find link '{0}' in the model")]
    LinkNotFound(String),
    #[error("link '{link}': {source}")]
    MassProperties {
        link: String,
        source: MassPropertiesErrors,
    },
    #[error("joint '{0}' mimics itself or another mimic joint")]
    MimicChain(String),
    #[error("joint '{joint}' mimics '{target}', which is not an actuated joint")]
    MimicTargetNotActuated { joint: String, target: String },
    #[error("joint '{0}' is a mimic joint and follows its target")]
    MimicNotSettable(String),
    #[error("value for joint '{0}' is not finite")]
    NonFiniteValue(String),
    #[error("{0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("{0}")]
    RonSerialize(#[from] ron::Error),
    #[error("root link '{0}' cannot be the child of joint '{1}'")]
    RootHasParent(String, String),
    #[error("chain expects {expected} joint values, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}
