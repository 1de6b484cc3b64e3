mod space_conversion;

pub use space_conversion::*;

use crate::errors::ConfigError;
use bevy::{math::Vec3, platform::collections::HashMap, reflect::Reflect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of the simulation bone, the character root projected on the ground.
pub const SIMULATION_BONE: usize = 0;
/// Index of the hips joint.
pub const HIPS: usize = 1;

#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Joint {
    pub name: String,
    /// `None` only for the root.
    pub parent: Option<usize>,
    /// Rest translation relative to the parent.
    pub local_offset: Vec3,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent: Option<usize>, local_offset: Vec3) -> Self {
        Self {
            name: name.into(),
            parent,
            local_offset,
        }
    }
}

/// Joint hierarchy in topological order: every parent index is smaller than
/// the index of its children, so forward kinematics is a single pass.
#[derive(Reflect, Serialize, Deserialize, Clone, PartialEq)]
#[serde(try_from = "Vec<Joint>", into = "Vec<Joint>")]
pub struct Skeleton {
    joints: Vec<Joint>,
    #[reflect(ignore)]
    children: Vec<Vec<usize>>,
    #[reflect(ignore)]
    name_to_index: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new(joints: Vec<Joint>) -> Result<Self, ConfigError> {
        let Some(root) = joints.first() else {
            return Err(ConfigError::EmptySkeleton);
        };
        if root.parent.is_some() {
            return Err(ConfigError::RootHasParent);
        }

        let mut children = vec![Vec::new(); joints.len()];
        let mut name_to_index = HashMap::default();

        for (index, joint) in joints.iter().enumerate() {
            if index > 0 {
                // A second parentless joint is reported as its own parent.
                let parent = joint.parent.unwrap_or(index);
                if parent >= index {
                    return Err(ConfigError::InvalidTopology {
                        joint: index,
                        parent,
                    });
                }
                children[parent].push(index);
            }
            name_to_index.entry(joint.name.clone()).or_insert(index);
        }

        Ok(Self {
            joints,
            children,
            name_to_index,
        })
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints.get(index).and_then(|joint| joint.parent)
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.joints.get(index).map(|joint| joint.name.as_str())
    }

    /// Index of the first joint called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Like [`Skeleton::find`], but a missing joint is a configuration error.
    pub fn require(&self, name: &str) -> Result<usize, ConfigError> {
        self.find(name)
            .ok_or_else(|| ConfigError::MissingJoint(name.to_string()))
    }
}

impl TryFrom<Vec<Joint>> for Skeleton {
    type Error = ConfigError;

    fn try_from(joints: Vec<Joint>) -> Result<Self, Self::Error> {
        Self::new(joints)
    }
}

impl From<Skeleton> for Vec<Joint> {
    fn from(skeleton: Skeleton) -> Self {
        skeleton.joints
    }
}

/// One joint per line, indented under its parent, with its rest offset.
impl fmt::Debug for Skeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Skeleton ({} joints):", self.joints.len())?;
        let mut depths: Vec<usize> = Vec::with_capacity(self.joints.len());
        for (index, joint) in self.joints.iter().enumerate() {
            let depth = joint
                .parent
                .and_then(|parent| depths.get(parent))
                .map_or(0, |depth| depth + 1);
            depths.push(depth);
            let offset = joint.local_offset;
            writeln!(
                f,
                "{:indent$}{index} {} ({:.3}, {:.3}, {:.3})",
                "",
                joint.name,
                offset.x,
                offset.y,
                offset.z,
                indent = 2 * depth
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints() -> Vec<Joint> {
        vec![
            Joint::new("root", None, Vec3::ZERO),
            Joint::new("hips", Some(0), Vec3::new(0.0, 1.0, 0.0)),
            Joint::new("spine", Some(1), Vec3::new(0.0, 0.2, 0.0)),
            Joint::new("leg", Some(1), Vec3::new(0.1, -0.1, 0.0)),
        ]
    }

    #[test]
    fn builds_children_and_lookup() {
        let skeleton = Skeleton::new(joints()).unwrap();
        assert_eq!(skeleton.len(), 4);
        assert_eq!(skeleton.children(1), &[2, 3]);
        assert_eq!(skeleton.parent(3), Some(1));
        assert_eq!(skeleton.find("spine"), Some(2));
        assert_eq!(
            skeleton.require("head"),
            Err(ConfigError::MissingJoint("head".into()))
        );
    }

    #[test]
    fn rejects_parent_after_child() {
        let mut joints = joints();
        joints[2].parent = Some(3);
        assert_eq!(
            Skeleton::new(joints),
            Err(ConfigError::InvalidTopology {
                joint: 2,
                parent: 3
            })
        );
    }

    #[test]
    fn rejects_bad_root() {
        assert_eq!(Skeleton::new(vec![]), Err(ConfigError::EmptySkeleton));
        let mut joints = joints();
        joints[0].parent = Some(0);
        assert_eq!(Skeleton::new(joints), Err(ConfigError::RootHasParent));
    }

    #[test]
    fn debug_prints_hierarchy() {
        let skeleton = Skeleton::new(joints()).unwrap();
        let printed = format!("{skeleton:?}");
        assert!(printed.contains("┣━🦴 \"hips\" [1]"));
        assert!(printed.contains("┃ ┣━🦴 \"leg\" [3]"));
    }

    #[test]
    fn debug_lists_joints_under_their_parents() {
        let skeleton = Skeleton::new(joints()).unwrap();
        let printed = format!("{skeleton:?}");
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines[0], "Skeleton (4 joints):");
        assert_eq!(lines[1], "0 root (0.000, 0.000, 0.000)");
        assert_eq!(lines[2], "  1 hips (0.000, 1.000, 0.000)");
        assert_eq!(lines[3], "    2 spine (0.000, 0.200, 0.000)");
        assert_eq!(lines[4], "    3 leg (0.100, -0.100, 0.000)");
    }
}
