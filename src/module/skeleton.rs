//! Skeleton Module
//!
//! A pose model's skeleton is a tree of named joints whose ids are the
//! column numbers of the 2D pose files, used by the downstream stages to
//! map raw keypoint columns onto anatomical points. Trees are built once
//! from the declarative `{name, id, children}` description used by the
//! `[pose.<MODEL>]` sections and are immutable afterwards; joints live in
//! an arena with parent/child relations stored as indices, so traversal is
//! allocation-stable and cycle-free by construction.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;
use toml::Value;

/// Errors raised while building or querying a skeleton tree.
#[derive(Debug, Error, PartialEq)]
pub enum SkeletonError {
    #[error("malformed joint description: {0}")]
    Description(String),

    #[error("joint `{name}` has an invalid id `{value}`")]
    InvalidId { name: String, value: String },

    #[error("duplicate joint id {0}")]
    DuplicateId(u32),

    #[error("duplicate joint name `{0}`")]
    DuplicateName(String),

    #[error("no joint named `{0}`")]
    NameNotFound(String),

    #[error("no joint with id {0}")]
    IdNotFound(u32),
}

/// Declarative joint description, as written in the `[pose.<MODEL>]`
/// sections: a name, an optional id, and a list of children of the same
/// shape.
#[derive(Debug, Clone, Deserialize)]
struct JointDescription {
    name: String,
    id: Option<JointId>,
    #[serde(default)]
    children: Vec<JointDescription>,
}

/// Ids may be written as integers or as integer strings (the on-disk
/// template quotes the root id).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum JointId {
    Number(i64),
    Text(String),
}

impl JointId {
    fn as_u32(&self, name: &str) -> Result<u32, SkeletonError> {
        let raw = match self {
            JointId::Number(i) if *i >= 0 => return Ok(*i as u32),
            JointId::Number(i) => i.to_string(),
            JointId::Text(s) => match s.parse::<u32>() {
                Ok(id) => return Ok(id),
                Err(_) => s.clone(),
            },
        };
        Err(SkeletonError::InvalidId {
            name: name.to_string(),
            value: raw,
        })
    }
}

/// One joint of a skeleton.
///
/// `id` is the joint's column number in the 2D pose files; virtual joints
/// computed by the pipeline (e.g. `CHip` in COCO_17) have none. `parent`
/// and `children` are arena indices into the owning tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub id: Option<u32>,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// An immutable tree of named joints with O(1) lookup by name or id.
#[derive(Debug, Clone)]
pub struct SkeletonTree {
    joints: Vec<Joint>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
}

impl SkeletonTree {
    /// Build a tree from a declarative joint description.
    ///
    /// The description is a table with a `name`, an optional `id` (integer
    /// or integer string, per the on-disk template), and an optional
    /// `children` list of the same shape. Duplicate names or ids reject the
    /// whole description.
    pub fn build(description: &Value) -> Result<Self, SkeletonError> {
        let root: JointDescription = description
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| SkeletonError::Description(e.to_string()))?;
        let mut tree = SkeletonTree {
            joints: Vec::new(),
            by_name: HashMap::new(),
            by_id: HashMap::new(),
        };
        tree.add_joint(&root, None)?;
        Ok(tree)
    }

    fn add_joint(
        &mut self,
        desc: &JointDescription,
        parent: Option<usize>,
    ) -> Result<usize, SkeletonError> {
        let id = desc
            .id
            .as_ref()
            .map(|id| id.as_u32(&desc.name))
            .transpose()?;

        if self.by_name.contains_key(&desc.name) {
            return Err(SkeletonError::DuplicateName(desc.name.clone()));
        }
        if let Some(id) = id {
            if self.by_id.contains_key(&id) {
                return Err(SkeletonError::DuplicateId(id));
            }
        }

        let index = self.joints.len();
        self.joints.push(Joint {
            id,
            name: desc.name.clone(),
            parent,
            children: Vec::new(),
        });
        self.by_name.insert(desc.name.clone(), index);
        if let Some(id) = id {
            self.by_id.insert(id, index);
        }
        if let Some(parent) = parent {
            self.joints[parent].children.push(index);
        }

        for child in &desc.children {
            self.add_joint(child, Some(index))?;
        }
        Ok(index)
    }

    /// The root joint.
    pub fn root(&self) -> &Joint {
        // build() always inserts at least the root
        &self.joints[0]
    }

    /// Look up a joint by name.
    pub fn find_by_name(&self, name: &str) -> Result<&Joint, SkeletonError> {
        self.by_name
            .get(name)
            .map(|&i| &self.joints[i])
            .ok_or_else(|| SkeletonError::NameNotFound(name.to_string()))
    }

    /// Look up a joint by its 2D column id.
    pub fn find_by_id(&self, id: u32) -> Result<&Joint, SkeletonError> {
        self.by_id
            .get(&id)
            .map(|&i| &self.joints[i])
            .ok_or(SkeletonError::IdNotFound(id))
    }

    /// The kinematic chain from `joint` up to the root: the joint itself
    /// first, the root last.
    pub fn ancestors<'a>(&'a self, joint: &'a Joint) -> Vec<&'a Joint> {
        let mut chain = vec![joint];
        let mut current = joint;
        while let Some(parent) = current.parent {
            current = &self.joints[parent];
            chain.push(current);
        }
        chain
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// All joints in depth-first declaration order, root first.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter()
    }
}

/// Look up one of the built-in pose model skeletons. Returns `None` for
/// `CUSTOM` or unknown names; the caller then builds the tree from the
/// resolved `pose.<MODEL>` section instead.
pub fn by_model_name(name: &str) -> Option<&'static SkeletonTree> {
    static HALPE_26_TREE: OnceLock<SkeletonTree> = OnceLock::new();
    static COCO_17_TREE: OnceLock<SkeletonTree> = OnceLock::new();
    match name {
        "HALPE_26" => Some(HALPE_26_TREE.get_or_init(|| builtin(HALPE_26))),
        "COCO_17" => Some(COCO_17_TREE.get_or_init(|| builtin(COCO_17))),
        _ => None,
    }
}

fn builtin(description: &str) -> SkeletonTree {
    let value: Value = description
        .parse()
        .expect("builtin skeleton description is well-formed");
    SkeletonTree::build(&value).expect("builtin skeleton description is a valid tree")
}

// Body and feet, the default model. Ids are HALPE's 2D column numbers.
const HALPE_26: &str = r#"
name = "Hip"
id = 19
  [[children]]
  name = "RHip"
  id = 12
     [[children.children]]
     name = "RKnee"
     id = 14
        [[children.children.children]]
        name = "RAnkle"
        id = 16
           [[children.children.children.children]]
           name = "RBigToe"
           id = 21
              [[children.children.children.children.children]]
              name = "RSmallToe"
              id = 23
           [[children.children.children.children]]
           name = "RHeel"
           id = 25
  [[children]]
  name = "LHip"
  id = 11
     [[children.children]]
     name = "LKnee"
     id = 13
        [[children.children.children]]
        name = "LAnkle"
        id = 15
           [[children.children.children.children]]
           name = "LBigToe"
           id = 20
              [[children.children.children.children.children]]
              name = "LSmallToe"
              id = 22
           [[children.children.children.children]]
           name = "LHeel"
           id = 24
  [[children]]
  name = "Neck"
  id = 18
     [[children.children]]
     name = "Head"
     id = 17
        [[children.children.children]]
        name = "Nose"
        id = 0
     [[children.children]]
     name = "RShoulder"
     id = 6
        [[children.children.children]]
        name = "RElbow"
        id = 8
           [[children.children.children.children]]
           name = "RWrist"
           id = 10
     [[children.children]]
     name = "LShoulder"
     id = 5
        [[children.children.children]]
        name = "LElbow"
        id = 7
           [[children.children.children.children]]
           name = "LWrist"
           id = 9
"#;

// Body only. CHip and Neck are virtual joints with no 2D column.
const COCO_17: &str = r#"
name = "CHip"
  [[children]]
  name = "RHip"
  id = 12
     [[children.children]]
     name = "RKnee"
     id = 14
        [[children.children.children]]
        name = "RAnkle"
        id = 16
  [[children]]
  name = "LHip"
  id = 11
     [[children.children]]
     name = "LKnee"
     id = 13
        [[children.children.children]]
        name = "LAnkle"
        id = 15
  [[children]]
  name = "Neck"
     [[children.children]]
     name = "Nose"
     id = 0
     [[children.children]]
     name = "RShoulder"
     id = 6
        [[children.children.children]]
        name = "RElbow"
        id = 8
           [[children.children.children.children]]
           name = "RWrist"
           id = 10
     [[children.children]]
     name = "LShoulder"
     id = 5
        [[children.children.children]]
        name = "LElbow"
        id = 7
           [[children.children.children.children]]
           name = "LWrist"
           id = 9
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_halpe_26_round_trip() {
        let tree = by_model_name("HALPE_26").unwrap();
        assert_eq!(tree.joint_count(), 26);

        // Full traversal visits every joint exactly once
        let names: HashSet<&str> = tree.joints().map(|j| j.name.as_str()).collect();
        assert_eq!(names.len(), 26);

        // Every declared joint resolves by name and id
        for joint in tree.joints() {
            assert_eq!(tree.find_by_name(&joint.name).unwrap(), joint);
            let id = joint.id.unwrap();
            assert_eq!(tree.find_by_id(id).unwrap(), joint);
        }
        assert_eq!(tree.root().name, "Hip");
        assert_eq!(tree.root().id, Some(19));
    }

    #[test]
    fn test_coco_17_virtual_joints() {
        let tree = by_model_name("COCO_17").unwrap();
        // 13 tracked columns plus the two virtual joints; the eye and ear
        // columns are not part of the kinematic tree.
        assert_eq!(tree.joint_count(), 15);
        assert_eq!(tree.find_by_name("CHip").unwrap().id, None);
        assert_eq!(tree.find_by_name("Neck").unwrap().id, None);
        assert_eq!(tree.find_by_id(16).unwrap().name, "RAnkle");
    }

    #[test]
    fn test_unknown_model() {
        assert!(by_model_name("CUSTOM").is_none());
        assert!(by_model_name("BODY_25B").is_none());
    }

    #[test]
    fn test_ancestors_chain() {
        let tree = by_model_name("HALPE_26").unwrap();
        let wrist = tree.find_by_name("RWrist").unwrap();
        let chain: Vec<&str> = tree
            .ancestors(wrist)
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(chain, ["RWrist", "RElbow", "RShoulder", "Neck", "Hip"]);
    }

    #[test]
    fn test_build_from_custom_description() {
        // The root id is quoted in the on-disk template; both spellings work
        let text = r#"
name = "Hip"
id = "19"
  [[children]]
  name = "RHip"
  id = 12
"#;
        let tree = SkeletonTree::build(&text.parse().unwrap()).unwrap();
        assert_eq!(tree.joint_count(), 2);
        assert_eq!(tree.root().id, Some(19));
        assert_eq!(tree.find_by_id(12).unwrap().parent, Some(0));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let text = "name = 'A'\nid = 1\n[[children]]\nname = 'B'\nid = 1\n";
        let err = SkeletonTree::build(&text.parse().unwrap()).unwrap_err();
        assert_eq!(err, SkeletonError::DuplicateId(1));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let text = "name = 'A'\nid = 1\n[[children]]\nname = 'A'\nid = 2\n";
        let err = SkeletonTree::build(&text.parse().unwrap()).unwrap_err();
        assert_eq!(err, SkeletonError::DuplicateName("A".to_string()));
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = SkeletonTree::build(&"id = 1".parse().unwrap()).unwrap_err();
        match err {
            SkeletonError::Description(msg) => assert!(msg.contains("name")),
            other => panic!("expected a description error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_id_rejected() {
        let err = SkeletonTree::build(&"name = 'A'\nid = 'hip'".parse().unwrap()).unwrap_err();
        assert_eq!(
            err,
            SkeletonError::InvalidId {
                name: "A".to_string(),
                value: "hip".to_string(),
            }
        );
    }

    #[test]
    fn test_lookup_not_found() {
        let tree = by_model_name("HALPE_26").unwrap();
        assert_eq!(
            tree.find_by_name("Tail").unwrap_err(),
            SkeletonError::NameNotFound("Tail".to_string())
        );
        assert_eq!(tree.find_by_id(99).unwrap_err(), SkeletonError::IdNotFound(99));
    }
}
