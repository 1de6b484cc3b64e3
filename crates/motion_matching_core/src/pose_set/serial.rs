use super::{ClipRange, PoseSet, PoseVector};
use crate::{errors::PersistenceError, skeleton::Skeleton};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const POSE_SET_VERSION: u32 = 1;

/// Leading value of a pose set blob. The blob continues with the skeleton,
/// the clip ranges and the poses, each as its own MessagePack value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PoseSetHeader {
    pub version: u32,
    pub pose_count: u64,
    pub joint_count: u64,
    pub frame_time: f32,
}

impl PoseSet {
    pub fn header(&self) -> PoseSetHeader {
        PoseSetHeader {
            version: POSE_SET_VERSION,
            pose_count: self.len() as u64,
            joint_count: self.skeleton.len() as u64,
            frame_time: self.frame_time,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), PersistenceError> {
        rmp_serde::encode::write(writer, &self.header())?;
        rmp_serde::encode::write(writer, &self.skeleton)?;
        rmp_serde::encode::write(writer, &self.clips)?;
        rmp_serde::encode::write(writer, &self.poses)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, PersistenceError> {
        let header: PoseSetHeader = rmp_serde::from_read(&mut *reader)?;
        if header.version != POSE_SET_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: POSE_SET_VERSION,
                found: header.version,
            });
        }
        let skeleton: Skeleton = rmp_serde::from_read(&mut *reader)?;
        let clips: Vec<ClipRange> = rmp_serde::from_read(&mut *reader)?;
        let poses: Vec<PoseVector> = rmp_serde::from_read(&mut *reader)?;

        if poses.len() as u64 != header.pose_count {
            return Err(PersistenceError::Corrupt(format!(
                "header announces {} poses, payload holds {}",
                header.pose_count,
                poses.len()
            )));
        }
        if skeleton.len() as u64 != header.joint_count {
            return Err(PersistenceError::Corrupt(format!(
                "header announces {} joints, skeleton has {}",
                header.joint_count,
                skeleton.len()
            )));
        }

        Ok(PoseSet::new(skeleton, header.frame_time, poses, clips)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let mut cursor = bytes;
        Self::read_from(&mut cursor)
    }
}
