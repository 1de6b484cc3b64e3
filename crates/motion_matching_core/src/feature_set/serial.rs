use super::{FeatureLayout, FeatureSet, FeatureStats};
use crate::errors::PersistenceError;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const FEATURE_SET_VERSION: u32 = 1;

/// Leading value of a feature set blob, followed by the layout, the
/// statistics and the payload as separate MessagePack values.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FeatureSetHeader {
    pub version: u32,
    pub frame_count: u64,
    pub feature_size: u64,
    pub pose_offset: u64,
}

#[derive(Serialize, Deserialize)]
struct FeaturePayload {
    features: Vec<f32>,
    /// One bit per frame, least significant bit first.
    validity: Vec<u8>,
}

/// What a feature set blob holds up to its statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSetSummary {
    pub header: FeatureSetHeader,
    pub layout: FeatureLayout,
    pub stats: FeatureStats,
}

impl FeatureSet {
    pub fn header(&self) -> FeatureSetHeader {
        FeatureSetHeader {
            version: FEATURE_SET_VERSION,
            frame_count: self.len() as u64,
            feature_size: self.feature_size() as u64,
            pose_offset: self.pose_offset() as u64,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), PersistenceError> {
        rmp_serde::encode::write(writer, &self.header())?;
        rmp_serde::encode::write(writer, &self.layout)?;
        rmp_serde::encode::write(writer, &self.stats)?;
        rmp_serde::encode::write(
            writer,
            &FeaturePayload {
                features: self.features.clone(),
                validity: pack_bits(&self.valid),
            },
        )?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, PersistenceError> {
        let summary = Self::read_summary(reader)?;
        let payload: FeaturePayload = rmp_serde::from_read(&mut *reader)?;
        let frame_count = summary.header.frame_count as usize;
        if payload.validity.len() != frame_count.div_ceil(8) {
            return Err(PersistenceError::Corrupt(format!(
                "validity holds {} bytes for {} frames",
                payload.validity.len(),
                frame_count
            )));
        }
        let valid = unpack_bits(&payload.validity, frame_count);
        Ok(FeatureSet::from_normalized(
            summary.layout,
            summary.stats,
            payload.features,
            valid,
        )?)
    }

    /// Reads only the header, layout and statistics, leaving the matrix
    /// unread. Enough to normalize queries against this set.
    pub fn read_summary<R: Read>(reader: &mut R) -> Result<FeatureSetSummary, PersistenceError> {
        let header: FeatureSetHeader = rmp_serde::from_read(&mut *reader)?;
        if header.version != FEATURE_SET_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: FEATURE_SET_VERSION,
                found: header.version,
            });
        }
        let layout: FeatureLayout = rmp_serde::from_read(&mut *reader)?;
        let stats: FeatureStats = rmp_serde::from_read(&mut *reader)?;

        if layout.size() as u64 != header.feature_size
            || layout.pose_offset() as u64 != header.pose_offset
        {
            return Err(PersistenceError::Corrupt(
                "layout disagrees with the header".into(),
            ));
        }
        Ok(FeatureSetSummary {
            header,
            layout,
            stats,
        })
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

fn pack_bits(flags: &[bool]) -> Vec<u8> {
    flags
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (bit, &flag)| byte | ((flag as u8) << bit))
        })
        .collect()
}

fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|index| bytes[index / 8] & (1 << (index % 8)) != 0)
        .collect()
}
