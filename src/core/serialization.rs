//! Versioned binary chunk format.
//!
//! A chunk carries samples for exactly one identity tuple. All multi-byte
//! values are little-endian.
//!
//! ```text
//! [1 byte]   version = 4
//! [36 bytes] user_id
//! [36 bytes] place_id
//! [36 bytes] screen_id
//! [36 bytes] camera_id
//! [36 bytes] monitor_id
//! For each sample:
//!   [8 bytes]    time (u64, ms since epoch)
//!   [2304 bytes] left eye crop (zero-filled if absent)
//!   [2304 bytes] right eye crop (zero-filled if absent)
//!   [956 x f32]  landmark points
//!   [f32]        goal x (0.0 if absent)
//!   [f32]        goal y (0.0 if absent)
//! ```

use crate::sample::{
    Goal, Identity, IdentityField, Sample, ValidationError, EYE_CROP_LEN, IDENTITY_LEN, POINTS_LEN,
};
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{Cursor, Read};
use std::mem::size_of;
use thiserror::Error;

/// Current chunk format version.
pub const FORMAT_VERSION: u8 = 4;

/// Byte length of the chunk header (version + identity fields).
pub const HEADER_LEN: usize = size_of::<u8>() + IDENTITY_LEN * IdentityField::ALL.len();

/// Byte length of one sample record.
pub const SAMPLE_RECORD_LEN: usize = size_of::<u64>()
    + 2 * EYE_CROP_LEN
    + POINTS_LEN * size_of::<f32>()
    + 2 * size_of::<f32>();

/// Total byte length of a chunk holding `count` samples.
pub fn chunk_len(count: usize) -> usize {
    HEADER_LEN + count * SAMPLE_RECORD_LEN
}

/// Which eye crop an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eye::Left => f.write_str("left"),
            Eye::Right => f.write_str("right"),
        }
    }
}

/// A batch could not be encoded, or a chunk could not be decoded.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Cannot serialize an empty batch")]
    EmptyBatch,

    #[error("Samples must share one {field}: expected '{expected}', found '{found}'")]
    IdentityMismatch {
        field: IdentityField,
        expected: String,
        found: String,
    },

    #[error("{field} must be 36 bytes, got {len}")]
    IdentityLength { field: IdentityField, len: usize },

    #[error("Sample {index} has {len} points, expected 956")]
    PointsLength { index: usize, len: usize },

    #[error("Sample {index} {eye} eye crop is {len} bytes, expected 2304")]
    EyeCropLength { index: usize, eye: Eye, len: usize },

    #[error("Unsupported chunk version {0}")]
    UnsupportedVersion(u8),

    #[error("Chunk length {0} does not match header plus whole sample records")]
    Truncated(usize),

    #[error("Identity field {0} is not valid UTF-8")]
    InvalidIdentity(IdentityField),

    #[error("Decoded sample is invalid: {0}")]
    InvalidSample(#[from] ValidationError),

    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check every precondition before a single byte is written.
fn check_batch(samples: &[Sample]) -> Result<&Identity, SerializationError> {
    let first = samples.first().ok_or(SerializationError::EmptyBatch)?;
    let identity = first.identity();

    for field in IdentityField::ALL {
        let expected = identity.field(field);
        if expected.len() != IDENTITY_LEN {
            return Err(SerializationError::IdentityLength {
                field,
                len: expected.len(),
            });
        }
        if let Some(other) = samples
            .iter()
            .map(|s| s.identity().field(field))
            .find(|v| *v != expected)
        {
            return Err(SerializationError::IdentityMismatch {
                field,
                expected: expected.to_string(),
                found: other.to_string(),
            });
        }
    }

    for (index, sample) in samples.iter().enumerate() {
        if sample.points().len() != POINTS_LEN {
            return Err(SerializationError::PointsLength {
                index,
                len: sample.points().len(),
            });
        }
        for (eye, crop) in [(Eye::Left, sample.left_eye()), (Eye::Right, sample.right_eye())] {
            if let Some(crop) = crop {
                if crop.len() != EYE_CROP_LEN {
                    return Err(SerializationError::EyeCropLength {
                        index,
                        eye,
                        len: crop.len(),
                    });
                }
            }
        }
    }

    Ok(identity)
}

fn put_eye(buf: &mut BytesMut, crop: Option<&[u8]>) {
    match crop {
        Some(crop) => buf.put_slice(crop),
        None => buf.put_bytes(0, EYE_CROP_LEN),
    }
}

/// Encode a non-empty, single-identity batch into one chunk.
pub fn serialize(samples: &[Sample]) -> Result<Bytes, SerializationError> {
    let identity = check_batch(samples)?;

    let mut buf = BytesMut::with_capacity(chunk_len(samples.len()));
    buf.put_u8(FORMAT_VERSION);
    for field in IdentityField::ALL {
        buf.put_slice(identity.field(field).as_bytes());
    }

    for sample in samples {
        buf.put_u64_le(sample.time());
        put_eye(&mut buf, sample.left_eye());
        put_eye(&mut buf, sample.right_eye());
        for &p in sample.points() {
            buf.put_f32_le(p);
        }
        let goal = sample.goal().copied().unwrap_or(Goal::new(0.0, 0.0));
        buf.put_f32_le(goal.x);
        buf.put_f32_le(goal.y);
    }

    debug_assert_eq!(buf.len(), chunk_len(samples.len()));
    Ok(buf.freeze())
}

/// A chunk read back into memory.
///
/// Absent eye crops and goals cannot be told apart from zero-filled ones,
/// so every decoded sample carries both eyes and a goal.
#[derive(Debug)]
pub struct DecodedChunk {
    pub version: u8,
    pub identity: Identity,
    pub samples: Vec<Sample>,
}

fn read_identity_field(
    cursor: &mut Cursor<&[u8]>,
    field: IdentityField,
) -> Result<String, SerializationError> {
    let mut raw = [0u8; IDENTITY_LEN];
    cursor.read_exact(&mut raw)?;
    String::from_utf8(raw.to_vec()).map_err(|_| SerializationError::InvalidIdentity(field))
}

fn read_eye(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, SerializationError> {
    let mut crop = vec![0u8; EYE_CROP_LEN];
    cursor.read_exact(&mut crop)?;
    Ok(crop)
}

/// Decode a version-4 chunk.
pub fn decode_chunk(data: &[u8]) -> Result<DecodedChunk, SerializationError> {
    if data.len() < HEADER_LEN || (data.len() - HEADER_LEN) % SAMPLE_RECORD_LEN != 0 {
        return Err(SerializationError::Truncated(data.len()));
    }

    let mut cursor = Cursor::new(data);
    let version = cursor.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(SerializationError::UnsupportedVersion(version));
    }

    let identity = Identity::new(
        read_identity_field(&mut cursor, IdentityField::User)?,
        read_identity_field(&mut cursor, IdentityField::Place)?,
        read_identity_field(&mut cursor, IdentityField::Screen)?,
        read_identity_field(&mut cursor, IdentityField::Camera)?,
        read_identity_field(&mut cursor, IdentityField::Monitor)?,
    );

    let count = (data.len() - HEADER_LEN) / SAMPLE_RECORD_LEN;
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let time = cursor.read_u64::<LittleEndian>()?;
        let left = read_eye(&mut cursor)?;
        let right = read_eye(&mut cursor)?;
        let mut points = vec![0f32; POINTS_LEN];
        cursor.read_f32_into::<LittleEndian>(&mut points)?;
        let x = cursor.read_f32::<LittleEndian>()?;
        let y = cursor.read_f32::<LittleEndian>()?;

        let sample = Sample::new(time, identity.clone(), points, Some(Goal::new(x, y)))?
            .with_eyes(Some(left), Some(right));
        samples.push(sample);
    }

    Ok(DecodedChunk {
        version,
        identity,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new(
            "00000000-0000-4000-8000-000000000001",
            "00000000-0000-4000-8000-000000000002",
            "00000000-0000-4000-8000-000000000003",
            "00000000-0000-4000-8000-000000000004",
            "00000000-0000-4000-8000-000000000005",
        )
    }

    fn sample_with(identity: Identity, time: u64) -> Sample {
        let points = (0..POINTS_LEN).map(|i| i as f32 * 0.5).collect();
        Sample::new(time, identity, points, Some(Goal::new(0.25, -1.5)))
            .unwrap()
            .with_eyes(Some(vec![7u8; EYE_CROP_LEN]), None)
    }

    #[test]
    fn test_record_len_matches_layout() {
        assert_eq!(HEADER_LEN, 181);
        assert_eq!(SAMPLE_RECORD_LEN, 8448);
    }

    #[test]
    fn test_serialize_length_and_header() {
        let samples: Vec<Sample> = (0..3).map(|t| sample_with(identity(), t)).collect();
        let chunk = serialize(&samples).unwrap();

        assert_eq!(chunk.len(), 181 + 3 * 8448);
        assert_eq!(chunk[0], FORMAT_VERSION);
        assert_eq!(&chunk[1..37], identity().user_id.as_bytes());
        assert_eq!(&chunk[145..181], identity().monitor_id.as_bytes());
    }

    #[test]
    fn test_serialize_record_layout() {
        let time = (1u64 << 53) + 7;
        let chunk = serialize(&[sample_with(identity(), time)]).unwrap();
        let record = &chunk[HEADER_LEN..];

        assert_eq!(&record[0..8], &time.to_le_bytes());
        assert!(record[8..8 + EYE_CROP_LEN].iter().all(|&b| b == 7));
        // Absent right eye is zero-filled
        let right = &record[8 + EYE_CROP_LEN..8 + 2 * EYE_CROP_LEN];
        assert!(right.iter().all(|&b| b == 0));

        let points_at = 8 + 2 * EYE_CROP_LEN;
        assert_eq!(&record[points_at + 4..points_at + 8], &0.5f32.to_le_bytes());

        let goal_at = points_at + POINTS_LEN * 4;
        assert_eq!(&record[goal_at..goal_at + 4], &0.25f32.to_le_bytes());
        assert_eq!(&record[goal_at + 4..goal_at + 8], &(-1.5f32).to_le_bytes());
    }

    #[test]
    fn test_absent_goal_written_as_zero() {
        let sample = Sample::new(1, identity(), vec![0.0; POINTS_LEN], None).unwrap();
        let chunk = serialize(&[sample]).unwrap();
        let tail = &chunk[chunk.len() - 8..];
        assert!(tail.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(serialize(&[]), Err(SerializationError::EmptyBatch)));
    }

    #[test]
    fn test_each_identity_field_mismatch_rejected() {
        for field in IdentityField::ALL {
            let mut other = identity();
            let replacement = "ffffffff-ffff-4fff-bfff-ffffffffffff".to_string();
            match field {
                IdentityField::User => other.user_id = replacement,
                IdentityField::Place => other.place_id = replacement,
                IdentityField::Screen => other.screen_id = replacement,
                IdentityField::Camera => other.camera_id = replacement,
                IdentityField::Monitor => other.monitor_id = replacement,
            }
            let samples = vec![
                sample_with(identity(), 1),
                sample_with(other, 2),
                sample_with(identity(), 3),
            ];

            match serialize(&samples) {
                Err(SerializationError::IdentityMismatch { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected mismatch on {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_points_length_rejected() {
        let good = sample_with(identity(), 1);
        let bad = Sample::new(2, identity(), vec![0.0; 10], None).unwrap();
        let err = serialize(&[good, bad]).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::PointsLength { index: 1, len: 10 }
        ));
    }

    #[test]
    fn test_wrong_eye_crop_length_rejected() {
        let bad = Sample::new(1, identity(), vec![0.0; POINTS_LEN], None)
            .unwrap()
            .with_eyes(None, Some(vec![1u8; 100]));
        let err = serialize(&[bad]).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::EyeCropLength {
                index: 0,
                eye: Eye::Right,
                len: 100
            }
        ));
    }

    #[test]
    fn test_short_identity_rejected() {
        let short = Identity::new("u", "p", "s", "c", "m");
        let sample = Sample::new(1, short, vec![0.0; POINTS_LEN], None).unwrap();
        assert!(matches!(
            serialize(&[sample]),
            Err(SerializationError::IdentityLength {
                field: IdentityField::User,
                len: 1
            })
        ));
    }

    #[test]
    fn test_decode_reads_back_fields() {
        let samples = vec![sample_with(identity(), 10), sample_with(identity(), 20)];
        let chunk = serialize(&samples).unwrap();
        let decoded = decode_chunk(&chunk).unwrap();

        assert_eq!(decoded.version, FORMAT_VERSION);
        assert_eq!(decoded.identity, identity());
        assert_eq!(decoded.samples.len(), 2);
        assert_eq!(decoded.samples[1].time(), 20);
        assert_eq!(decoded.samples[0].points()[3], 1.5);
        assert_eq!(decoded.samples[0].goal(), Some(&Goal::new(0.25, -1.5)));
        assert_eq!(decoded.samples[0].right_eye(), Some(&[0u8; EYE_CROP_LEN][..]));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let chunk = serialize(&[sample_with(identity(), 1)]).unwrap();

        assert!(matches!(
            decode_chunk(&chunk[..chunk.len() - 1]),
            Err(SerializationError::Truncated(_))
        ));

        let mut wrong_version = chunk.to_vec();
        wrong_version[0] = 3;
        assert!(matches!(
            decode_chunk(&wrong_version),
            Err(SerializationError::UnsupportedVersion(3))
        ));
    }
}
