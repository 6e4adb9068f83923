use glam::{Quat, Vec3};

use crate::binary::{read_f32, read_u32, write_u32, FormatError};

/// Wire tag selecting the v2 animation header layout.
pub const ANIMATION_V2_TAG: u32 = 2;

const JOINT_STRIDE: usize = 28;
const AABB_STRIDE: usize = 24;

/// Translation and rotation of one joint at one timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for JointTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// One timestep's full set of per-joint transforms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub joints: Vec<JointTransform>,
}

/// Axis-aligned bounding box carried per frame by v2 containers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Mutable scratch buffer holding one sampled skeletal state.
///
/// The sampler writes into a pose in place on every call so the hot
/// path never allocates. A pose must be treated as exclusively owned by
/// one call site; sampling into the same pose from two places at once
/// is a caller bug the type system does not catch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    joints: Vec<JointTransform>,
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the pose for a known skeleton.
    pub fn with_joint_count(count: usize) -> Self {
        Self {
            joints: vec![JointTransform::default(); count],
        }
    }

    pub fn joints(&self) -> &[JointTransform] {
        &self.joints
    }

    pub fn joints_mut(&mut self) -> &mut [JointTransform] {
        &mut self.joints
    }

    fn copy_from(&mut self, frame: &Frame) {
        self.joints.clear();
        self.joints.extend_from_slice(&frame.joints);
    }

    fn blend_from(&mut self, from: &Frame, to: &Frame, alpha: f32) {
        self.joints.clear();
        self.joints
            .extend(from.joints.iter().zip(&to.joints).map(|(a, b)| {
                JointTransform {
                    position: a.position.lerp(b.position, alpha),
                    // Quat::lerp renormalizes the blended quaternion;
                    // an unnormalized result would shear the skeleton.
                    rotation: a.rotation.lerp(b.rotation, alpha),
                }
            }));
    }
}

/// Decoded skeletal animation: a fixed-rate frame timeline with an
/// optional per-frame bounding box trailer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub frame_rate: u32,
    pub frames: Vec<Frame>,
    pub bounds: Option<Vec<Aabb>>,
}

impl AnimationClip {
    /// Decodes either animation wire version.
    ///
    /// Version detection sniffs the first `u32`: an exact `2` selects
    /// the v2 layout, anything else is read as a v1 frame rate. A v1
    /// stream whose frame rate happens to be 2 therefore misparses as
    /// v2; the format needs a distinct magic prefix (or a version floor
    /// well above plausible frame rates) before that can be fixed.
    pub fn decode(data: &[u8]) -> Result<Self, FormatError> {
        let mut cursor = 0;

        let first = read_u32(data, &mut cursor, "animation header")?;
        let (frame_rate, num_frames, num_joints, has_bounds) = if first == ANIMATION_V2_TAG {
            let frame_rate = read_u32(data, &mut cursor, "frame rate")?;
            let num_frames = read_u32(data, &mut cursor, "frame count")? as usize;
            let num_joints = read_u32(data, &mut cursor, "joint count")? as usize;
            let has_bounds = read_u32(data, &mut cursor, "bounds flag")? != 0;
            (frame_rate, num_frames, num_joints, has_bounds)
        } else {
            let num_frames = read_u32(data, &mut cursor, "frame count")? as usize;
            let num_joints = read_u32(data, &mut cursor, "joint count")? as usize;
            (first, num_frames, num_joints, false)
        };

        // Validate the declared body size before allocating anything.
        let joint_bytes = num_frames
            .checked_mul(num_joints)
            .and_then(|joints| joints.checked_mul(JOINT_STRIDE))
            .ok_or(FormatError::UnexpectedEof {
                what: "animation frames",
                offset: cursor,
            })?;
        let bounds_bytes = if has_bounds {
            num_frames
                .checked_mul(AABB_STRIDE)
                .ok_or(FormatError::UnexpectedEof {
                    what: "animation bounds",
                    offset: cursor,
                })?
        } else {
            0
        };
        let body = joint_bytes
            .checked_add(bounds_bytes)
            .and_then(|body| cursor.checked_add(body))
            .filter(|end| *end <= data.len());
        if body.is_none() {
            return Err(FormatError::UnexpectedEof {
                what: "animation body",
                offset: data.len(),
            });
        }

        let mut frames = Vec::with_capacity(num_frames);
        for _ in 0..num_frames {
            let mut joints = Vec::with_capacity(num_joints);
            for _ in 0..num_joints {
                let position = read_vec3(data, &mut cursor, "joint position")?;
                let rotation = read_quat(data, &mut cursor, "joint rotation")?;
                joints.push(JointTransform { position, rotation });
            }
            frames.push(Frame { joints });
        }

        let bounds = if has_bounds {
            let mut boxes = Vec::with_capacity(num_frames);
            for _ in 0..num_frames {
                let min = read_vec3(data, &mut cursor, "bounds min")?;
                let max = read_vec3(data, &mut cursor, "bounds max")?;
                boxes.push(Aabb { min, max });
            }
            (!boxes.is_empty()).then_some(boxes)
        } else {
            None
        };

        Ok(Self {
            frame_rate,
            frames,
            bounds,
        })
    }

    /// Serializes the clip in the v2 layout.
    ///
    /// Existing v1 assets stay readable, but nothing new is authored in
    /// the boundless v1 layout.
    pub fn encode(&self) -> Vec<u8> {
        let joint_count = self.joint_count();
        debug_assert!(self.frames.iter().all(|f| f.joints.len() == joint_count));
        if let Some(bounds) = &self.bounds {
            debug_assert_eq!(bounds.len(), self.frames.len());
        }

        let mut buffer = Vec::new();
        write_u32(&mut buffer, ANIMATION_V2_TAG);
        write_u32(&mut buffer, self.frame_rate);
        write_u32(&mut buffer, self.frames.len() as u32);
        write_u32(&mut buffer, joint_count as u32);
        write_u32(&mut buffer, u32::from(self.bounds.is_some()));

        for frame in &self.frames {
            for joint in &frame.joints {
                write_vec3(&mut buffer, joint.position);
                write_quat(&mut buffer, joint.rotation);
            }
        }
        if let Some(bounds) = &self.bounds {
            for aabb in bounds {
                write_vec3(&mut buffer, aabb.min);
                write_vec3(&mut buffer, aabb.max);
            }
        }

        buffer
    }

    /// Joint count of the skeleton, taken from the first frame.
    pub fn joint_count(&self) -> usize {
        self.frames.first().map_or(0, |frame| frame.joints.len())
    }

    /// Playable length in seconds. Single-frame clips have no duration.
    pub fn duration(&self) -> f32 {
        if self.frames.len() > 1 && self.frame_rate > 0 {
            (self.frames.len() - 1) as f32 / self.frame_rate as f32
        } else {
            0.0
        }
    }

    /// Samples the timeline at `time` seconds into the caller's pose.
    ///
    /// With no frames the pose is left untouched; a single frame is
    /// copied verbatim regardless of time. Otherwise the two frames
    /// around the normalized time are blended: positions linearly,
    /// rotations by normalized-linear interpolation. Blends within
    /// 0.001 of a frame snap to that frame so float jitter at frame
    /// boundaries never triggers a needless blend.
    pub fn sample(&self, time: f32, pose: &mut Pose, looped: bool) {
        match self.frames.len() {
            0 => {}
            1 => pose.copy_from(&self.frames[0]),
            _ => {
                let (frame0, frame1, alpha) = self.frame_span(time, looped);
                if alpha < 0.001 || frame0 == frame1 {
                    pose.copy_from(&self.frames[frame0]);
                } else {
                    pose.blend_from(&self.frames[frame0], &self.frames[frame1], alpha);
                }
            }
        }
    }

    /// Samples the per-frame bounding boxes with the same frame
    /// selection as [`sample`](Self::sample). Returns `None` when the
    /// container carries no bounds.
    pub fn sample_bounds(&self, time: f32, looped: bool) -> Option<Aabb> {
        let bounds = self.bounds.as_deref()?;
        match bounds.len() {
            0 => None,
            1 => Some(bounds[0]),
            _ => {
                let (frame0, frame1, alpha) = self.frame_span(time, looped);
                if alpha < 0.001 || frame0 == frame1 {
                    Some(bounds[frame0])
                } else {
                    Some(Aabb {
                        min: bounds[frame0].min.lerp(bounds[frame1].min, alpha),
                        max: bounds[frame0].max.lerp(bounds[frame1].max, alpha),
                    })
                }
            }
        }
    }

    fn frame_span(&self, time: f32, looped: bool) -> (usize, usize, f32) {
        let last = match self.frames.len() {
            0 | 1 => return (0, 0, 0.0),
            len => len - 1,
        };
        let t = self.normalize_time(time, looped);
        let frame_time = t * self.frame_rate as f32;
        let frame0 = (frame_time.floor() as i64).clamp(0, last as i64) as usize;
        let frame1 = (frame0 + 1).min(last);
        let alpha = frame_time - frame0 as f32;
        (frame0, frame1, alpha)
    }

    fn normalize_time(&self, time: f32, looped: bool) -> f32 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        if looped {
            // Double modulo keeps negative query times non-negative.
            ((time % duration) + duration) % duration
        } else {
            time.clamp(0.0, duration)
        }
    }
}

fn read_vec3(data: &[u8], cursor: &mut usize, what: &'static str) -> Result<Vec3, FormatError> {
    let x = read_f32(data, cursor, what)?;
    let y = read_f32(data, cursor, what)?;
    let z = read_f32(data, cursor, what)?;
    Ok(Vec3::new(x, y, z))
}

fn read_quat(data: &[u8], cursor: &mut usize, what: &'static str) -> Result<Quat, FormatError> {
    let x = read_f32(data, cursor, what)?;
    let y = read_f32(data, cursor, what)?;
    let z = read_f32(data, cursor, what)?;
    let w = read_f32(data, cursor, what)?;
    Ok(Quat::from_xyzw(x, y, z, w))
}

fn write_vec3(buffer: &mut Vec<u8>, value: Vec3) {
    for component in value.to_array() {
        buffer.extend_from_slice(&component.to_le_bytes());
    }
}

fn write_quat(buffer: &mut Vec<u8>, value: Quat) {
    for component in value.to_array() {
        buffer.extend_from_slice(&component.to_le_bytes());
    }
}
