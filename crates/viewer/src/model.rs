//! The posable player model.
//!
//! Pure CPU state: per-part rest placement, pose rotations, and the two
//! group visibility flags the texture protocol flips. The GPU backend turns
//! [`PartId`] into mesh geometry; animations mutate the rotations between
//! frames. Units are skin pixels, +y up, the player facing +z.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Identifies one drawable cuboid of the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartId {
    Head,
    Body,
    RightArm,
    LeftArm,
    RightLeg,
    LeftLeg,
    Cape,
}

impl PartId {
    pub const ALL: [PartId; 7] = [
        PartId::Head,
        PartId::Body,
        PartId::RightArm,
        PartId::LeftArm,
        PartId::RightLeg,
        PartId::LeftLeg,
        PartId::Cape,
    ];
}

/// One posable cuboid: a rest-position offset plus a rotation applied about
/// a pivot (neck, shoulder, hip, or cape mount).
#[derive(Debug, Clone)]
pub struct ModelPart {
    /// Pose rotation in radians, XYZ euler order.
    pub rotation: Vec3,
    offset: Vec3,
    pivot: Vec3,
}

impl ModelPart {
    fn new(offset: Vec3, pivot: Vec3) -> Self {
        Self {
            rotation: Vec3::ZERO,
            offset,
            pivot,
        }
    }

    /// Model matrix: rotate about the pivot, then move to the rest offset.
    pub fn matrix(&self) -> Mat4 {
        let rotation =
            Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z);
        Mat4::from_translation(self.pivot)
            * Mat4::from_quat(rotation)
            * Mat4::from_translation(self.offset - self.pivot)
    }
}

/// A flattened per-frame snapshot of one part, handed to the backend.
#[derive(Debug, Clone)]
pub struct PartInstance {
    pub id: PartId,
    pub matrix: Mat4,
    pub visible: bool,
}

/// The avatar: six skin cuboids plus the cape.
///
/// Both texture groups start invisible; the texture-readiness protocol flips
/// them once a decoded surface exists, so the model never renders untextured.
pub struct PlayerModel {
    pub head: ModelPart,
    pub body: ModelPart,
    pub right_arm: ModelPart,
    pub left_arm: ModelPart,
    pub right_leg: ModelPart,
    pub left_leg: ModelPart,
    pub cape: ModelPart,
    skin_visible: bool,
    cape_visible: bool,
    slim: bool,
}

impl PlayerModel {
    pub fn new() -> Self {
        let mut cape = ModelPart::new(Vec3::new(0.0, -2.0, -3.0), Vec3::new(0.0, 6.0, -2.0));
        // Rest tilt away from the back, matching the classic idle drape.
        cape.rotation.x = 10.8f32.to_radians();

        Self {
            head: ModelPart::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, 6.0, 0.0)),
            body: ModelPart::new(Vec3::ZERO, Vec3::ZERO),
            right_arm: ModelPart::new(Vec3::new(-6.0, 0.0, 0.0), Vec3::new(-5.0, 4.0, 0.0)),
            left_arm: ModelPart::new(Vec3::new(6.0, 0.0, 0.0), Vec3::new(5.0, 4.0, 0.0)),
            right_leg: ModelPart::new(Vec3::new(-2.0, -12.0, 0.0), Vec3::new(-2.0, -6.0, 0.0)),
            left_leg: ModelPart::new(Vec3::new(2.0, -12.0, 0.0), Vec3::new(2.0, -6.0, 0.0)),
            cape,
            skin_visible: false,
            cape_visible: false,
            slim: false,
        }
    }

    pub fn skin_visible(&self) -> bool {
        self.skin_visible
    }

    pub fn set_skin_visible(&mut self, visible: bool) {
        self.skin_visible = visible;
    }

    pub fn cape_visible(&self) -> bool {
        self.cape_visible
    }

    pub fn set_cape_visible(&mut self, visible: bool) {
        self.cape_visible = visible;
    }

    pub fn slim(&self) -> bool {
        self.slim
    }

    pub fn set_slim(&mut self, slim: bool) {
        self.slim = slim;
        // Slim arms are one pixel narrower, so their centres move inward.
        let shift = if slim { 5.5 } else { 6.0 };
        self.right_arm.offset.x = -shift;
        self.left_arm.offset.x = shift;
    }

    fn part(&self, id: PartId) -> &ModelPart {
        match id {
            PartId::Head => &self.head,
            PartId::Body => &self.body,
            PartId::RightArm => &self.right_arm,
            PartId::LeftArm => &self.left_arm,
            PartId::RightLeg => &self.right_leg,
            PartId::LeftLeg => &self.left_leg,
            PartId::Cape => &self.cape,
        }
    }

    /// Snapshots every part for submission to the backend.
    pub fn part_instances(&self) -> Vec<PartInstance> {
        PartId::ALL
            .iter()
            .map(|&id| PartInstance {
                id,
                matrix: self.part(id).matrix(),
                visible: match id {
                    PartId::Cape => self.cape_visible,
                    _ => self.skin_visible,
                },
            })
            .collect()
    }
}

impl Default for PlayerModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Cuboid extents and atlas placement for one part.
///
/// `uv_origin` is the top-left corner of the standard box-UV unwrap inside
/// the part's texture (the 64x64 skin atlas, or the 64x32 cape frame).
#[derive(Debug, Clone, Copy)]
pub struct CuboidSpec {
    pub size: [f32; 3],
    pub uv_origin: [u32; 2],
    pub texture_size: [u32; 2],
}

/// Geometry table for the canonical layouts. Arms depend on the detected
/// model variant.
pub fn cuboid_spec(id: PartId, slim: bool) -> CuboidSpec {
    let arm_width = if slim { 3.0 } else { 4.0 };
    match id {
        PartId::Head => CuboidSpec {
            size: [8.0, 8.0, 8.0],
            uv_origin: [0, 0],
            texture_size: [64, 64],
        },
        PartId::Body => CuboidSpec {
            size: [8.0, 12.0, 4.0],
            uv_origin: [16, 16],
            texture_size: [64, 64],
        },
        PartId::RightArm => CuboidSpec {
            size: [arm_width, 12.0, 4.0],
            uv_origin: [40, 16],
            texture_size: [64, 64],
        },
        PartId::LeftArm => CuboidSpec {
            size: [arm_width, 12.0, 4.0],
            uv_origin: [32, 48],
            texture_size: [64, 64],
        },
        PartId::RightLeg => CuboidSpec {
            size: [4.0, 12.0, 4.0],
            uv_origin: [0, 16],
            texture_size: [64, 64],
        },
        PartId::LeftLeg => CuboidSpec {
            size: [4.0, 12.0, 4.0],
            uv_origin: [16, 48],
            texture_size: [64, 64],
        },
        PartId::Cape => CuboidSpec {
            size: [10.0, 16.0, 1.0],
            uv_origin: [0, 0],
            texture_size: [64, 32],
        },
    }
}
