//! Perspective camera with the framing the viewer ships by default: a
//! narrow 40 degree field of view (wider lenses distort the head) seated at
//! y -12, z 60, looking straight down -z at the model.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone)]
pub struct Camera {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            fov_y_degrees: 40.0,
            aspect: 1.0,
            position: Vec3::new(0.0, -12.0, 60.0),
            near: 0.1,
            far: 2000.0,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position - Vec3::Z, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn model_origin_projects_inside_clip_space() {
        let camera = Camera::new();
        let clip = camera.view_projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!(clip.w > 0.0, "origin sits in front of the camera");
    }
}
