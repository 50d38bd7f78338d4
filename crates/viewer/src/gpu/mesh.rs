//! Cuboid geometry generation.
//!
//! Every model part is a box whose six faces unwrap into the classic
//! cross-shaped atlas region described by its [`CuboidSpec`]: top and
//! bottom along the upper row, then right, front, left, back side by side
//! beneath them. Texels map 1:1 onto model units, so the UV rects fall
//! straight out of the box dimensions.

use bytemuck::{Pod, Zeroable};

use crate::model::CuboidSpec;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Builds the 36 vertices of a box centred on the origin, textured from
/// the spec's unwrapped atlas region.
pub(crate) fn build_cuboid(spec: &CuboidSpec) -> Vec<Vertex> {
    let [w, h, d] = spec.size;
    let (x0, x1) = (-w / 2.0, w / 2.0);
    let (y0, y1) = (-h / 2.0, h / 2.0);
    let (z0, z1) = (-d / 2.0, d / 2.0);

    let [u, v] = [spec.uv_origin[0] as f32, spec.uv_origin[1] as f32];
    let tex = [spec.texture_size[0] as f32, spec.texture_size[1] as f32];

    // Unwrapped face rects in texel coordinates, [left, top, width, height].
    let top = [u + d, v, w, d];
    let bottom = [u + d + w, v, w, d];
    let right = [u, v + d, d, h];
    let front = [u + d, v + d, w, h];
    let left = [u + d + w, v + d, d, h];
    let back = [u + d + w + d, v + d, w, h];

    let mut vertices = Vec::with_capacity(36);
    // Corners run top-left, top-right, bottom-right, bottom-left as seen
    // from outside the box.
    quad(
        &mut vertices,
        [[x0, y1, z1], [x1, y1, z1], [x1, y0, z1], [x0, y0, z1]],
        front,
        tex,
    );
    quad(
        &mut vertices,
        [[x1, y1, z0], [x0, y1, z0], [x0, y0, z0], [x1, y0, z0]],
        back,
        tex,
    );
    quad(
        &mut vertices,
        [[x0, y1, z0], [x0, y1, z1], [x0, y0, z1], [x0, y0, z0]],
        right,
        tex,
    );
    quad(
        &mut vertices,
        [[x1, y1, z1], [x1, y1, z0], [x1, y0, z0], [x1, y0, z1]],
        left,
        tex,
    );
    quad(
        &mut vertices,
        [[x0, y1, z0], [x1, y1, z0], [x1, y1, z1], [x0, y1, z1]],
        top,
        tex,
    );
    quad(
        &mut vertices,
        [[x0, y0, z1], [x1, y0, z1], [x1, y0, z0], [x0, y0, z0]],
        bottom,
        tex,
    );
    vertices
}

fn quad(out: &mut Vec<Vertex>, corners: [[f32; 3]; 4], rect: [f32; 4], tex: [f32; 2]) {
    let [left, top, width, height] = rect;
    let u0 = left / tex[0];
    let u1 = (left + width) / tex[0];
    let v0 = top / tex[1];
    let v1 = (top + height) / tex[1];

    let uvs = [[u0, v0], [u1, v0], [u1, v1], [u0, v1]];
    for &index in &[0usize, 3, 2, 0, 2, 1] {
        out.push(Vertex {
            position: corners[index],
            uv: uvs[index],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{cuboid_spec, PartId};

    #[test]
    fn cuboid_has_six_faces_of_two_triangles() {
        let spec = cuboid_spec(PartId::Head, false);
        assert_eq!(build_cuboid(&spec).len(), 36);
    }

    #[test]
    fn uvs_stay_inside_the_atlas() {
        for slim in [false, true] {
            for id in PartId::ALL {
                let spec = cuboid_spec(id, slim);
                for vertex in build_cuboid(&spec) {
                    assert!((0.0..=1.0).contains(&vertex.uv[0]), "{id:?} u out of range");
                    assert!((0.0..=1.0).contains(&vertex.uv[1]), "{id:?} v out of range");
                }
            }
        }
    }

    #[test]
    fn head_front_face_maps_to_its_unwrapped_rect() {
        let spec = cuboid_spec(PartId::Head, false);
        let vertices = build_cuboid(&spec);
        // The front face is emitted first; its top-left corner sits one box
        // depth right of the uv origin, one depth down.
        let top_left = &vertices[0];
        assert_eq!(top_left.uv, [8.0 / 64.0, 8.0 / 64.0]);
    }

    #[test]
    fn slim_arm_is_one_texel_narrower() {
        let wide = cuboid_spec(PartId::RightArm, false);
        let slim = cuboid_spec(PartId::RightArm, true);
        assert_eq!(wide.size[0] - slim.size[0], 1.0);
        let widths: Vec<f32> = build_cuboid(&slim)
            .iter()
            .map(|vertex| vertex.position[0])
            .collect();
        let max = widths.iter().cloned().fold(f32::MIN, f32::max);
        assert_eq!(max * 2.0, 3.0);
    }
}
