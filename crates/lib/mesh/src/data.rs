// Copyright (C) 2025 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use bytes::Bytes;
use glam::{Mat4, Quat, Vec2, Vec3};

/// How a primvar maps onto a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Vertex,
    FaceVarying,
    Uniform,
    Constant,
}

#[derive(Debug, Clone, Default)]
pub struct Primvar<T> {
    pub interpolation: Interpolation,
    pub values: Vec<T>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct Mesh {
    pub name: String,
    pub face_counts: Vec<u32>,
    pub indices: Vec<u32>,
    pub points: Vec<Vec3>,
    pub normals: Primvar<Vec3>,
    pub uvs: Primvar<Vec2>,
    pub colors: Vec<Primvar<Vec3>>,
    pub opacities: Vec<Primvar<f32>>,
    /// Per point widths; splats carry two extra sets, one per remaining axis.
    pub point_widths: Vec<f32>,
    pub point_extra_widths: Vec<Primvar<f32>>,
    pub point_rotations: Primvar<Quat>,
    /// Spherical harmonic coefficient sets, column-major: all bands of the
    /// red channel first, then green, then blue.
    pub point_sh_coeffs: Vec<Primvar<f32>>,
    pub clipping_box: Primvar<Vec3>,
    pub as_points: bool,
    pub as_gsplats: bool,
    pub material: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Node {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub world_transform: Mat4,
    pub static_meshes: Vec<usize>,
}

/// The fixed material input set the formats exchange.
#[derive(Debug, Default)]
pub struct Material {
    pub name: String,
    pub diffuse_color: Option<Vec3>,
    pub metallic: Option<f32>,
    pub roughness: Option<f32>,
    pub opacity: Option<f32>,
    pub ior: Option<f32>,
    pub emissive_color: Option<Vec3>,
    pub clearcoat: Option<f32>,
    pub occlusion: Option<f32>,
    pub diffuse_texture: Option<usize>,
    pub normal_texture: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ImageAsset {
    pub uri: String,
    pub format: String,
    pub data: Bytes,
}

/// What every importer produces and every exporter consumes.
#[derive(Debug, Default)]
pub struct SceneData {
    pub nodes: Vec<Node>,
    pub root_nodes: Vec<usize>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub images: Vec<ImageAsset>,
    pub up_axis: UpAxis,
    pub meters_per_unit: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

impl SceneData {
    pub fn add_node(&mut self, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            parent,
            world_transform: Mat4::IDENTITY,
            ..Default::default()
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(index),
            None => self.root_nodes.push(index),
        }
        index
    }

    pub fn add_mesh(&mut self) -> usize {
        self.meshes.push(Mesh::default());
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self) -> usize {
        self.materials.push(Material::default());
        self.materials.len() - 1
    }

    pub fn add_color_set(&mut self, mesh: usize) -> usize {
        self.meshes[mesh].colors.push(Primvar::default());
        self.meshes[mesh].colors.len() - 1
    }

    pub fn add_opacity_set(&mut self, mesh: usize) -> usize {
        self.meshes[mesh].opacities.push(Primvar::default());
        self.meshes[mesh].opacities.len() - 1
    }

    pub fn add_extra_width_set(&mut self, mesh: usize) -> usize {
        self.meshes[mesh].point_extra_widths.push(Primvar::default());
        self.meshes[mesh].point_extra_widths.len() - 1
    }

    pub fn add_sh_coeff_set(&mut self, mesh: usize) -> usize {
        self.meshes[mesh].point_sh_coeffs.push(Primvar::default());
        self.meshes[mesh].point_sh_coeffs.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_parenting() {
        let mut scene = SceneData::default();
        let root = scene.add_node(None);
        let child = scene.add_node(Some(root));
        assert_eq!(scene.root_nodes, vec![root]);
        assert_eq!(scene.nodes[root].children, vec![child]);
        assert_eq!(scene.nodes[child].parent, Some(root));
    }
}
