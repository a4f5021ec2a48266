//! Wireframe meshes for the floating shapes, unit-sized and centred on the origin.

use std::collections::BTreeSet;
use std::f32::consts::TAU;

use glam::Vec3;

const TORUS_RADIUS: f32 = 1.0;
const TORUS_TUBE: f32 = 0.4;
const TORUS_RADIAL_SEGMENTS: u16 = 16;
const TORUS_TUBULAR_SEGMENTS: u16 = 50;

/// Line-list mesh: `indices` holds vertex pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMesh {
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
}

impl WireMesh {
    pub fn edge_count(&self) -> usize {
        self.indices.len() / 2
    }

    /// Projects every vertex onto the unit sphere and keeps each shared
    /// triangle edge once.
    fn from_faces(vertices: &[[f32; 3]], faces: &[[u16; 3]]) -> Self {
        let mut edges = BTreeSet::new();
        for face in faces {
            for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                edges.insert((a.min(b), a.max(b)));
            }
        }

        Self {
            vertices: vertices
                .iter()
                .map(|v| Vec3::from_array(*v).normalize().to_array())
                .collect(),
            indices: edges.into_iter().flat_map(|(a, b)| [a, b]).collect(),
        }
    }
}

pub fn icosahedron() -> WireMesh {
    let t = (1.0 + 5f32.sqrt()) / 2.0;
    let vertices = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ];
    let faces = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    WireMesh::from_faces(&vertices, &faces)
}

pub fn octahedron() -> WireMesh {
    let vertices = [
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ];
    let faces = [
        [0, 2, 4],
        [0, 4, 3],
        [0, 3, 5],
        [0, 5, 2],
        [1, 2, 5],
        [1, 5, 3],
        [1, 3, 4],
        [1, 4, 2],
    ];
    WireMesh::from_faces(&vertices, &faces)
}

pub fn tetrahedron() -> WireMesh {
    let vertices = [
        [1.0, 1.0, 1.0],
        [-1.0, -1.0, 1.0],
        [-1.0, 1.0, -1.0],
        [1.0, -1.0, -1.0],
    ];
    let faces = [[2, 1, 0], [0, 3, 2], [1, 3, 0], [2, 3, 1]];
    WireMesh::from_faces(&vertices, &faces)
}

/// Ring of `TORUS_TUBULAR_SEGMENTS` tube cross-sections, each a loop of
/// `TORUS_RADIAL_SEGMENTS` vertices, in the XY plane.
pub fn torus() -> WireMesh {
    let radial = TORUS_RADIAL_SEGMENTS;
    let tubular = TORUS_TUBULAR_SEGMENTS;
    let mut mesh = WireMesh {
        vertices: Vec::with_capacity(radial as usize * tubular as usize),
        indices: Vec::with_capacity(radial as usize * tubular as usize * 4),
    };

    for j in 0..tubular {
        let u = j as f32 / tubular as f32 * TAU;
        for i in 0..radial {
            let v = i as f32 / radial as f32 * TAU;
            let ring = TORUS_RADIUS + TORUS_TUBE * v.cos();
            mesh.vertices
                .push([ring * u.cos(), ring * u.sin(), TORUS_TUBE * v.sin()]);
        }
    }

    let index = |j: u16, i: u16| (j % tubular) * radial + (i % radial);
    for j in 0..tubular {
        for i in 0..radial {
            let here = index(j, i);
            mesh.indices.extend_from_slice(&[here, index(j, i + 1)]);
            mesh.indices.extend_from_slice(&[here, index(j + 1, i)]);
        }
    }
    mesh
}
