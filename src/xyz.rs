use kd_tree::KdPoint;
use nalgebra::Vector3;
use std::hash::{Hash, Hasher};

/// Atom position tagged with the row index of the atom in its snapshot.
#[derive(Debug, Clone, Copy)]
pub struct XYZ {
    coords: [f64; 3],
    index: usize,
}

impl XYZ {
    pub fn from(coords: [f64; 3], index: usize) -> Self {
        Self { coords, index }
    }

    pub fn x(&self) -> f64 {
        self.coords[0]
    }
    pub fn y(&self) -> f64 {
        self.coords[1]
    }
    pub fn z(&self) -> f64 {
        self.coords[2]
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::from(self.coords)
    }
}

impl PartialEq for XYZ {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.coords == other.coords
    }
}

impl Eq for XYZ {}

impl Hash for XYZ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.coords.iter().for_each(|n| {
            n.to_bits().hash(state);
        });
    }
}

impl KdPoint for XYZ {
    type Scalar = f64;
    type Dim = typenum::U3;
    fn at(&self, i: usize) -> f64 {
        self.coords[i]
    }
}
