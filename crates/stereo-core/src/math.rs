use nalgebra::{Isometry3, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector2, Vector3};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat34 = Matrix3x4<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Iso3 = Isometry3<Real>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Cross-product matrix `[v]ₓ` such that `[v]ₓ · w = v × w`.
pub fn skew_symmetric(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Angle (radians) of the relative rotation `a⁻¹·b`.
pub fn rotation_angle_between(a: &Mat3, b: &Mat3) -> Real {
    let r = a.transpose() * b;
    ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos()
}
