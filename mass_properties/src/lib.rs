use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MassPropertiesErrors {
    #[error("Ixx cant be less than zero")]
    IxxLessThanZero,
    #[error("Iyy cant be less than zero")]
    IyyLessThanZero,
    #[error("Izz cant be less than zero")]
    IzzLessThanZero,
    #[error("mass cannot be less than zero")]
    MassLessThanZero,
    #[error("'{0}' must be finite")]
    NotFinite(&'static str),
}

fn check_finite(value: f64, name: &'static str) -> Result<f64, MassPropertiesErrors> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MassPropertiesErrors::NotFinite(name))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CenterOfMass {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl CenterOfMass {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl From<Vector3<f64>> for CenterOfMass {
    fn from(v: Vector3<f64>) -> CenterOfMass {
        CenterOfMass::new(v[0], v[1], v[2])
    }
}

/// Inertia tensor about the center of mass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Inertia {
    pub ixx: f64,
    pub iyy: f64,
    pub izz: f64,
    pub ixy: f64,
    pub ixz: f64,
    pub iyz: f64,
}

impl Inertia {
    pub const ZERO: Self = Self {
        ixx: 0.0,
        iyy: 0.0,
        izz: 0.0,
        ixy: 0.0,
        ixz: 0.0,
        iyz: 0.0,
    };

    pub fn new(
        ixx: f64,
        iyy: f64,
        izz: f64,
        ixy: f64,
        ixz: f64,
        iyz: f64,
    ) -> Result<Self, MassPropertiesErrors> {
        let ixx = check_finite(ixx, "ixx")?;
        let iyy = check_finite(iyy, "iyy")?;
        let izz = check_finite(izz, "izz")?;
        let ixy = check_finite(ixy, "ixy")?;
        let ixz = check_finite(ixz, "ixz")?;
        let iyz = check_finite(iyz, "iyz")?;
        if ixx < 0.0 {
            return Err(MassPropertiesErrors::IxxLessThanZero);
        }
        if iyy < 0.0 {
            return Err(MassPropertiesErrors::IyyLessThanZero);
        }
        if izz < 0.0 {
            return Err(MassPropertiesErrors::IzzLessThanZero);
        }
        Ok(Self {
            ixx,
            iyy,
            izz,
            ixy,
            ixz,
            iyz,
        })
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.ixx, self.ixy, self.ixz, //
            self.ixy, self.iyy, self.iyz, //
            self.ixz, self.iyz, self.izz,
        )
    }

    /// Re-expresses the tensor in a frame rotated by `rotation`, i.e. R * I * R^T.
    pub fn rotate(&self, rotation: &Rotation3<f64>) -> Self {
        let r = rotation.matrix();
        Self::from_symmetric(&(r * self.matrix() * r.transpose()))
    }

    // only the upper triangle is read
    fn from_symmetric(m: &Matrix3<f64>) -> Self {
        Self {
            ixx: m[(0, 0)],
            iyy: m[(1, 1)],
            izz: m[(2, 2)],
            ixy: m[(0, 1)],
            ixz: m[(0, 2)],
            iyz: m[(1, 2)],
        }
    }
}

/// Represents the mass properties of a rigid link
/// Mass, Center of Mass, Inertia about the center of mass
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub center_of_mass: CenterOfMass,
    pub mass: f64,
    pub inertia: Inertia,
}

impl MassProperties {
    /// A massless body, used for links that carry no inertial data.
    pub const ZERO: Self = Self {
        center_of_mass: CenterOfMass::ORIGIN,
        mass: 0.0,
        inertia: Inertia::ZERO,
    };

    pub fn new(
        mass: f64,
        center_of_mass: CenterOfMass,
        inertia: Inertia,
    ) -> Result<Self, MassPropertiesErrors> {
        let mass = check_finite(mass, "mass")?;
        if mass < 0.0 {
            return Err(MassPropertiesErrors::MassLessThanZero);
        }
        check_finite(center_of_mass.x, "center_of_mass.x")?;
        check_finite(center_of_mass.y, "center_of_mass.y")?;
        check_finite(center_of_mass.z, "center_of_mass.z")?;
        Ok(MassProperties {
            center_of_mass,
            mass,
            inertia,
        })
    }

    /// A point mass located at `center_of_mass`.
    pub fn point_mass(
        mass: f64,
        center_of_mass: CenterOfMass,
    ) -> Result<Self, MassPropertiesErrors> {
        Self::new(mass, center_of_mass, Inertia::ZERO)
    }

    pub fn is_massless(&self) -> bool {
        self.mass == 0.0 && self.inertia == Inertia::ZERO
    }
}
